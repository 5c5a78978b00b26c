//! CLI type definitions
//!
//! This module contains clap command structures that define the CLI interface.

use clap::{Parser, Subcommand};

use super::commands::serve::ServeArgs;

#[derive(Parser)]
#[command(name = "testhub")]
#[command(about = "Testhub - aggregation hub for parallel test-run telemetry", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output in JSON format
    #[arg(short, long, global = true)]
    pub json: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the hub and accept worker events until interrupted
    Serve(ServeArgs),
}
