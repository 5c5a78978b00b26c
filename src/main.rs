//! Testhub CLI entry point.

use clap::Parser;

use testhub::cli::{Cli, Commands};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Serve(args) => testhub::cli::commands::serve::execute(args, cli.json).await,
    };

    if let Err(err) = result {
        testhub::cli::handle_error(err, cli.json);
    }
}
