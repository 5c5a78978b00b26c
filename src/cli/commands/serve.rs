//! Implementation of the `testhub serve` command.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use tracing::{info, warn};

use crate::adapters::http::{IngestHttpConfig, IngestHttpServer};
use crate::adapters::plugins::register_builtin;
use crate::cli::output::{output, CommandOutput};
use crate::domain::models::{HubEvent, StartSession};
use crate::infrastructure::config::{ConfigLoader, ConfigOverrides};
use crate::infrastructure::logging::{LogConfig, LoggerImpl};
use crate::services::hook_dispatcher::HookDispatcher;
use crate::services::hub::Hub;

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Configuration file (defaults to ./testhub.yaml when present)
    #[arg(short, long, env = "TESTHUB_CONFIG")]
    pub config: Option<PathBuf>,

    /// Port for the ingest endpoint, 0 picks a free one
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Root directory for run output
    #[arg(long)]
    pub log_dir: Option<PathBuf>,

    /// Run identifier, generated when omitted
    #[arg(long)]
    pub run_id: Option<String>,
}

/// Printed once the endpoint is accepting events.
#[derive(Debug, Serialize)]
pub struct ServeOutput {
    pub address: SocketAddr,
    pub port: u16,
    pub run_id: Option<String>,
    pub artifact_dir: PathBuf,
}

impl CommandOutput for ServeOutput {
    fn to_human(&self) -> String {
        format!(
            "Listening on {} (port {})\nRun: {}\nArtifacts: {}",
            self.address,
            self.port,
            self.run_id.as_deref().unwrap_or("-"),
            self.artifact_dir.display()
        )
    }
}

pub async fn execute(args: ServeArgs, json_mode: bool) -> Result<()> {
    let overrides = ConfigOverrides {
        port: args.port,
        log_dir: args.log_dir,
        run_id: args.run_id,
    };
    let config = ConfigLoader::load(args.config.as_deref(), &overrides)?;

    let log_config = LogConfig::try_from(&config.logging)?;
    let _logger = LoggerImpl::init(&log_config)?;

    let mut dispatcher = HookDispatcher::new(&config.dispatch);
    register_builtin(&config, &mut dispatcher).context("Failed to configure plugins")?;

    let server_config = IngestHttpConfig::from(&config.server);
    let run_id = config.run_id.clone();
    let artifact_dir = config.artifact_dir();
    let hub = Arc::new(Hub::new(config, dispatcher));
    let server = IngestHttpServer::new(hub.clone(), server_config);
    let listener = server.bind().await?;
    let address = listener
        .local_addr()
        .context("Failed to read bound address")?;

    hub.submit(HubEvent::StartSession(StartSession { run_id }))
    .await;
    let run = hub.run_context().await;

    output(
        &ServeOutput {
            address,
            port: address.port(),
            run_id: run.run_id,
            artifact_dir,
        },
        json_mode,
    );

    server.serve_with_shutdown(listener, shutdown_signal()).await?;

    hub.submit(HubEvent::FinishSession).await;
    let tests = hub.store().len().await;
    info!(tests, "Hub stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for Ctrl-C, shutting down");
    }
    info!("Shutdown requested");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serve_output_formats() {
        let out = ServeOutput {
            address: "127.0.0.1:21212".parse().unwrap(),
            port: 21212,
            run_id: Some("run-1".to_string()),
            artifact_dir: PathBuf::from("/tmp/run/artifacts"),
        };
        assert!(out.to_human().contains("port 21212"));
        assert_eq!(out.to_json()["port"], 21212);
        assert_eq!(out.to_json()["run_id"], "run-1");
    }
}
