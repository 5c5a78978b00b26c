//! Ingest HTTP server.
//!
//! Workers post lifecycle events here; the live report and a health probe
//! are served from the same listener.

use std::future::Future;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::domain::models::{HubEvent, ServerConfig};
use crate::services::hub::Hub;
use crate::services::report::{ReportData, ReportOptions};

/// Configuration for the ingest server.
#[derive(Debug, Clone)]
pub struct IngestHttpConfig {
    /// Host to bind to.
    pub host: String,
    /// Port to listen on, 0 for an ephemeral port.
    pub port: u16,
}

impl Default for IngestHttpConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 0,
        }
    }
}

impl From<&ServerConfig> for IngestHttpConfig {
    fn from(config: &ServerConfig) -> Self {
        Self {
            host: config.host.clone(),
            port: config.port,
        }
    }
}

/// Ingest HTTP server.
pub struct IngestHttpServer {
    hub: Arc<Hub>,
    config: IngestHttpConfig,
}

impl IngestHttpServer {
    pub const fn new(hub: Arc<Hub>, config: IngestHttpConfig) -> Self {
        Self { hub, config }
    }

    /// Build the router with all endpoints.
    pub fn build_router(&self) -> Router {
        Router::new()
            .route("/events", post(submit_event))
            .route("/report", get(live_report))
            .route("/health", get(health_check))
            .with_state(self.hub.clone())
            .layer(TraceLayer::new_for_http())
    }

    /// Bind the configured address.
    ///
    /// Failing to bind is fatal for the hub, so the error names the address.
    pub async fn bind(&self) -> Result<TcpListener> {
        let address = format!("{}:{}", self.config.host, self.config.port);
        TcpListener::bind((self.config.host.as_str(), self.config.port))
            .await
            .with_context(|| format!("Failed to bind ingest endpoint on {address}"))
    }

    /// Serve on `listener` until `shutdown` resolves.
    pub async fn serve_with_shutdown<F>(self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let local = listener.local_addr().context("Listener has no local address")?;
        let router = self.build_router();

        info!(addr = %local, "Ingest HTTP server listening");

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await
            .context("Ingest HTTP server failed")?;
        Ok(())
    }
}

/// Error response structure.
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
    code: String,
}

/// Health check response.
#[derive(Debug, Serialize)]
struct HealthResponse {
    status: String,
    service: String,
    tests: usize,
    run_id: Option<String>,
}

/// Query parameters for the report endpoint.
#[derive(Debug, Default, Deserialize)]
struct ReportQuery {
    #[serde(default)]
    only_failed: bool,
    name_filter: Option<String>,
}

/// Dispatch one worker event.
async fn submit_event(State(hub): State<Arc<Hub>>, Json(event): Json<HubEvent>) -> Json<Vec<Value>> {
    Json(hub.submit(event).await)
}

/// Report data for the current snapshot.
async fn live_report(
    State(hub): State<Arc<Hub>>,
    Query(params): Query<ReportQuery>,
) -> Result<Json<ReportData>, (StatusCode, Json<ErrorResponse>)> {
    let options = ReportOptions {
        only_failed: params.only_failed,
        name_filter: params.name_filter,
    };
    hub.report(&options).await.map(Json).map_err(|e| {
        (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: e.to_string(),
                code: "INVALID_FILTER".to_string(),
            }),
        )
    })
}

/// Health check endpoint.
async fn health_check(State(hub): State<Arc<Hub>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: "testhub".to_string(),
        tests: hub.store().len().await,
        run_id: hub.run_context().await.run_id,
    })
}
