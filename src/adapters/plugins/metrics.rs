//! Metrics plugin.
//!
//! Pushes one data point per finished test to a metrics gateway:
//! `GET http://<host>:<port>/add_metric/<test_name>/<overall>/<duration>`.
//!
//! ```yaml
//! plugins:
//!   metrics:
//!     enabled: true
//!     host: 127.0.0.1
//!     port: 5000
//! ```

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, Url};
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::domain::models::{test_ident, FinishTest, Hook, HubEvent, PluginConfig};
use crate::domain::{PluginError, PluginResult};
use crate::services::hook_dispatcher::{Contribution, HookContext, Subscriber};
use crate::services::plugin::{ConfigGate, Plugin};

pub const NAME: &str = "metrics";

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 5000;
const DEFAULT_TIMEOUT_MS: u64 = 5000;

struct Settings {
    client: Client,
    base_url: Url,
}

/// Reports each test's verdict and duration to a metrics gateway.
#[derive(Default)]
pub struct MetricsPlugin {
    gate: ConfigGate<Settings>,
}

impl MetricsPlugin {
    pub fn new() -> Self {
        Self::default()
    }

    fn metric_url(base: &Url, test_name: &str, overall: &str, duration: f64) -> PluginResult<Url> {
        let mut url = base.clone();
        url.path_segments_mut()
            .map_err(|()| PluginError::Other(format!("cannot append path to {base}")))?
            .pop_if_empty()
            .extend(["add_metric", test_name, overall, &duration.to_string()]);
        Ok(url)
    }

    async fn push(&self, settings: &Settings, finish: &FinishTest, ctx: &HookContext) -> PluginResult<()> {
        let test_ident = test_ident(&finish.test_location, &finish.test_name);
        let Some(record) = ctx.store.get(&test_ident).await else {
            debug!(test_ident = %test_ident, "No record for finished test, skipping metric");
            return Ok(());
        };
        let overall = record.overall_or_classify();
        let duration = record.report_duration_secs(Utc::now());
        let url = Self::metric_url(&settings.base_url, &finish.test_name, overall.as_str(), duration)?;

        match settings.client.get(url.clone()).send().await {
            Ok(response) if response.status().is_success() => {
                debug!(url = %url, "Metric pushed");
            }
            Ok(response) => {
                warn!(url = %url, status = %response.status(), "Metrics gateway rejected data point");
            }
            Err(e) => {
                warn!(url = %url, error = %e, "Failed to reach metrics gateway");
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Subscriber for MetricsPlugin {
    fn name(&self) -> &str {
        NAME
    }

    #[instrument(skip_all, fields(plugin = NAME))]
    async fn on_hook(
        &self,
        event: &HubEvent,
        ctx: &HookContext,
    ) -> PluginResult<Option<Contribution>> {
        let Some(settings) = self.gate.settings() else {
            return Ok(None);
        };
        if let HubEvent::FinishTest(finish) = event {
            self.push(&settings, finish, ctx).await?;
        }
        Ok(None)
    }
}

impl Plugin for MetricsPlugin {
    fn initialize(&self) -> Vec<Hook> {
        vec![Hook::FinishTest]
    }

    fn configure(&self, config: &PluginConfig) -> PluginResult<()> {
        let host = config.get_str("host").unwrap_or(DEFAULT_HOST);
        let port = match config.get("port") {
            None => DEFAULT_PORT,
            Some(Value::Number(n)) => n
                .as_u64()
                .and_then(|n| u16::try_from(n).ok())
                .ok_or_else(|| invalid_option("port", &n.to_string()))?,
            Some(Value::String(s)) => s.parse().map_err(|_| invalid_option("port", s))?,
            Some(other) => return Err(invalid_option("port", &other.to_string())),
        };
        let timeout_ms = config
            .get("timeout_ms")
            .and_then(Value::as_u64)
            .unwrap_or(DEFAULT_TIMEOUT_MS);

        let base_url = Url::parse(&format!("http://{host}:{port}/"))
            .map_err(|e| invalid_option("host", &e.to_string()))?;
        let client = Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()?;

        self.gate.configure(Settings { client, base_url });
        Ok(())
    }

    fn is_configured(&self) -> bool {
        self.gate.is_configured()
    }
}

fn invalid_option(key: &str, value: &str) -> PluginError {
    PluginError::InvalidOption {
        plugin: NAME.to_string(),
        key: key.to_string(),
        reason: format!("invalid value '{value}'"),
    }
}
