//! Reporter plugin.
//!
//! Turns lifecycle events into record updates and renders the report when
//! the session ends or a report is requested.
//!
//! ```yaml
//! plugins:
//!   reporter:
//!     enabled: true
//!     only_failed: false
//!     name_filter: chrome
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{info, instrument, warn};

use crate::domain::models::{
    ExceptionInfo, Hook, HubEvent, PhaseStatus, PluginConfig, RecordUpdate, TestRecord,
};
use crate::domain::{HubError, PluginError, PluginResult};
use crate::services::hook_dispatcher::{Contribution, HookContext, HubUpdate, Subscriber};
use crate::services::plugin::{ConfigGate, Plugin};
use crate::services::report::{JsonReportRenderer, ReportBuilder, ReportOptions, ReportRenderer};

pub const NAME: &str = "reporter";

struct Settings {
    builder: ReportBuilder,
}

/// Builds the canonical record and renders the report.
pub struct ReporterPlugin {
    gate: ConfigGate<Settings>,
    renderer: Arc<dyn ReportRenderer>,
}

impl Default for ReporterPlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl ReporterPlugin {
    pub fn new() -> Self {
        Self::with_renderer(Arc::new(JsonReportRenderer))
    }

    pub fn with_renderer(renderer: Arc<dyn ReportRenderer>) -> Self {
        Self {
            gate: ConfigGate::new(),
            renderer,
        }
    }

    async fn finish_test(
        &self,
        test_ident: String,
        slaveid: Option<String>,
        ctx: &HookContext,
    ) -> Contribution {
        let overall = match ctx.store.get(&test_ident).await {
            Some(record) => record.classify(),
            None => {
                warn!(test_ident = %test_ident, "Finish of unknown test");
                TestRecord::default().classify()
            }
        };
        Contribution::record(
            test_ident,
            RecordUpdate {
                finish_time: Some(Utc::now()),
                slaveid,
                overall: Some(overall),
                ..Default::default()
            },
        )
    }

    async fn run_report(&self, settings: &Settings, ctx: &HookContext) -> PluginResult<()> {
        let records = ctx.store.all().await;
        let report_dir = ctx.report_dir();
        let report = settings
            .builder
            .build(&records, &ctx.run, &report_dir, Utc::now());
        let path = self.renderer.render(&report, &report_dir)?;
        info!(path = ?path, "Report rendered");
        Ok(())
    }
}

#[async_trait]
impl Subscriber for ReporterPlugin {
    fn name(&self) -> &str {
        NAME
    }

    #[instrument(skip_all, fields(plugin = NAME, hook = %event.hook()))]
    async fn on_hook(
        &self,
        event: &HubEvent,
        ctx: &HookContext,
    ) -> PluginResult<Option<Contribution>> {
        let Some(settings) = self.gate.settings() else {
            return Ok(None);
        };

        let contribution = match event {
            HubEvent::StartTest(start) => Contribution::record(
                event.test_ident().unwrap_or_default(),
                RecordUpdate {
                    start_time: Some(Utc::now()),
                    slaveid: start.slaveid.clone(),
                    metadata: start.metadata.clone().unwrap_or_default(),
                    params: start.params.clone().unwrap_or_default(),
                    test_module: Some(start.test_location.clone()),
                    test_name: Some(start.test_name.clone()),
                    ..Default::default()
                },
            ),
            HubEvent::ReportTest(report) => Contribution::record(
                event.test_ident().unwrap_or_default(),
                RecordUpdate::default()
                    .with_status(
                        report.test_when.clone(),
                        PhaseStatus::new(report.test_outcome, report.test_xfail),
                    )
                    .with_duration(report.test_when.clone(), report.test_phase_duration),
            ),
            HubEvent::FinishTest(finish) => {
                self.finish_test(
                    event.test_ident().unwrap_or_default(),
                    finish.slaveid.clone(),
                    ctx,
                )
                .await
            }
            HubEvent::SkipTest(skip) => Contribution::record(
                event.test_ident().unwrap_or_default(),
                RecordUpdate {
                    skipped: Some(skip.skip_data.clone()),
                    ..Default::default()
                },
            ),
            HubEvent::TbInfo(tb) => Contribution::record(
                event.test_ident().unwrap_or_default(),
                RecordUpdate {
                    exception: Some(ExceptionInfo {
                        exception: tb.exception.clone(),
                        file_line: tb.file_line.clone(),
                        short_tb: tb.short_tb.clone(),
                    }),
                    ..Default::default()
                },
            ),
            HubEvent::SessionInfo(details) => {
                let value = serde_json::to_value(details).map_err(HubError::from)?;
                Contribution::passthrough(value).with_update(HubUpdate::Session(details.clone()))
            }
            HubEvent::UpdateArtifact(update) => Contribution::default().with_update(HubUpdate::Raw {
                test_ident: event.test_ident().unwrap_or_default(),
                update: update.update.clone(),
            }),
            HubEvent::FinishSession | HubEvent::BuildReport => {
                self.run_report(&settings, ctx).await?;
                return Ok(None);
            }
            _ => return Ok(None),
        };
        Ok(Some(contribution))
    }
}

impl Plugin for ReporterPlugin {
    fn initialize(&self) -> Vec<Hook> {
        vec![
            Hook::ReportTest,
            Hook::FinishSession,
            Hook::BuildReport,
            Hook::StartTest,
            Hook::SkipTest,
            Hook::FinishTest,
            Hook::SessionInfo,
            Hook::TbInfo,
            Hook::UpdateArtifact,
        ]
    }

    fn configure(&self, config: &PluginConfig) -> PluginResult<()> {
        let options = ReportOptions {
            only_failed: config.get_bool("only_failed").unwrap_or(false),
            name_filter: config.get_str("name_filter").map(str::to_string),
        };
        let builder = ReportBuilder::new(&options).map_err(|e| PluginError::InvalidOption {
            plugin: NAME.to_string(),
            key: "name_filter".to_string(),
            reason: e.to_string(),
        })?;
        self.gate.configure(Settings { builder });
        Ok(())
    }

    fn is_configured(&self) -> bool {
        self.gate.is_configured()
    }
}
