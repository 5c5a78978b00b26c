//! The aggregation hub.
//!
//! `Hub` owns the dispatcher, the record store and the run context, and is
//! the single entry point for worker events. It is constructed once per run
//! and shared behind an `Arc`.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{info, instrument, warn};

use super::artifact_store::ArtifactStore;
use super::hook_dispatcher::{HookContext, HookDispatcher, HubUpdate, UpdateSink};
use super::report::{ReportBuilder, ReportData, ReportOptions};
use crate::domain::models::{Config, HubEvent, RunContext};

/// Context object tying dispatch to state.
pub struct Hub {
    config: Config,
    dispatcher: HookDispatcher,
    store: Arc<ArtifactStore>,
    run: RwLock<RunContext>,
}

impl Hub {
    pub fn new(config: Config, dispatcher: HookDispatcher) -> Self {
        Self {
            config,
            dispatcher,
            store: Arc::new(ArtifactStore::new()),
            run: RwLock::new(RunContext::default()),
        }
    }

    pub const fn config(&self) -> &Config {
        &self.config
    }

    pub const fn dispatcher(&self) -> &HookDispatcher {
        &self.dispatcher
    }

    pub fn store(&self) -> Arc<ArtifactStore> {
        self.store.clone()
    }

    pub async fn run_context(&self) -> RunContext {
        self.run.read().await.clone()
    }

    /// Context handed to subscribers for the next event.
    pub async fn hook_context(&self) -> HookContext {
        HookContext {
            store: self.store.clone(),
            run: self.run_context().await,
            artifact_dir: self.config.artifact_dir(),
            per_run: self.config.per_run,
        }
    }

    /// Dispatch one worker event and return the subscribers' passthrough values.
    #[instrument(skip(self, event), fields(hook = %event.hook()))]
    pub async fn submit(&self, event: HubEvent) -> Vec<Value> {
        match &event {
            HubEvent::StartSession(start) => {
                let mut run = self.run.write().await;
                let run_id = run.start(start.run_id.clone());
                info!(run_id, "Session started");
            }
            HubEvent::FinishSession => {
                self.run.write().await.finish();
                let tests = self.store.len().await;
                info!(tests, "Session finished");
            }
            _ => {}
        }

        let ctx = self.hook_context().await;
        self.dispatcher.fire(&event, &ctx, self).await
    }

    /// Report data for the current state of the run.
    pub async fn report(&self, options: &ReportOptions) -> Result<ReportData, regex::Error> {
        let builder = ReportBuilder::new(options)?;
        let ctx = self.hook_context().await;
        let records = self.store.all().await;
        Ok(builder.build(&records, &ctx.run, &ctx.report_dir(), Utc::now()))
    }
}

#[async_trait]
impl UpdateSink for Hub {
    async fn apply(&self, update: HubUpdate) {
        match update {
            HubUpdate::Record { test_ident, update } => self.store.merge(&test_ident, update).await,
            HubUpdate::Raw { test_ident, update } => {
                if let Err(e) = self.store.merge_value(&test_ident, update).await {
                    warn!(test_ident = %test_ident, error = %e, "Rejected record update");
                }
            }
            HubUpdate::Session(details) => self.run.write().await.details.merge(details),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::status::PHASE_CALL;
    use crate::domain::models::{
        DispatchConfig, Hook, RecordUpdate, SessionDetails, StartSession, UpdateArtifact,
    };
    use crate::domain::PluginResult;
    use crate::services::hook_dispatcher::{Contribution, Subscriber};
    use serde_json::json;

    /// Forwards update_artifact payloads untouched.
    struct Forwarder;

    #[async_trait]
    impl Subscriber for Forwarder {
        fn name(&self) -> &str {
            "forwarder"
        }

        async fn on_hook(
            &self,
            event: &HubEvent,
            _ctx: &HookContext,
        ) -> PluginResult<Option<Contribution>> {
            let HubEvent::UpdateArtifact(update) = event else {
                return Ok(None);
            };
            Ok(Some(Contribution::default().with_update(HubUpdate::Raw {
                test_ident: event.test_ident().unwrap_or_default(),
                update: update.update.clone(),
            })))
        }
    }

    fn hub() -> Hub {
        let mut dispatcher = HookDispatcher::new(&DispatchConfig::default());
        dispatcher.register(Hook::UpdateArtifact, Arc::new(Forwarder));
        Hub::new(Config::default(), dispatcher)
    }

    fn update_artifact(update: Value) -> HubEvent {
        HubEvent::UpdateArtifact(UpdateArtifact {
            test_location: "mod".to_string(),
            test_name: "t1".to_string(),
            update,
        })
    }

    #[tokio::test]
    async fn test_start_session_assigns_run_id() {
        let hub = hub();
        hub.submit(HubEvent::StartSession(StartSession {
            run_id: Some("run-7".to_string()),
        }))
        .await;
        let run = hub.run_context().await;
        assert_eq!(run.run_id.as_deref(), Some("run-7"));
        assert!(run.is_running());

        hub.submit(HubEvent::FinishSession).await;
        assert!(!hub.run_context().await.is_running());
    }

    #[tokio::test]
    async fn test_raw_updates_are_validated() {
        let hub = hub();
        hub.submit(update_artifact(json!({"bogus": 1}))).await;
        assert!(hub.store().is_empty().await);

        hub.submit(update_artifact(json!({"durations": {"call": 0.5}}))).await;
        let record = hub.store().get("mod/t1").await.unwrap();
        assert!((record.durations[PHASE_CALL] - 0.5).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_session_updates_merge_into_run_context() {
        let hub = hub();
        hub.apply(HubUpdate::Session(SessionDetails {
            version: Some("5.0".to_string()),
            ..Default::default()
        }))
        .await;
        hub.apply(HubUpdate::Record {
            test_ident: "mod/t2".to_string(),
            update: RecordUpdate::default().with_duration(PHASE_CALL, 1.0),
        })
        .await;

        assert_eq!(hub.run_context().await.details.version.as_deref(), Some("5.0"));
        assert!(hub.store().contains("mod/t2").await);
    }

    fn assert_send<T: Send>(_: &T) {}

    #[test]
    fn test_submit_future_is_send() {
        let hub = hub();
        for event in [
            HubEvent::StartSession(StartSession::default()),
            HubEvent::FinishSession,
            update_artifact(json!({})),
        ] {
            let submit = hub.submit(event);
            assert_send(&submit);
        }
    }
}
