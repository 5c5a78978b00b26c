//! Named-hook publish/subscribe dispatcher.
//!
//! Subscribers are kept per hook in registration order. Firing a hook calls
//! each subscriber in turn and hands its partial updates to an
//! [`UpdateSink`] before the next subscriber runs, so later subscribers
//! observe the merges of earlier ones. A subscriber that fails, panics or
//! exceeds the configured timeout loses its contribution for that event and
//! nothing else.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use super::artifact_store::ArtifactStore;
use super::plugin::Plugin;
use crate::domain::models::{
    segment, DispatchConfig, Hook, HubEvent, PerRun, RecordUpdate, RunContext, SessionDetails,
};
use crate::domain::PluginResult;

/// A partial update produced by a subscriber.
#[derive(Debug, Clone, PartialEq)]
pub enum HubUpdate {
    /// Typed update for one test record
    Record {
        test_ident: String,
        update: RecordUpdate,
    },
    /// Untyped update for one test record, validated when merged
    Raw { test_ident: String, update: Value },
    /// Run-level session details
    Session(SessionDetails),
}

/// Everything a subscriber returns for one event.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Contribution {
    /// Value handed back to the caller of [`HookDispatcher::fire`]
    pub passthrough: Option<Value>,
    /// Updates folded into the hub state
    pub updates: Vec<HubUpdate>,
}

impl Contribution {
    pub fn record(test_ident: impl Into<String>, update: RecordUpdate) -> Self {
        Self::default().with_update(HubUpdate::Record {
            test_ident: test_ident.into(),
            update,
        })
    }

    pub fn passthrough(value: Value) -> Self {
        Self {
            passthrough: Some(value),
            updates: Vec::new(),
        }
    }

    pub fn with_update(mut self, update: HubUpdate) -> Self {
        self.updates.push(update);
        self
    }
}

/// Receives the updates of each subscriber as soon as it returns.
#[async_trait]
pub trait UpdateSink: Send + Sync {
    async fn apply(&self, update: HubUpdate);
}

/// Read-only view of the hub handed to subscribers.
#[derive(Clone)]
pub struct HookContext {
    pub store: Arc<ArtifactStore>,
    /// Run context as of the moment the event was submitted
    pub run: RunContext,
    pub artifact_dir: PathBuf,
    pub per_run: PerRun,
}

impl HookContext {
    pub fn new(store: Arc<ArtifactStore>, artifact_dir: PathBuf) -> Self {
        Self {
            store,
            run: RunContext::default(),
            artifact_dir,
            per_run: PerRun::default(),
        }
    }

    /// Directory holding everything produced for this run.
    pub fn report_dir(&self) -> PathBuf {
        match (self.per_run, self.run.run_id.as_deref()) {
            (PerRun::Run, Some(run_id)) => self.artifact_dir.join(run_id),
            _ => self.artifact_dir.clone(),
        }
    }

    /// Directory holding the artifacts of one test.
    ///
    /// Each identifier segment becomes one directory level. Slashes inside a
    /// bracketed parameter segment are flattened to `_`.
    pub fn artifact_path(&self, test_ident: &str) -> PathBuf {
        let mut path = self.report_dir();
        for seg in segment(test_ident) {
            match seg.as_str() {
                "." | ".." => path.push("_"),
                _ => path.push(seg.replace('/', "_")),
            }
        }
        path
    }
}

/// An observer callback subscribed to one or more hooks.
#[async_trait]
pub trait Subscriber: Send + Sync {
    fn name(&self) -> &str;

    /// React to `event`. `Ok(None)` means the subscriber has nothing to add.
    async fn on_hook(
        &self,
        event: &HubEvent,
        ctx: &HookContext,
    ) -> PluginResult<Option<Contribution>>;
}

/// Registry mapping hooks to ordered subscriber lists.
pub struct HookDispatcher {
    subscribers: HashMap<Hook, Vec<Arc<dyn Subscriber>>>,
    timeout: Duration,
}

impl HookDispatcher {
    pub fn new(config: &DispatchConfig) -> Self {
        Self {
            subscribers: HashMap::new(),
            timeout: Duration::from_millis(config.subscriber_timeout_ms),
        }
    }

    /// Append `subscriber` to the list for `hook`.
    pub fn register(&mut self, hook: Hook, subscriber: Arc<dyn Subscriber>) {
        debug!(hook = %hook, subscriber = subscriber.name(), "Registering subscriber");
        self.subscribers.entry(hook).or_default().push(subscriber);
    }

    /// Subscribe `plugin` to every hook it asks for.
    pub fn register_plugin<P: Plugin + 'static>(&mut self, plugin: Arc<P>) {
        let hooks = plugin.initialize();
        info!(plugin = plugin.name(), hooks = hooks.len(), "Registering plugin");
        for hook in hooks {
            self.register(hook, plugin.clone());
        }
    }

    /// Names of the subscribers for `hook`, in call order.
    pub fn subscribers(&self, hook: Hook) -> Vec<&str> {
        self.subscribers
            .get(&hook)
            .map(|subs| subs.iter().map(|s| s.name()).collect())
            .unwrap_or_default()
    }

    /// Call every subscriber of the event's hook and collect passthrough values.
    #[instrument(skip_all, fields(hook = %event.hook()))]
    pub async fn fire(
        &self,
        event: &HubEvent,
        ctx: &HookContext,
        sink: &dyn UpdateSink,
    ) -> Vec<Value> {
        let Some(subscribers) = self.subscribers.get(&event.hook()) else {
            debug!("No subscribers registered for hook");
            return Vec::new();
        };

        let mut passthrough = Vec::new();
        for subscriber in subscribers {
            let call = AssertUnwindSafe(subscriber.on_hook(event, ctx)).catch_unwind();
            match tokio::time::timeout(self.timeout, call).await {
                Ok(Ok(Ok(Some(contribution)))) => {
                    passthrough.extend(contribution.passthrough);
                    for update in contribution.updates {
                        sink.apply(update).await;
                    }
                }
                Ok(Ok(Ok(None))) => {}
                Ok(Ok(Err(e))) => {
                    warn!(subscriber = subscriber.name(), error = %e, "Subscriber failed, contribution dropped");
                }
                Ok(Err(_)) => {
                    warn!(subscriber = subscriber.name(), "Subscriber panicked, contribution dropped");
                }
                Err(_) => {
                    warn!(
                        subscriber = subscriber.name(),
                        timeout_ms = self.timeout.as_millis(),
                        "Subscriber timed out, contribution dropped"
                    );
                }
            }
        }
        passthrough
    }
}
