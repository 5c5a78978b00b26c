//! Observer lifecycle.
//!
//! An observer subscribes to hooks in [`Plugin::initialize`] and becomes
//! usable once [`Plugin::configure`] has accepted its options. Until then
//! every callback is a no-op that returns `Ok(None)`.

use std::sync::{Arc, PoisonError, RwLock};

use super::hook_dispatcher::Subscriber;
use crate::domain::models::{Hook, PluginConfig};
use crate::domain::PluginResult;

/// An observer with a configuration step.
pub trait Plugin: Subscriber {
    /// Hooks this plugin subscribes to.
    fn initialize(&self) -> Vec<Hook>;

    /// Validate and apply `config`.
    fn configure(&self, config: &PluginConfig) -> PluginResult<()>;

    fn is_configured(&self) -> bool;
}

/// Configuration state of an observer.
#[derive(Debug, Clone, Default)]
pub enum PluginState<T> {
    #[default]
    Unconfigured,
    Configured(T),
}

/// Holds the settings of an observer once it has been configured.
#[derive(Debug)]
pub struct ConfigGate<T> {
    state: RwLock<PluginState<Arc<T>>>,
}

impl<T> Default for ConfigGate<T> {
    fn default() -> Self {
        Self {
            state: RwLock::new(PluginState::Unconfigured),
        }
    }
}

impl<T> ConfigGate<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move to `Configured`, replacing any earlier settings.
    pub fn configure(&self, settings: T) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        *state = PluginState::Configured(Arc::new(settings));
    }

    /// Current settings, `None` while unconfigured.
    pub fn settings(&self) -> Option<Arc<T>> {
        match &*self.state.read().unwrap_or_else(PoisonError::into_inner) {
            PluginState::Configured(settings) => Some(settings.clone()),
            PluginState::Unconfigured => None,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.settings().is_some()
    }
}
