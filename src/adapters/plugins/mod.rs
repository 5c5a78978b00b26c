//! Observers shipped with the hub.
//!
//! Each sub-module is one plugin implementing
//! [`Plugin`](crate::services::plugin::Plugin). [`register_builtin`] wires
//! them into a dispatcher in their fixed order.

pub mod filedump;
pub mod logger;
pub mod metrics;
pub mod reporter;

use std::sync::Arc;

use tracing::{debug, info};

use crate::domain::models::Config;
use crate::domain::PluginResult;
use crate::services::hook_dispatcher::HookDispatcher;
use crate::services::plugin::Plugin;

pub use filedump::FiledumpPlugin;
pub use logger::LoggerPlugin;
pub use metrics::MetricsPlugin;
pub use reporter::ReporterPlugin;

/// Names of the built-in plugins, in registration order.
pub const BUILTIN: [&str; 4] = [logger::NAME, filedump::NAME, reporter::NAME, metrics::NAME];

/// Register the built-in plugins on `dispatcher`.
///
/// Plugins enabled in `config` are configured before registration;
/// disabled ones are registered unconfigured and ignore every event.
///
/// # Errors
///
/// Returns the first plugin's configuration error, e.g. an invalid
/// `level` for the logger.
pub fn register_builtin(config: &Config, dispatcher: &mut HookDispatcher) -> PluginResult<()> {
    register(config, dispatcher, Arc::new(LoggerPlugin::new()))?;
    register(config, dispatcher, Arc::new(FiledumpPlugin::new()))?;
    register(config, dispatcher, Arc::new(ReporterPlugin::new()))?;
    register(config, dispatcher, Arc::new(MetricsPlugin::new()))?;
    Ok(())
}

fn register<P: Plugin + 'static>(
    config: &Config,
    dispatcher: &mut HookDispatcher,
    plugin: Arc<P>,
) -> PluginResult<()> {
    let plugin_config = config.plugin(plugin.name());
    if plugin_config.enabled {
        plugin.configure(&plugin_config)?;
        info!(plugin = plugin.name(), "Plugin enabled");
    } else {
        debug!(plugin = plugin.name(), "Plugin disabled");
    }
    dispatcher.register_plugin(plugin);
    Ok(())
}
