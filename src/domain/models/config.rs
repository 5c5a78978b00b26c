use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Main configuration structure for the hub
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Root directory for run output
    #[serde(default)]
    pub log_dir: PathBuf,

    /// Directory for per-test artifacts, `<log_dir>/artifacts` when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_dir: Option<PathBuf>,

    /// How report output is laid out across runs
    #[serde(default)]
    pub per_run: PerRun,

    /// Run id announced at session start, generated when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,

    /// Listening endpoint for worker events
    #[serde(default)]
    pub server: ServerConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Hook dispatch configuration
    #[serde(default)]
    pub dispatch: DispatchConfig,

    /// Observer configurations, keyed by plugin name
    #[serde(default)]
    pub plugins: BTreeMap<String, PluginConfig>,
}

impl Config {
    /// Effective artifact directory.
    pub fn artifact_dir(&self) -> PathBuf {
        self.artifact_dir
            .clone()
            .unwrap_or_else(|| self.log_dir.join("artifacts"))
    }

    /// Configuration for `name`, disabled when absent.
    pub fn plugin(&self, name: &str) -> PluginConfig {
        self.plugins.get(name).cloned().unwrap_or_default()
    }
}

/// Report directory layout
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PerRun {
    /// One directory per test under the artifact dir
    #[default]
    Test,
    /// Everything for a run lives under `<artifact_dir>/<run_id>`
    Run,
    /// Flat artifact dir
    None,
}

/// Listening endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ServerConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on, 0 picks an ephemeral port
    #[serde(default)]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: 0,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Directory for the hub's own log files, stdout only when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<PathBuf>,

    /// Log file rotation: daily, hourly or never
    #[serde(default = "default_log_rotation")]
    pub rotation: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_log_rotation() -> String {
    "daily".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            log_dir: None,
            rotation: default_log_rotation(),
        }
    }
}

/// Hook dispatch configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DispatchConfig {
    /// Upper bound for a single subscriber callback, in milliseconds
    #[serde(default = "default_subscriber_timeout_ms")]
    pub subscriber_timeout_ms: u64,
}

const fn default_subscriber_timeout_ms() -> u64 {
    15_000
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            subscriber_timeout_ms: default_subscriber_timeout_ms(),
        }
    }
}

/// Per-observer configuration.
///
/// Only `enabled` is common to all observers; every other key is left to
/// the observer to interpret and unknown keys are ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PluginConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(flatten)]
    pub options: Map<String, Value>,
}

impl PluginConfig {
    pub fn enabled() -> Self {
        Self {
            enabled: true,
            options: Map::new(),
        }
    }

    pub fn with_option(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.options.insert(key.to_string(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.options.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.options.get(key).and_then(Value::as_str)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.options.get(key).and_then(Value::as_bool)
    }
}
