use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use thiserror::Error;

use crate::domain::models::Config;

/// Configuration file read from the working directory when no path is given
pub const DEFAULT_CONFIG_FILE: &str = "testhub.yaml";

/// Prefix of environment variable overrides
pub const ENV_PREFIX: &str = "TESTHUB_";

const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];
const VALID_LOG_FORMATS: [&str; 2] = ["json", "pretty"];
const VALID_ROTATIONS: [&str; 3] = ["daily", "hourly", "never"];

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("log_dir must be set (config file, TESTHUB_LOG_DIR or --log-dir)")]
    MissingLogDir,

    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    #[error("Invalid subscriber timeout: {0}ms. Must be at least 1")]
    InvalidTimeout(u64),

    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Values given on the command line, applied over every other source
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub port: Option<u16>,
    pub log_dir: Option<PathBuf>,
    pub run_id: Option<String>,
}

impl ConfigOverrides {
    fn apply(&self, config: &mut Config) {
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(log_dir) = &self.log_dir {
            config.log_dir.clone_from(log_dir);
        }
        if let Some(run_id) = &self.run_id {
            config.run_id = Some(run_id.clone());
        }
    }
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. `path`, or `testhub.yaml` in the working directory (optional)
    /// 3. Environment variables (`TESTHUB_*`, `__` separates nested keys)
    /// 4. Command-line overrides
    pub fn load(path: Option<&Path>, overrides: &ConfigOverrides) -> Result<Config> {
        let file = path.map_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE), Path::to_path_buf);
        if path.is_some() && !file.exists() {
            anyhow::bail!("Config file {} does not exist", file.display());
        }

        let mut config: Config = Self::figment(&file)
            .extract()
            .with_context(|| format!("Failed to load configuration (file: {})", file.display()))?;
        overrides.apply(&mut config);

        Self::validate(&config)?;
        Ok(config)
    }

    fn figment(file: &Path) -> Figment {
        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(file))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Validate configuration after loading
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        if config.log_dir.as_os_str().is_empty() {
            return Err(ConfigError::MissingLogDir);
        }

        if !VALID_LOG_LEVELS.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }

        if !VALID_LOG_FORMATS.contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }

        if !VALID_ROTATIONS.contains(&config.logging.rotation.as_str()) {
            return Err(ConfigError::ValidationFailed(format!(
                "logging.rotation '{}' must be one of: daily, hourly, never",
                config.logging.rotation
            )));
        }

        if config.dispatch.subscriber_timeout_ms == 0 {
            return Err(ConfigError::InvalidTimeout(config.dispatch.subscriber_timeout_ms));
        }

        if config.plugins.keys().any(String::is_empty) {
            return Err(ConfigError::ValidationFailed(
                "plugin name cannot be empty".to_string(),
            ));
        }

        Ok(())
    }
}
