//! Testhub - aggregation hub for test-run telemetry
//!
//! Parallel test workers report lifecycle events (test started, phase
//! reported, test finished, log lines, artifacts). The hub dispatches each
//! event to its observers, merges their partial updates into one record per
//! test and builds a hierarchical report from the result.
//!
//! # Architecture
//!
//! - **Domain Layer** (`domain`): records, events, status classification
//! - **Service Layer** (`services`): hook dispatcher, artifact store, report builder
//! - **Adapters** (`adapters`): built-in observers and the HTTP ingest endpoint
//! - **Infrastructure Layer** (`infrastructure`): configuration and logging
//! - **CLI Layer** (`cli`): command-line interface
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use testhub::adapters::plugins::register_builtin;
//! use testhub::{Config, HookDispatcher, Hub};
//!
//! let config = Config::default();
//! let mut dispatcher = HookDispatcher::new(&config.dispatch);
//! register_builtin(&config, &mut dispatcher)?;
//! let hub = Arc::new(Hub::new(config, dispatcher));
//! ```

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use domain::models::{
    Config, HubEvent, OverallStatus, PluginConfig, RecordUpdate, TestRecord,
};
pub use domain::{HubError, PluginError};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use services::{ArtifactStore, HookDispatcher, Hub, ReportBuilder, ReportNode};
