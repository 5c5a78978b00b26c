//! Domain layer for the testhub aggregation core
//!
//! This module contains the test record model, the status classification
//! rules, the event vocabulary and the error types.

pub mod errors;
pub mod models;

// Re-export error types for convenient access
pub use errors::{HubError, HubResult, PluginError, PluginResult};
