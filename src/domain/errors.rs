//! Domain errors for the testhub aggregation core.

use thiserror::Error;

/// Errors raised by the merge engine, the per-slave session state and the
/// event model.
#[derive(Debug, Error)]
pub enum HubError {
    #[error("Update for {test_ident} references unknown field: {field}")]
    UnknownField { test_ident: String, field: String },

    #[error("Invalid update for {test_ident}: {reason}")]
    InvalidUpdate { test_ident: String, reason: String },

    #[error("Slave {slaveid} already has a test in progress ({in_flight}), can't start {requested}")]
    SlaveBusy {
        slaveid: String,
        in_flight: String,
        requested: String,
    },

    #[error("No session state for slave {0}")]
    UnknownSlave(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

pub type HubResult<T> = Result<T, HubError>;

impl From<serde_json::Error> for HubError {
    fn from(err: serde_json::Error) -> Self {
        HubError::Serialization(err.to_string())
    }
}

/// Errors an observer can return from a hook callback or from `configure`.
///
/// These never escape the dispatcher: they are logged and the observer's
/// contribution for that event is dropped.
#[derive(Debug, Error)]
pub enum PluginError {
    #[error("Invalid option {key} for plugin {plugin}: {reason}")]
    InvalidOption {
        plugin: String,
        key: String,
        reason: String,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Hub(#[from] HubError),

    #[error("{0}")]
    Other(String),
}

pub type PluginResult<T> = Result<T, PluginError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slave_busy_message_names_both_tests() {
        let err = HubError::SlaveBusy {
            slaveid: "gw0".to_string(),
            in_flight: "mod/test_a".to_string(),
            requested: "mod/test_b".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("gw0"));
        assert!(msg.contains("mod/test_a"));
        assert!(msg.contains("mod/test_b"));
    }

    #[test]
    fn test_hub_error_lifts_into_plugin_error() {
        let err: PluginError = HubError::UnknownSlave("Master".to_string()).into();
        assert!(matches!(err, PluginError::Hub(HubError::UnknownSlave(_))));
    }
}
