use std::time::Duration;
use thiserror::Error;

pub type Result<T, E = RelayError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum RelayError {
    /// Backend name not in the registry.
    #[error("unsupported client type: {name}. Supported types: {supported:?}")]
    UnknownBackend {
        name: String,
        supported: Vec<&'static str>,
    },

    /// Backend is registered but was left out of this build.
    #[error("backend '{name}' is not available in this build (enable the '{feature}' feature)")]
    BackendUnavailable {
        name: &'static str,
        feature: &'static str,
    },

    #[error("invalid configuration: {}", .0.join("; "))]
    InvalidConfig(Vec<String>),

    #[error("broker refused the connection: {0}")]
    ConnectRefused(String),

    #[error("connection timeout after {0:?}")]
    ConnectTimeout(Duration),

    #[error("not connected")]
    NotConnected,

    #[error("MQTT client error: {0}")]
    Client(String),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl RelayError {
    /// Errors that must abort startup rather than be retried.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            RelayError::UnknownBackend { .. }
                | RelayError::BackendUnavailable { .. }
                | RelayError::InvalidConfig(_)
        )
    }

    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            RelayError::ConnectRefused(_)
                | RelayError::ConnectTimeout(_)
                | RelayError::NotConnected
                | RelayError::Client(_)
        )
    }
}
