use std::path::PathBuf;

use thiserror::Error;

use crate::rl::core::Role;

/// Main error type for the training bridge
#[derive(Error, Debug)]
pub enum TrainerError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    // Network errors
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    // Serialization errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // Protocol errors: malformed message or missing/ill-typed fields
    #[error("Protocol error: {0}")]
    Protocol(String),

    // Observation/action dimensionality differs from the active configuration
    #[error("Dimension mismatch: expected obs_dim {expected}, got {actual}")]
    ConfigMismatch { expected: usize, actual: usize },

    // Learning errors
    #[error("Update for {role} rolled back: {reason}")]
    UpdateInstability { role: Role, reason: String },

    #[error("No policy available for {0}")]
    PolicyUnavailable(Role),

    // Persistence errors (checkpoints, metrics, metadata)
    #[error("Persistence error at {path:?}: {reason}")]
    Persistence { path: PathBuf, reason: String },

    #[error("Model record error: {0}")]
    Recorder(String),

    #[error("Tensor error: {0}")]
    Tensor(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl TrainerError {
    /// Wrap an I/O failure on a persisted artifact
    pub fn persistence(path: impl Into<PathBuf>, err: impl std::fmt::Display) -> Self {
        TrainerError::Persistence {
            path: path.into(),
            reason: err.to_string(),
        }
    }
}

/// Result type alias for TrainerError
pub type Result<T> = std::result::Result<T, TrainerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_persistence_error_display() {
        let err = TrainerError::persistence("logs/metrics.csv", "disk full");
        let msg = err.to_string();
        assert!(msg.contains("metrics.csv"));
        assert!(msg.contains("disk full"));
    }

    #[test]
    fn test_mismatch_display() {
        let err = TrainerError::ConfigMismatch {
            expected: 72,
            actual: 80,
        };
        let msg = err.to_string();
        assert!(msg.contains("72"));
        assert!(msg.contains("80"));
    }
}
