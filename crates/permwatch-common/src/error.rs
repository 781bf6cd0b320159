//! Error types shared across permwatch crates

use thiserror::Error;

/// Result type alias for permwatch operations
pub type Result<T> = std::result::Result<T, PermwatchError>;

/// Main error type for permwatch value types and shared utilities
#[derive(Error, Debug)]
pub enum PermwatchError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid permission key '{0}': expected 'authority:permission'")]
    InvalidPermissionKey(String),

    #[error("Unknown action type: {0}")]
    InvalidActionType(String),

    #[error("Invalid timestamp '{0}'")]
    InvalidTimestamp(String),

    #[error("Configuration error: {0}")]
    Config(String),
}
