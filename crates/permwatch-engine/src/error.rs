//! Error types for the reconciliation engine

use permwatch_common::PermwatchError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

/// Error type for engine operations
///
/// Only [`EngineError::Config`] and a failed primary table create are meant to
/// stop anything. Everything else is recovered by the caller and counted in the
/// run report.
#[derive(Error, Debug)]
pub enum EngineError {
    /// A node, ACL or authority lookup against the repository failed
    #[error("Provider error: {0}")]
    Provider(String),

    /// Schema management or an audit write failed
    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A required collaborator is missing or misconfigured
    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Common(#[from] PermwatchError),
}

/// Coarse category an error is reported under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Provider,
    Persistence,
    Config,
}

impl EngineError {
    pub fn provider(msg: impl Into<String>) -> Self {
        Self::Provider(msg.into())
    }

    pub fn persistence(msg: impl Into<String>) -> Self {
        Self::Persistence(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Provider(_) => ErrorKind::Provider,
            EngineError::Persistence(_) | EngineError::Database(_) => ErrorKind::Persistence,
            EngineError::Config(_) => ErrorKind::Config,
            // Malformed keys and timestamps come out of stored rows
            EngineError::Common(_) => ErrorKind::Persistence,
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::Provider => write!(f, "provider"),
            ErrorKind::Persistence => write!(f, "persistence"),
            ErrorKind::Config => write!(f, "config"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(EngineError::provider("acl lookup").kind(), ErrorKind::Provider);
        assert_eq!(EngineError::persistence("insert").kind(), ErrorKind::Persistence);
        assert_eq!(EngineError::Database(sqlx::Error::RowNotFound).kind(), ErrorKind::Persistence);
        assert_eq!(EngineError::config("no store").kind(), ErrorKind::Config);
    }

    #[test]
    fn test_error_messages() {
        let err = EngineError::config("no audit store configured");
        assert_eq!(err.to_string(), "Configuration error: no audit store configured");
    }
}
