//! Error types for the permwatch CLI
//!
//! Every variant is user-facing: the message says what went wrong and what
//! to do about it.

use permwatch_engine::EngineError;
use thiserror::Error;

/// Result type alias for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;

#[derive(Error, Debug)]
pub enum CliError {
    /// Configuration is missing or invalid
    #[error("Configuration error: {0}. Check your environment variables or .env file.")]
    Config(String),

    /// The audit database could not be reached or updated
    #[error("Audit database error: {0}. Check PERMWATCH_DATABASE_URL and that the database is running.")]
    Database(String),

    /// The repository snapshot could not be read
    #[error("Repository error: {0}. Check the file passed with --repository.")]
    Repository(String),

    #[error("Node not found: '{0}'. Check the node id against the repository snapshot.")]
    NodeNotFound(String),

    #[error(transparent)]
    Engine(EngineError),

    /// File system operation failed
    #[error("File operation failed: {0}. Check file permissions and disk space.")]
    Io(#[from] std::io::Error),

    /// JSON output failed
    #[error("Failed to render JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl CliError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn repository(msg: impl Into<String>) -> Self {
        Self::Repository(msg.into())
    }
}

impl From<EngineError> for CliError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Config(msg) => CliError::Config(msg),
            EngineError::Persistence(msg) => CliError::Database(msg),
            EngineError::Database(e) => CliError::Database(e.to_string()),
            other => CliError::Engine(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_errors_get_hints() {
        let err = CliError::from(EngineError::config("Reconciler needs an audit store"));
        assert!(matches!(err, CliError::Config(_)));
        assert!(err.to_string().contains(".env"));

        let err = CliError::from(EngineError::persistence("Failed to create permission_audit"));
        assert!(err.to_string().contains("PERMWATCH_DATABASE_URL"));

        let err = CliError::from(EngineError::provider("Unknown group: GROUP_X"));
        assert_eq!(err.to_string(), "Provider error: Unknown group: GROUP_X");
    }
}
