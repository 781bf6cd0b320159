//! Configuration management for the permwatch CLI
//!
//! Values come from the environment (a `.env` file is loaded first) and can
//! be overridden by command-line flags.

use crate::error::{CliError, Result};
use permwatch_engine::store::{DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_MAX_CONNECTIONS};
use permwatch_engine::StoreOptions;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

// ============================================================================
// Environment Variables
// ============================================================================

pub const ENV_DATABASE_URL: &str = "PERMWATCH_DATABASE_URL";
pub const ENV_MAX_CONNECTIONS: &str = "PERMWATCH_DATABASE_MAX_CONNECTIONS";
pub const ENV_CONNECT_TIMEOUT: &str = "PERMWATCH_DATABASE_CONNECT_TIMEOUT";
pub const ENV_REPOSITORY: &str = "PERMWATCH_REPOSITORY";

/// URL schemes the audit store can connect to
const SUPPORTED_SCHEMES: &[&str] = &["postgres", "postgresql", "mysql", "sqlite"];

/// CLI configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Audit database URL
    pub database_url: Option<String>,

    pub max_connections: u32,

    /// Connect timeout in seconds
    pub connect_timeout: u64,

    /// Repository snapshot file
    pub repository: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: None,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT_SECS,
            repository: None,
        }
    }
}

impl Config {
    /// Load `.env`, then read the environment
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_env()
    }

    /// Read the environment only
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(url) = std::env::var(ENV_DATABASE_URL) {
            config.database_url = Some(url);
        }

        if let Ok(value) = std::env::var(ENV_MAX_CONNECTIONS) {
            config.max_connections = value.parse().map_err(|_| {
                CliError::config(format!("{ENV_MAX_CONNECTIONS} must be a number, got '{value}'"))
            })?;
        }

        if let Ok(value) = std::env::var(ENV_CONNECT_TIMEOUT) {
            config.connect_timeout = value.parse().map_err(|_| {
                CliError::config(format!(
                    "{ENV_CONNECT_TIMEOUT} must be a number of seconds, got '{value}'"
                ))
            })?;
        }

        if let Ok(path) = std::env::var(ENV_REPOSITORY) {
            config.repository = Some(PathBuf::from(path));
        }

        Ok(config)
    }

    /// Apply command-line flags on top of the environment
    pub fn with_overrides(mut self, database_url: Option<String>, repository: Option<PathBuf>) -> Self {
        if database_url.is_some() {
            self.database_url = database_url;
        }
        if repository.is_some() {
            self.repository = repository;
        }
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        let url = self.database_url()?;
        let scheme = url.split(':').next().unwrap_or_default().to_ascii_lowercase();
        if !SUPPORTED_SCHEMES.contains(&scheme.as_str()) {
            return Err(CliError::config(format!(
                "Unsupported database URL scheme '{scheme}' (expected one of: {})",
                SUPPORTED_SCHEMES.join(", ")
            )));
        }

        if self.max_connections == 0 {
            return Err(CliError::config(format!("{ENV_MAX_CONNECTIONS} must be at least 1")));
        }

        if self.connect_timeout == 0 {
            return Err(CliError::config(format!("{ENV_CONNECT_TIMEOUT} must be at least 1 second")));
        }

        Ok(())
    }

    pub fn database_url(&self) -> Result<&str> {
        match self.database_url.as_deref() {
            Some(url) if !url.trim().is_empty() => Ok(url),
            _ => Err(CliError::config(format!(
                "No audit database configured. Set {ENV_DATABASE_URL} or pass --database-url"
            ))),
        }
    }

    pub fn repository(&self) -> Result<&Path> {
        self.repository.as_deref().ok_or_else(|| {
            CliError::config(format!(
                "No repository snapshot configured. Set {ENV_REPOSITORY} or pass --repository"
            ))
        })
    }

    pub fn store_options(&self) -> StoreOptions {
        StoreOptions {
            max_connections: self.max_connections,
            connect_timeout: Duration::from_secs(self.connect_timeout),
        }
    }
}
