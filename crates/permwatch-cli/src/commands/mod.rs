//! CLI command implementations
//!
//! Each subcommand has its own module with a `run` function.

pub mod check_node;
pub mod history;
pub mod latest;
pub mod reconcile;
pub mod report;
pub mod schema;

use crate::config::Config;
use crate::error::{CliError, Result};
use chrono::{DateTime, Utc};
use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, Table};
use permwatch_engine::{AuditStore, InMemoryRepository};
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

/// Connect to the configured audit database
pub(crate) async fn open_store(config: &Config) -> Result<AuditStore> {
    config.validate()?;
    let url = config.database_url()?;
    let store = AuditStore::connect(url, &config.store_options()).await?;
    debug!(dialect = store.dialect().name(), "Connected to audit database");
    Ok(store)
}

/// Connect and make sure the audit table is usable
pub(crate) async fn open_ready_store(config: &Config) -> Result<AuditStore> {
    let store = open_store(config).await?;
    store.ensure_schema().await?;
    Ok(store)
}

pub(crate) fn load_repository(config: &Config) -> Result<Arc<InMemoryRepository>> {
    let path = config.repository()?;
    if !path.exists() {
        return Err(CliError::repository(format!(
            "Snapshot file '{}' does not exist",
            path.display()
        )));
    }
    let repository = InMemoryRepository::from_path(path)
        .map_err(|e| CliError::repository(e.to_string()))?;
    Ok(Arc::new(repository))
}

pub(crate) fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub(crate) fn new_table<I, S>(header: I) -> Table
where
    I: IntoIterator<Item = S>,
    S: Into<comfy_table::Cell>,
{
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(header);
    table
}

pub(crate) fn format_timestamp(value: DateTime<Utc>) -> String {
    value.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

pub(crate) fn format_optional_timestamp(value: Option<DateTime<Utc>>) -> String {
    value.map(format_timestamp).unwrap_or_else(|| "-".to_string())
}
