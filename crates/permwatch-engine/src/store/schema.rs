//! Idempotent schema management for the audit table
//!
//! `ensure_schema` is safe to call on every start, from several processes at
//! once, against a fresh database or one carrying an older layout. Only a
//! failed primary `CREATE TABLE` is fatal. Everything after it is best-effort
//! and logged.

use serde::Serialize;
use sqlx::Row;
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

use super::dialect::{AUDIT_COLUMNS, AUDIT_TABLE, INIT_NODE_REF, LEGACY_GRANTED_BY};
use super::AuditStore;
use crate::error::{EngineError, Result};

/// SQLSTATE / vendor codes meaning "object already exists"
const ALREADY_EXISTS_CODES: &[&str] = &[
    "42P07", // postgres duplicate_table (also indexes)
    "42701", // postgres duplicate_column
    "1050",  // mysql ER_TABLE_EXISTS_ERROR
    "1060",  // mysql ER_DUP_FIELDNAME
    "1061",  // mysql ER_DUP_KEYNAME
];

/// What a call to [`AuditStore::ensure_schema`] changed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SchemaOutcome {
    pub created_table: bool,
    pub added_columns: Vec<String>,
    pub dropped_columns: Vec<String>,
    pub sentinel_inserted: bool,
    /// Non-fatal statements that failed
    pub warnings: usize,
}

impl SchemaOutcome {
    /// True when nothing had to be done
    pub fn is_noop(&self) -> bool {
        !self.created_table
            && self.added_columns.is_empty()
            && self.dropped_columns.is_empty()
            && !self.sentinel_inserted
    }
}

impl AuditStore {
    /// Create or migrate the audit table, then make sure indexes and the
    /// init sentinel are in place
    pub async fn ensure_schema(&self) -> Result<SchemaOutcome> {
        let mut outcome = SchemaOutcome::default();
        let mut columns = self.existing_columns().await;

        if columns.is_empty() {
            match sqlx::query(&self.dialect.create_table_ddl())
                .execute(&self.pool)
                .await
            {
                Ok(_) => {
                    info!(table = AUDIT_TABLE, "Created audit table");
                    outcome.created_table = true;
                    self.comment_table(&mut outcome).await;
                },
                Err(e) if is_already_exists(&e) => {
                    debug!(table = AUDIT_TABLE, "Audit table created concurrently");
                    columns = self.existing_columns().await;
                },
                Err(e) => {
                    return Err(EngineError::persistence(format!(
                        "Failed to create {AUDIT_TABLE}: {e}"
                    )));
                },
            }
        }

        if !outcome.created_table {
            self.migrate_columns(&columns, &mut outcome).await;
        }

        self.create_indexes(&mut outcome).await;
        self.insert_sentinel(&mut outcome).await;

        info!(
            dialect = self.dialect.name(),
            created = outcome.created_table,
            added = ?outcome.added_columns,
            dropped = ?outcome.dropped_columns,
            warnings = outcome.warnings,
            "Audit schema ready"
        );

        Ok(outcome)
    }

    /// Lower-cased column names of the audit table; empty when it is missing
    pub async fn existing_columns(&self) -> BTreeSet<String> {
        match sqlx::query(&self.dialect.list_columns_sql())
            .fetch_all(&self.pool)
            .await
        {
            Ok(rows) => rows
                .iter()
                .filter_map(|row| row.try_get::<String, _>(0).ok())
                .map(|name| name.to_lowercase())
                .collect(),
            Err(e) => {
                debug!(error = %e, "Catalog query failed, probing columns directly");
                self.probe_columns().await
            },
        }
    }

    async fn probe_columns(&self) -> BTreeSet<String> {
        let mut found = BTreeSet::new();
        for column in AUDIT_COLUMNS.iter().chain(std::iter::once(&LEGACY_GRANTED_BY)) {
            let sql = format!("SELECT {column} FROM {AUDIT_TABLE} WHERE 1 = 0");
            if sqlx::query(&sql).fetch_all(&self.pool).await.is_ok() {
                found.insert(column.to_string());
            }
        }
        found
    }

    async fn migrate_columns(&self, columns: &BTreeSet<String>, outcome: &mut SchemaOutcome) {
        if !columns.contains("is_active") {
            let ddl = self.dialect.add_is_active_ddl();
            if self.migration_step(&ddl, outcome).await {
                outcome.added_columns.push("is_active".to_string());
            }
        }

        if !columns.contains("revoked_date") {
            let ddl = self.dialect.add_revoked_date_ddl();
            if self.migration_step(&ddl, outcome).await {
                outcome.added_columns.push("revoked_date".to_string());
            }
        }

        if columns.contains(LEGACY_GRANTED_BY) {
            let ddl = self.dialect.drop_legacy_column_ddl();
            if self.migration_step(&ddl, outcome).await {
                outcome.dropped_columns.push(LEGACY_GRANTED_BY.to_string());
            }
        }

        let backfill = format!(
            "UPDATE {AUDIT_TABLE} SET is_active = {} WHERE is_active IS NULL",
            self.dialect.bool_literal(true)
        );
        match sqlx::query(&backfill).execute(&self.pool).await {
            Ok(result) if result.rows_affected() > 0 => {
                info!(rows = result.rows_affected(), "Back-filled is_active");
            },
            Ok(_) => {},
            Err(e) => {
                warn!(error = %e, "Failed to back-fill is_active");
                outcome.warnings += 1;
            },
        }
    }

    /// Run one ALTER; true when it changed the table
    async fn migration_step(&self, ddl: &str, outcome: &mut SchemaOutcome) -> bool {
        match sqlx::query(ddl).execute(&self.pool).await {
            Ok(_) => {
                info!(statement = %ddl, "Migrated audit table");
                true
            },
            Err(e) if is_already_exists(&e) => {
                debug!(statement = %ddl, "Column already migrated");
                false
            },
            Err(e) => {
                warn!(statement = %ddl, error = %e, "Audit table migration step failed");
                outcome.warnings += 1;
                false
            },
        }
    }

    async fn create_indexes(&self, outcome: &mut SchemaOutcome) {
        for ddl in self.dialect.index_ddl() {
            match sqlx::query(&ddl).execute(&self.pool).await {
                Ok(_) => {},
                Err(e) if is_already_exists(&e) => {
                    debug!(statement = %ddl, "Index already exists");
                },
                Err(e) => {
                    warn!(statement = %ddl, error = %e, "Failed to create index");
                    outcome.warnings += 1;
                },
            }
        }
    }

    async fn comment_table(&self, outcome: &mut SchemaOutcome) {
        if let Some(ddl) = self.dialect.table_comment_ddl() {
            if let Err(e) = sqlx::query(&ddl).execute(&self.pool).await {
                debug!(error = %e, "Table comment not applied");
                outcome.warnings += 1;
            }
        }
    }

    async fn insert_sentinel(&self, outcome: &mut SchemaOutcome) {
        let count_sql = format!(
            "SELECT COUNT(*) AS total FROM {AUDIT_TABLE} WHERE node_ref = '{INIT_NODE_REF}'"
        );

        let existing: i64 = match sqlx::query(&count_sql).fetch_one(&self.pool).await {
            Ok(row) => row.try_get("total").unwrap_or(0),
            Err(e) => {
                warn!(error = %e, "Failed to look up init record");
                outcome.warnings += 1;
                return;
            },
        };

        if existing > 0 {
            return;
        }

        match sqlx::query(&self.dialect.init_record_dml())
            .execute(&self.pool)
            .await
        {
            Ok(_) => {
                debug!(node = INIT_NODE_REF, "Inserted init record");
                outcome.sentinel_inserted = true;
            },
            Err(e) => {
                warn!(error = %e, "Failed to insert init record");
                outcome.warnings += 1;
            },
        }
    }
}

/// Whether a DDL error only says the object is already there
pub(crate) fn is_already_exists(err: &sqlx::Error) -> bool {
    let sqlx::Error::Database(db) = err else {
        return false;
    };

    if db
        .code()
        .is_some_and(|code| ALREADY_EXISTS_CODES.contains(&code.as_ref()))
    {
        return true;
    }

    let message = db.message().to_lowercase();
    message.contains("already exists") || message.contains("duplicate")
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::store::StoreOptions;

    async fn memory_store() -> AuditStore {
        AuditStore::connect("sqlite::memory:", &StoreOptions::default())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_fresh_database() {
        let store = memory_store().await;
        let outcome = store.ensure_schema().await.unwrap();

        assert!(outcome.created_table);
        assert!(outcome.sentinel_inserted);
        assert_eq!(outcome.warnings, 0);

        let columns = store.existing_columns().await;
        for column in AUDIT_COLUMNS {
            assert!(columns.contains(*column), "missing {column}");
        }
        assert_eq!(store.count_events().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_ensure_schema_twice_is_noop() {
        let store = memory_store().await;
        store.ensure_schema().await.unwrap();

        let second = store.ensure_schema().await.unwrap();
        assert!(second.is_noop());
        assert_eq!(second.warnings, 0);
        assert_eq!(store.count_events().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_missing_table_has_no_columns() {
        let store = memory_store().await;
        assert!(store.existing_columns().await.is_empty());
        assert!(store.probe_columns().await.is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_create_is_recognized() {
        let store = memory_store().await;
        store.ensure_schema().await.unwrap();

        let err = sqlx::query(&store.dialect().create_table_ddl())
            .execute(store.pool())
            .await
            .unwrap_err();
        assert!(is_already_exists(&err));
    }

    #[test]
    fn test_non_database_errors_are_not_already_exists() {
        assert!(!is_already_exists(&sqlx::Error::RowNotFound));
    }
}
