//! Audit store for permission grant/revoke history
//!
//! Rows are append-only: a revocation is a new REVOKE row, the GRANT it undoes
//! stays untouched. The store runs on sqlx's `Any` driver and renders every
//! statement through the [`Dialect`] chosen when it connects.

pub mod dialect;
pub mod models;
pub mod schema;

pub use dialect::{Dialect, DialectKind, AUDIT_TABLE, INIT_NODE_REF};
pub use models::{format_db_timestamp, parse_db_timestamp, AuditEvent};
pub use schema::SchemaOutcome;

use chrono::{DateTime, Utc};
use permwatch_common::{ActionType, PermissionKey};
use sqlx::any::{AnyPoolOptions, AnyRow};
use sqlx::{AnyPool, Row};
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{EngineError, Result};

/// Default maximum connections in the store pool
pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;

/// Default connect timeout in seconds
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Connection settings for [`AuditStore::connect`]
#[derive(Debug, Clone)]
pub struct StoreOptions {
    pub max_connections: u32,
    pub connect_timeout: Duration,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            max_connections: DEFAULT_MAX_CONNECTIONS,
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
        }
    }
}

/// Dialect-portable persistence for permission events
#[derive(Debug, Clone)]
pub struct AuditStore {
    pool: AnyPool,
    dialect: &'static dyn Dialect,
}

impl AuditStore {
    /// Connect to `url` (postgres://, mysql://, sqlite:) and detect the dialect
    pub async fn connect(url: &str, options: &StoreOptions) -> Result<Self> {
        sqlx::any::install_default_drivers();

        let mut pool_options = AnyPoolOptions::new()
            .max_connections(options.max_connections)
            .acquire_timeout(options.connect_timeout);

        // Every connection to an in-memory SQLite database is a fresh database
        if url.starts_with("sqlite") && url.contains(":memory:") {
            pool_options = pool_options
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None);
        }

        let pool = pool_options
            .connect(url)
            .await
            .map_err(|e| EngineError::config(format!("Failed to connect to audit database: {e}")))?;

        Ok(Self::from_pool(pool).await)
    }

    /// Wrap an existing pool, detecting its dialect once
    pub async fn from_pool(pool: AnyPool) -> Self {
        let dialect = detect_dialect(&pool).await.dialect();
        info!(dialect = dialect.name(), "Audit store ready");
        Self { pool, dialect }
    }

    /// Wrap an existing pool with a known dialect
    pub fn with_dialect(pool: AnyPool, kind: DialectKind) -> Self {
        Self {
            pool,
            dialect: kind.dialect(),
        }
    }

    pub fn dialect(&self) -> &'static dyn Dialect {
        self.dialect
    }

    pub fn pool(&self) -> &AnyPool {
        &self.pool
    }

    /// Append one GRANT row
    ///
    /// No deduplication happens here. `granted_by` is not part of the stored
    /// layout and only shows up in the log.
    pub async fn record_grant(
        &self,
        node_ref: &str,
        authority: &str,
        permission: &str,
        granted_by: Option<&str>,
        when: DateTime<Utc>,
        expiry: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let d = self.dialect;
        let sql = format!(
            "INSERT INTO {AUDIT_TABLE} \
             (node_ref, user_granted_to, date_granted, expiry_date, permission, action_type, is_active) \
             VALUES ({}, {}, {}, {}, {}, 'GRANT', {})",
            d.placeholder(1),
            d.placeholder(2),
            d.timestamp_param(3),
            d.timestamp_param(4),
            d.placeholder(5),
            d.bool_literal(true),
        );

        sqlx::query(&sql)
            .bind(node_ref)
            .bind(authority)
            .bind(format_db_timestamp(when))
            .bind(expiry.map(format_db_timestamp))
            .bind(permission)
            .execute(&self.pool)
            .await
            .map_err(|e| EngineError::persistence(format!("Failed to record grant: {e}")))?;

        debug!(
            node = %node_ref,
            authority = %authority,
            permission = %permission,
            granted_by = granted_by.unwrap_or("unknown"),
            "Recorded permission grant"
        );

        Ok(())
    }

    /// Append one REVOKE row (inactive, no expiry, revoked at `when`)
    pub async fn record_revoke(
        &self,
        node_ref: &str,
        authority: &str,
        permission: &str,
        revoked_by: Option<&str>,
        when: DateTime<Utc>,
    ) -> Result<()> {
        let d = self.dialect;
        let sql = format!(
            "INSERT INTO {AUDIT_TABLE} \
             (node_ref, user_granted_to, date_granted, expiry_date, permission, action_type, is_active, revoked_date) \
             VALUES ({}, {}, {}, NULL, {}, 'REVOKE', {}, {})",
            d.placeholder(1),
            d.placeholder(2),
            d.timestamp_param(3),
            d.placeholder(4),
            d.bool_literal(false),
            d.timestamp_param(5),
        );

        let when = format_db_timestamp(when);
        sqlx::query(&sql)
            .bind(node_ref)
            .bind(authority)
            .bind(when.clone())
            .bind(permission)
            .bind(when)
            .execute(&self.pool)
            .await
            .map_err(|e| EngineError::persistence(format!("Failed to record revoke: {e}")))?;

        debug!(
            node = %node_ref,
            authority = %authority,
            permission = %permission,
            revoked_by = revoked_by.unwrap_or("unknown"),
            "Recorded permission revoke"
        );

        Ok(())
    }

    /// Most recent GRANT row for the triple
    pub async fn latest_grant(
        &self,
        node_ref: &str,
        authority: &str,
        permission: &str,
    ) -> Result<Option<AuditEvent>> {
        self.latest(node_ref, authority, permission, Some(ActionType::Grant))
            .await
    }

    /// Most recent row of either kind for the triple
    pub async fn latest_event(
        &self,
        node_ref: &str,
        authority: &str,
        permission: &str,
    ) -> Result<Option<AuditEvent>> {
        self.latest(node_ref, authority, permission, None).await
    }

    async fn latest(
        &self,
        node_ref: &str,
        authority: &str,
        permission: &str,
        action: Option<ActionType>,
    ) -> Result<Option<AuditEvent>> {
        let d = self.dialect;
        let action_filter = action
            .map(|a| format!(" AND action_type = '{}'", a.as_str()))
            .unwrap_or_default();
        let sql = format!(
            "{} WHERE node_ref = {} AND user_granted_to = {} AND permission = {}{} \
             ORDER BY date_granted DESC, id DESC LIMIT 1",
            self.select_events(),
            d.placeholder(1),
            d.placeholder(2),
            d.placeholder(3),
            action_filter,
        );

        let row = sqlx::query(&sql)
            .bind(node_ref)
            .bind(authority)
            .bind(permission)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(AuditEvent::from_row).transpose()
    }

    /// Full history of a node, most recent first
    pub async fn history_for_node(&self, node_ref: &str) -> Result<Vec<AuditEvent>> {
        self.history_where("node_ref", node_ref).await
    }

    /// Full history of a grantee, most recent first
    pub async fn history_for_user(&self, grantee: &str) -> Result<Vec<AuditEvent>> {
        self.history_where("user_granted_to", grantee).await
    }

    async fn history_where(&self, column: &str, value: &str) -> Result<Vec<AuditEvent>> {
        let sql = format!(
            "{} WHERE {} = {} ORDER BY date_granted DESC, id DESC",
            self.select_events(),
            column,
            self.dialect.placeholder(1),
        );

        let rows = sqlx::query(&sql).bind(value).fetch_all(&self.pool).await?;
        rows.iter().map(AuditEvent::from_row).collect()
    }

    /// Keys whose latest row is an active GRANT, grouped by node
    ///
    /// This is what the previous run must have observed, so it seeds the
    /// in-memory snapshot after a restart.
    pub async fn active_permission_keys(&self) -> Result<HashMap<String, HashSet<PermissionKey>>> {
        let sql = format!(
            "SELECT node_ref, user_granted_to, permission, action_type, \
             CASE WHEN is_active THEN 1 ELSE 0 END AS is_active \
             FROM {AUDIT_TABLE} WHERE node_ref <> '{INIT_NODE_REF}' \
             ORDER BY date_granted ASC, id ASC"
        );

        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;

        let mut latest: HashMap<(String, PermissionKey), bool> = HashMap::new();
        for row in &rows {
            let (node_ref, key, active) = active_key_from_row(row)?;
            latest.insert((node_ref, key), active);
        }

        let mut snapshot: HashMap<String, HashSet<PermissionKey>> = HashMap::new();
        for ((node_ref, key), active) in latest {
            if active {
                snapshot.entry(node_ref).or_default().insert(key);
            }
        }

        Ok(snapshot)
    }

    /// Number of rows, sentinel included
    pub async fn count_events(&self) -> Result<i64> {
        let row = sqlx::query(&format!("SELECT COUNT(*) AS total FROM {AUDIT_TABLE}"))
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get("total")?)
    }

    fn select_events(&self) -> String {
        let d = self.dialect;
        format!(
            "SELECT id, node_ref, user_granted_to, permission, action_type, \
             {} AS date_granted, {} AS expiry_date, \
             CASE WHEN is_active THEN 1 ELSE 0 END AS is_active, \
             {} AS revoked_date, {} AS created_at \
             FROM {AUDIT_TABLE}",
            d.timestamp_text("date_granted"),
            d.timestamp_text("expiry_date"),
            d.timestamp_text("revoked_date"),
            d.timestamp_text("created_at"),
        )
    }
}

fn active_key_from_row(row: &AnyRow) -> Result<(String, PermissionKey, bool)> {
    let node_ref: String = row.try_get("node_ref")?;
    let authority: String = row.try_get("user_granted_to")?;
    let permission: String = row.try_get("permission")?;
    let action: ActionType = row.try_get::<String, _>("action_type")?.parse()?;
    let flag: i64 = row.try_get("is_active")?;

    let active = action == ActionType::Grant && flag != 0;
    Ok((node_ref, PermissionKey::new(authority, permission), active))
}

async fn detect_dialect(pool: &AnyPool) -> DialectKind {
    match pool.acquire().await {
        Ok(conn) => {
            let backend = conn.backend_name().to_string();
            let kind = DialectKind::from_backend_name(&backend);
            debug!(backend = %backend, dialect = ?kind, "Detected database backend");
            kind
        },
        Err(e) => {
            warn!(error = %e, "Could not detect database backend, using ANSI dialect");
            DialectKind::Ansi
        },
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    async fn store() -> AuditStore {
        let store = AuditStore::connect("sqlite::memory:", &StoreOptions::default())
            .await
            .unwrap();
        store.ensure_schema().await.unwrap();
        store
    }

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 18, hour, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_detects_sqlite() {
        let store = store().await;
        assert_eq!(store.dialect().name(), "sqlite");
    }

    #[tokio::test]
    async fn test_record_grant_and_latest() {
        let store = store().await;
        store
            .record_grant("n1", "GROUP_X", "SiteConsumer", Some("admin"), at(9), None)
            .await
            .unwrap();
        store
            .record_grant("n1", "GROUP_X", "SiteConsumer", None, at(11), Some(at(12)))
            .await
            .unwrap();

        let latest = store.latest_grant("n1", "GROUP_X", "SiteConsumer").await.unwrap().unwrap();
        assert_eq!(latest.date_granted, at(11));
        assert_eq!(latest.expiry_date, Some(at(12)));
        assert_eq!(latest.action_type, ActionType::Grant);
        assert!(latest.is_active);

        assert!(store.latest_grant("n1", "bob", "SiteConsumer").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_revoke_appends_inactive_row() {
        let store = store().await;
        store.record_grant("n1", "bob", "SiteConsumer", None, at(9), None).await.unwrap();
        store.record_revoke("n1", "bob", "SiteConsumer", None, at(10)).await.unwrap();

        let history = store.history_for_node("n1").await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].action_type, ActionType::Revoke);
        assert!(!history[0].is_active);
        assert_eq!(history[0].revoked_date, Some(at(10)));
        assert_eq!(history[0].expiry_date, None);
        assert_eq!(history[1].action_type, ActionType::Grant);

        let latest = store.latest_event("n1", "bob", "SiteConsumer").await.unwrap().unwrap();
        assert_eq!(latest.action_type, ActionType::Revoke);

        // The GRANT row is still the latest grant
        let grant = store.latest_grant("n1", "bob", "SiteConsumer").await.unwrap().unwrap();
        assert_eq!(grant.date_granted, at(9));
    }

    #[tokio::test]
    async fn test_history_for_user_is_most_recent_first() {
        let store = store().await;
        store.record_grant("n1", "alice", "Read", None, at(8), None).await.unwrap();
        store.record_grant("n2", "alice", "Write", None, at(10), None).await.unwrap();
        store.record_grant("n3", "bob", "Read", None, at(12), None).await.unwrap();

        let history = store.history_for_user("alice").await.unwrap();
        let nodes: Vec<_> = history.iter().map(|e| e.node_ref.as_str()).collect();
        assert_eq!(nodes, vec!["n2", "n1"]);
    }

    #[tokio::test]
    async fn test_active_keys_follow_latest_row() {
        let store = store().await;
        let t = at(9);
        store.record_grant("n1", "alice", "Read", None, t, None).await.unwrap();
        store.record_grant("n1", "bob", "Read", None, t, None).await.unwrap();
        store
            .record_revoke("n1", "bob", "Read", None, t + Duration::minutes(5))
            .await
            .unwrap();
        store
            .record_grant("n2", "carol", "Write", None, t + Duration::minutes(1), None)
            .await
            .unwrap();

        let keys = store.active_permission_keys().await.unwrap();
        assert_eq!(keys.len(), 2);
        assert!(keys["n1"].contains(&PermissionKey::new("alice", "Read")));
        assert!(!keys["n1"].contains(&PermissionKey::new("bob", "Read")));
        assert!(keys["n2"].contains(&PermissionKey::new("carol", "Write")));
        assert!(!keys.contains_key(INIT_NODE_REF));
    }
}
