//! SQL dialects for the permission audit table
//!
//! Each supported backend is a unit struct implementing [`Dialect`]. The
//! store picks one when it connects and never branches on backend names
//! anywhere else.

use std::fmt;

/// Name of the audit table. Part of the persisted contract.
pub const AUDIT_TABLE: &str = "permission_audit";

/// `node_ref` of the row marking a completed schema initialization.
pub const INIT_NODE_REF: &str = "system://init";

/// Columns of the current layout, in declaration order.
pub const AUDIT_COLUMNS: &[&str] = &[
    "id",
    "node_ref",
    "user_granted_to",
    "date_granted",
    "expiry_date",
    "permission",
    "action_type",
    "is_active",
    "revoked_date",
    "created_at",
];

/// Column of the superseded layout that migration removes.
pub const LEGACY_GRANTED_BY: &str = "granted_by";

const INDEXED_COLUMNS: &[(&str, &str)] = &[
    ("idx_node_ref", "node_ref"),
    ("idx_user_granted_to", "user_granted_to"),
    ("idx_date_granted", "date_granted"),
    ("idx_action_type", "action_type"),
    ("idx_is_active", "is_active"),
];

const TABLE_COMMENT: &str = "Stores permission grant/revoke events for audit tracking";

/// Capabilities the audit store needs from a SQL backend.
pub trait Dialect: Send + Sync + fmt::Debug {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Primary key column definition with auto-assigned values
    fn id_column(&self) -> &'static str;

    /// Positional bind parameter, 1-based
    fn placeholder(&self, index: usize) -> String {
        let _ = index;
        "?".to_string()
    }

    /// Bind parameter carrying a timestamp formatted as text
    fn timestamp_param(&self, index: usize) -> String {
        self.placeholder(index)
    }

    /// Expression reading a timestamp column back as text
    fn timestamp_text(&self, column: &str) -> String;

    fn timestamp_type(&self) -> &'static str {
        "TIMESTAMP"
    }

    fn string_type(&self) -> &'static str {
        "VARCHAR(255)"
    }

    fn bool_type(&self) -> &'static str {
        "BOOLEAN"
    }

    fn bool_literal(&self, value: bool) -> &'static str {
        if value {
            "TRUE"
        } else {
            "FALSE"
        }
    }

    fn now(&self) -> &'static str {
        "CURRENT_TIMESTAMP"
    }

    /// Whether `CREATE INDEX IF NOT EXISTS` is understood
    fn supports_index_if_not_exists(&self) -> bool {
        true
    }

    /// Query returning one row per column of the audit table, first column
    /// holding the column name
    fn list_columns_sql(&self) -> String {
        format!(
            "SELECT CAST(column_name AS VARCHAR(255)) AS column_name \
             FROM information_schema.columns WHERE LOWER(table_name) = '{}'",
            AUDIT_TABLE
        )
    }

    fn table_comment_ddl(&self) -> Option<String> {
        None
    }

    fn create_table_ddl(&self) -> String {
        let ts = self.timestamp_type();
        let text = self.string_type();
        format!(
            "CREATE TABLE {table} (\
             id {id}, \
             node_ref {text} NOT NULL, \
             user_granted_to {text} NOT NULL, \
             date_granted {ts} NOT NULL, \
             expiry_date {ts} NULL, \
             permission {text} NOT NULL, \
             action_type VARCHAR(50) NOT NULL, \
             is_active {bool_ty} DEFAULT {yes}, \
             revoked_date {ts} NULL, \
             created_at {ts} DEFAULT {now}\
             )",
            table = AUDIT_TABLE,
            id = self.id_column(),
            bool_ty = self.bool_type(),
            yes = self.bool_literal(true),
            now = self.now(),
        )
    }

    fn index_ddl(&self) -> Vec<String> {
        let if_not_exists = if self.supports_index_if_not_exists() {
            "IF NOT EXISTS "
        } else {
            ""
        };
        INDEXED_COLUMNS
            .iter()
            .map(|(name, column)| {
                format!("CREATE INDEX {if_not_exists}{name} ON {AUDIT_TABLE} ({column})")
            })
            .collect()
    }

    fn init_record_dml(&self) -> String {
        format!(
            "INSERT INTO {AUDIT_TABLE} \
             (node_ref, user_granted_to, date_granted, permission, action_type, is_active) \
             VALUES ('{INIT_NODE_REF}', 'system', {now}, 'INIT', 'GRANT', {yes})",
            now = self.now(),
            yes = self.bool_literal(true),
        )
    }

    fn add_is_active_ddl(&self) -> String {
        format!(
            "ALTER TABLE {AUDIT_TABLE} ADD COLUMN is_active {} DEFAULT {}",
            self.bool_type(),
            self.bool_literal(true)
        )
    }

    fn add_revoked_date_ddl(&self) -> String {
        format!(
            "ALTER TABLE {AUDIT_TABLE} ADD COLUMN revoked_date {} NULL",
            self.timestamp_type()
        )
    }

    fn drop_legacy_column_ddl(&self) -> String {
        format!("ALTER TABLE {AUDIT_TABLE} DROP COLUMN {LEGACY_GRANTED_BY}")
    }
}

/// SQL:2003 identity columns; the fallback when the backend is unknown.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnsiDialect;

impl Dialect for AnsiDialect {
    fn name(&self) -> &'static str {
        "ansi"
    }

    fn id_column(&self) -> &'static str {
        "BIGINT GENERATED BY DEFAULT AS IDENTITY PRIMARY KEY"
    }

    fn timestamp_param(&self, index: usize) -> String {
        format!("CAST({} AS TIMESTAMP)", self.placeholder(index))
    }

    fn timestamp_text(&self, column: &str) -> String {
        format!("CAST({column} AS VARCHAR(64))")
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresDialect;

impl Dialect for PostgresDialect {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn id_column(&self) -> &'static str {
        "BIGSERIAL PRIMARY KEY"
    }

    fn placeholder(&self, index: usize) -> String {
        format!("${index}")
    }

    fn timestamp_param(&self, index: usize) -> String {
        format!("CAST(${index} AS TIMESTAMP)")
    }

    fn timestamp_text(&self, column: &str) -> String {
        format!("CAST({column} AS TEXT)")
    }

    fn list_columns_sql(&self) -> String {
        format!(
            "SELECT CAST(column_name AS VARCHAR(255)) AS column_name \
             FROM information_schema.columns \
             WHERE LOWER(table_name) = '{AUDIT_TABLE}' AND table_schema = current_schema()"
        )
    }

    fn table_comment_ddl(&self) -> Option<String> {
        Some(format!("COMMENT ON TABLE {AUDIT_TABLE} IS '{TABLE_COMMENT}'"))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MySqlDialect;

impl Dialect for MySqlDialect {
    fn name(&self) -> &'static str {
        "mysql"
    }

    fn id_column(&self) -> &'static str {
        "BIGINT AUTO_INCREMENT PRIMARY KEY"
    }

    fn timestamp_text(&self, column: &str) -> String {
        format!("CAST({column} AS CHAR)")
    }

    // TIMESTAMP in MySQL is second-precision and range-limited to 2038.
    fn timestamp_type(&self) -> &'static str {
        "DATETIME(6)"
    }

    fn now(&self) -> &'static str {
        "CURRENT_TIMESTAMP(6)"
    }

    fn supports_index_if_not_exists(&self) -> bool {
        false
    }

    fn list_columns_sql(&self) -> String {
        format!(
            "SELECT CAST(column_name AS CHAR) AS column_name \
             FROM information_schema.columns \
             WHERE LOWER(table_name) = '{AUDIT_TABLE}' AND table_schema = DATABASE()"
        )
    }

    fn table_comment_ddl(&self) -> Option<String> {
        Some(format!("ALTER TABLE {AUDIT_TABLE} COMMENT = '{TABLE_COMMENT}'"))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteDialect;

impl Dialect for SqliteDialect {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn id_column(&self) -> &'static str {
        "INTEGER PRIMARY KEY AUTOINCREMENT"
    }

    fn timestamp_text(&self, column: &str) -> String {
        format!("CAST({column} AS TEXT)")
    }

    fn bool_type(&self) -> &'static str {
        "INTEGER"
    }

    fn bool_literal(&self, value: bool) -> &'static str {
        if value {
            "1"
        } else {
            "0"
        }
    }

    fn list_columns_sql(&self) -> String {
        format!("SELECT name AS column_name FROM pragma_table_info('{AUDIT_TABLE}')")
    }
}

/// The closed set of dialects the store can run against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialectKind {
    Ansi,
    Postgres,
    MySql,
    Sqlite,
}

impl DialectKind {
    /// Map a driver backend name ("PostgreSQL", "MySQL", "SQLite") to a dialect
    pub fn from_backend_name(name: &str) -> Self {
        let name = name.to_ascii_lowercase();
        if name.contains("postgres") {
            DialectKind::Postgres
        } else if name.contains("mysql") || name.contains("mariadb") {
            DialectKind::MySql
        } else if name.contains("sqlite") {
            DialectKind::Sqlite
        } else {
            DialectKind::Ansi
        }
    }

    pub fn dialect(self) -> &'static dyn Dialect {
        match self {
            DialectKind::Ansi => &AnsiDialect,
            DialectKind::Postgres => &PostgresDialect,
            DialectKind::MySql => &MySqlDialect,
            DialectKind::Sqlite => &SqliteDialect,
        }
    }
}
