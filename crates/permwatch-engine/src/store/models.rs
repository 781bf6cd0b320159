//! Audit event model and row mapping

use chrono::{DateTime, NaiveDateTime, Utc};
use permwatch_common::{ActionType, PermwatchError};
use serde::{Deserialize, Serialize};
use sqlx::any::AnyRow;
use sqlx::Row;

use crate::error::{EngineError, Result};

/// Text format timestamps are bound with. Accepted by every dialect's
/// timestamp parameter.
pub const DB_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// One row of the `permission_audit` table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: i64,
    pub node_ref: String,
    /// User or group the row is about
    pub grantee: String,
    pub permission: String,
    pub action_type: ActionType,
    /// When the grant was observed (or the revoke, for REVOKE rows)
    pub date_granted: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiry_date: Option<DateTime<Utc>>,
    pub is_active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revoked_date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl AuditEvent {
    pub(crate) fn from_row(row: &AnyRow) -> Result<Self> {
        let action: String = row.try_get("action_type")?;
        let date_granted: String = row.try_get("date_granted")?;

        Ok(Self {
            id: row.try_get("id")?,
            node_ref: row.try_get("node_ref")?,
            grantee: row.try_get("user_granted_to")?,
            permission: row.try_get("permission")?,
            action_type: action.parse()?,
            date_granted: parse_db_timestamp(&date_granted)?,
            expiry_date: optional_timestamp(row, "expiry_date")?,
            is_active: row.try_get::<Option<i64>, _>("is_active")?.unwrap_or(1) != 0,
            revoked_date: optional_timestamp(row, "revoked_date")?,
            created_at: optional_timestamp(row, "created_at")?,
        })
    }

    /// True when the row carries an expiry that lies before `now`
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expiry_date.is_some_and(|expiry| expiry < now)
    }
}

fn optional_timestamp(row: &AnyRow, column: &str) -> Result<Option<DateTime<Utc>>> {
    row.try_get::<Option<String>, _>(column)?
        .as_deref()
        .map(parse_db_timestamp)
        .transpose()
}

/// Format a timestamp for binding. Stored values are naive UTC.
pub fn format_db_timestamp(value: DateTime<Utc>) -> String {
    value.naive_utc().format(DB_TIMESTAMP_FORMAT).to_string()
}

/// Parse a timestamp read back as text
///
/// Backends render timestamps slightly differently (fraction digits, `T`
/// separator, trailing zone), so a handful of shapes are accepted.
pub fn parse_db_timestamp(value: &str) -> Result<DateTime<Utc>> {
    let value = value.trim();

    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Ok(parsed.with_timezone(&Utc));
    }

    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Ok(naive.and_utc());
        }
    }

    // Postgres renders timestamptz as "... +00"
    if let Ok(parsed) = DateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f%#z") {
        return Ok(parsed.with_timezone(&Utc));
    }

    Err(EngineError::from(PermwatchError::InvalidTimestamp(
        value.to_string(),
    )))
}
