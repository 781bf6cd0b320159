//! Read-only lookups over the audit history
//!
//! Lookups here feed reports and dashboards, so a failing database degrades
//! to an empty answer with a warning instead of an error.

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::store::{AuditEvent, AuditStore};

#[derive(Debug, Clone)]
pub struct QueryFacade {
    store: AuditStore,
}

impl QueryFacade {
    pub fn new(store: AuditStore) -> Self {
        Self { store }
    }

    /// When the triple was last granted
    pub async fn latest_grant_date(
        &self,
        node_ref: &str,
        authority: &str,
        permission: &str,
    ) -> Option<DateTime<Utc>> {
        self.latest_grant(node_ref, authority, permission)
            .await
            .map(|event| event.date_granted)
    }

    pub async fn latest_grant(
        &self,
        node_ref: &str,
        authority: &str,
        permission: &str,
    ) -> Option<AuditEvent> {
        match self.store.latest_grant(node_ref, authority, permission).await {
            Ok(event) => event,
            Err(e) => {
                warn!(
                    node = %node_ref,
                    authority = %authority,
                    permission = %permission,
                    error = %e,
                    "Failed to look up latest grant"
                );
                None
            },
        }
    }

    pub async fn history_for_node(&self, node_ref: &str) -> Vec<AuditEvent> {
        self.store
            .history_for_node(node_ref)
            .await
            .unwrap_or_else(|e| {
                warn!(node = %node_ref, error = %e, "Failed to load node history");
                Vec::new()
            })
    }

    pub async fn history_for_user(&self, grantee: &str) -> Vec<AuditEvent> {
        self.store
            .history_for_user(grantee)
            .await
            .unwrap_or_else(|e| {
                warn!(grantee = %grantee, error = %e, "Failed to load user history");
                Vec::new()
            })
    }

    /// True when the latest grant carries an expiry before `now`
    ///
    /// A triple that was never granted, or granted without expiry, is not
    /// expired.
    pub async fn is_expired(
        &self,
        node_ref: &str,
        authority: &str,
        permission: &str,
        now: DateTime<Utc>,
    ) -> bool {
        self.latest_grant(node_ref, authority, permission)
            .await
            .is_some_and(|event| event.is_expired_at(now))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::store::StoreOptions;
    use chrono::{Duration, TimeZone};

    async fn facade() -> QueryFacade {
        let store = AuditStore::connect("sqlite::memory:", &StoreOptions::default())
            .await
            .unwrap();
        store.ensure_schema().await.unwrap();
        QueryFacade::new(store)
    }

    #[tokio::test]
    async fn test_latest_grant_date() {
        let facade = facade().await;
        let when = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        facade
            .store
            .record_grant("n1", "alice", "Read", None, when, None)
            .await
            .unwrap();

        assert_eq!(facade.latest_grant_date("n1", "alice", "Read").await, Some(when));
        assert_eq!(facade.latest_grant_date("n1", "alice", "Write").await, None);
    }

    #[tokio::test]
    async fn test_is_expired() {
        let facade = facade().await;
        let now = Utc.with_ymd_and_hms(2026, 10, 18, 0, 0, 0).unwrap();
        let store = &facade.store;
        store
            .record_grant("n1", "alice", "Read", None, now - Duration::days(30), Some(now - Duration::days(1)))
            .await
            .unwrap();
        store
            .record_grant("n1", "bob", "Read", None, now - Duration::days(30), Some(now + Duration::days(1)))
            .await
            .unwrap();
        store
            .record_grant("n1", "carol", "Read", None, now - Duration::days(30), None)
            .await
            .unwrap();

        assert!(facade.is_expired("n1", "alice", "Read", now).await);
        assert!(!facade.is_expired("n1", "bob", "Read", now).await);
        assert!(!facade.is_expired("n1", "carol", "Read", now).await);
        assert!(!facade.is_expired("n1", "dave", "Read", now).await);
    }

    #[tokio::test]
    async fn test_errors_degrade_to_empty() {
        let facade = facade().await;
        sqlx::query("DROP TABLE permission_audit")
            .execute(facade.store.pool())
            .await
            .unwrap();

        assert!(facade.history_for_node("n1").await.is_empty());
        assert!(facade.history_for_user("alice").await.is_empty());
        assert_eq!(facade.latest_grant_date("n1", "alice", "Read").await, None);
    }
}
