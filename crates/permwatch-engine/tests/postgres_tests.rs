//! Audit store tests against a real PostgreSQL
//!
//! These need Docker and are ignored by default:
//!
//! ```bash
//! cargo test -p permwatch-engine --test postgres_tests -- --ignored
//! ```

use anyhow::Result;
use chrono::{Duration, Utc};
use permwatch_common::{ActionType, PermissionKey};
use permwatch_engine::{AuditStore, InMemoryRepository, Reconciler, StoreOptions};
use serial_test::serial;
use std::sync::Arc;
use testcontainers::{runners::AsyncRunner, ContainerAsync, ImageExt};
use testcontainers_modules::postgres::Postgres;
use tracing::info;

/// Initialize tracing for tests
fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let _ = fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,permwatch_engine=debug,sqlx=warn")),
        )
        .with_test_writer()
        .try_init();
}

/// The container is stopped when the returned handle drops
async fn postgres_store() -> Result<(ContainerAsync<Postgres>, AuditStore)> {
    let container = Postgres::default().with_tag("16-alpine").start().await?;

    let host = container.get_host().await?;
    let port = container.get_host_port_ipv4(5432).await?;
    let url = format!("postgresql://postgres:postgres@{}:{}/postgres", host, port);

    let store = AuditStore::connect(&url, &StoreOptions::default()).await?;
    Ok((container, store))
}

#[tokio::test]
#[serial]
#[ignore = "requires Docker"]
async fn test_postgres_schema_is_idempotent() -> Result<()> {
    init_tracing();
    let (_container, store) = postgres_store().await?;
    assert_eq!(store.dialect().name(), "postgres");

    let first = store.ensure_schema().await?;
    info!(?first, "First schema pass");
    assert!(first.created_table);
    assert!(first.sentinel_inserted);

    let second = store.ensure_schema().await?;
    assert!(second.is_noop());
    assert_eq!(store.count_events().await?, 1);

    Ok(())
}

#[tokio::test]
#[serial]
#[ignore = "requires Docker"]
async fn test_postgres_grant_revoke_history() -> Result<()> {
    init_tracing();
    let (_container, store) = postgres_store().await?;
    store.ensure_schema().await?;

    let granted = Utc::now() - Duration::hours(1);
    store
        .record_grant("doc-1", "GROUP_X", "SiteConsumer", Some("admin"), granted, None)
        .await?;
    store
        .record_revoke("doc-1", "GROUP_X", "SiteConsumer", None, Utc::now())
        .await?;
    store
        .record_grant("doc-2", "alice", "Read", None, granted, Some(granted + Duration::days(1)))
        .await?;

    let history = store.history_for_node("doc-1").await?;
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].action_type, ActionType::Revoke);
    assert!(!history[0].is_active);

    let latest = store
        .latest_grant("doc-2", "alice", "Read")
        .await?
        .expect("grant recorded");
    assert_eq!(latest.expiry_date, Some(granted + Duration::days(1)));

    let active = store.active_permission_keys().await?;
    assert!(!active.contains_key("doc-1"));
    assert!(active["doc-2"].contains(&PermissionKey::new("alice", "Read")));

    Ok(())
}

#[tokio::test]
#[serial]
#[ignore = "requires Docker"]
async fn test_postgres_reconcile_is_idempotent() -> Result<()> {
    init_tracing();
    let (_container, store) = postgres_store().await?;
    store.ensure_schema().await?;

    let repo = Arc::new(InMemoryRepository::default());
    repo.add_root("site").await;
    repo.add_node("site", true, None).await;
    repo.add_node("doc", false, Some("site")).await;
    repo.grant("doc", "GROUP_X", "SiteConsumer").await;

    let mut reconciler = Reconciler::builder()
        .store(store.clone())
        .repository(repo.clone())
        .build()?;
    assert_eq!(reconciler.run().await.grants_recorded, 1);
    assert_eq!(reconciler.run().await.changes(), 0);

    Ok(())
}
