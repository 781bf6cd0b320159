//! Reconciliation tests against an in-memory SQLite audit store
//!
//! Covers:
//! 1. Idempotent re-runs
//! 2. Grant/revoke symmetry and re-grants
//! 3. Nodes shared between containers
//! 4. Cold restarts rebuilding the snapshot from the store
//! 5. The reporting view over the same repository

use anyhow::Result;
use permwatch_common::{ActionType, PermissionKey};
use permwatch_engine::{
    AuditStore, EffectivePermissionReport, ErrorKind, InMemoryRepository, PermissionType,
    QueryFacade, Reconciler, StoreOptions,
};
use std::path::PathBuf;
use std::sync::Arc;
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

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

async fn memory_store() -> Result<AuditStore> {
    let store = AuditStore::connect("sqlite::memory:", &StoreOptions::default()).await?;
    store.ensure_schema().await?;
    Ok(store)
}

async fn site() -> Result<Arc<InMemoryRepository>> {
    Ok(Arc::new(InMemoryRepository::from_path(fixture("site.json"))?))
}

fn reconciler(store: &AuditStore, repo: &Arc<InMemoryRepository>) -> Result<Reconciler> {
    Ok(Reconciler::builder()
        .store(store.clone())
        .repository(repo.clone())
        .build()?)
}

/// Rows written so far, sentinel excluded
async fn audit_rows(store: &AuditStore) -> Result<i64> {
    Ok(store.count_events().await? - 1)
}

#[tokio::test]
async fn test_first_run_records_every_grant() -> Result<()> {
    init_tracing();
    let store = memory_store().await?;
    let repo = site().await?;
    let mut reconciler = reconciler(&store, &repo)?;

    let report = reconciler.run().await;
    info!(?report, "First run finished");

    assert_eq!(report.roots, 2);
    assert_eq!(report.nodes_visited, 5);
    assert_eq!(report.grants_recorded, 4);
    assert_eq!(report.revokes_recorded, 0);
    assert_eq!(report.total_errors(), 0);
    assert_eq!(audit_rows(&store).await?, 4);

    Ok(())
}

#[tokio::test]
async fn test_rerun_without_changes_writes_nothing() -> Result<()> {
    init_tracing();
    let store = memory_store().await?;
    let repo = site().await?;
    let mut reconciler = reconciler(&store, &repo)?;

    reconciler.run().await;
    let before = audit_rows(&store).await?;

    let report = reconciler.run().await;
    assert_eq!(report.changes(), 0);
    assert_eq!(report.nodes_visited, 5);
    assert_eq!(audit_rows(&store).await?, before);

    Ok(())
}

#[tokio::test]
async fn test_group_grant_audited_at_authority_level() -> Result<()> {
    init_tracing();
    let store = memory_store().await?;
    let repo = site().await?;
    let mut reconciler = reconciler(&store, &repo)?;
    reconciler.run().await;

    let history = store.history_for_node("site-marketing-library").await?;
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].grantee, "GROUP_X");
    assert_eq!(history[0].permission, "SiteConsumer");
    assert_eq!(history[0].action_type, ActionType::Grant);
    assert!(history[0].is_active);

    // Members are never recorded individually
    assert!(store.history_for_user("alice").await?.is_empty());

    Ok(())
}

#[tokio::test]
async fn test_system_authorities_never_recorded() -> Result<()> {
    init_tracing();
    let store = memory_store().await?;
    let repo = site().await?;
    let mut reconciler = reconciler(&store, &repo)?;
    reconciler.run().await;

    assert!(store.history_for_user("GROUP_EVERYONE").await?.is_empty());
    assert!(store.history_for_user("ROLE_OWNER").await?.is_empty());
    assert!(store.history_for_node("site-marketing").await?.is_empty());

    let report = EffectivePermissionReport::from_repository(repo.clone())
        .direct_permissions("site-marketing")
        .await;
    assert!(report.rows.iter().all(|row| row.username != "GROUP_EVERYONE"));

    Ok(())
}

#[tokio::test]
async fn test_removed_grant_is_revoked() -> Result<()> {
    init_tracing();
    let store = memory_store().await?;
    let repo = site().await?;
    let mut reconciler = reconciler(&store, &repo)?;
    reconciler.run().await;

    assert!(reconciler.snapshot()["folder-campaigns"]
        .contains(&PermissionKey::new("bob", "SiteConsumer")));

    repo.revoke("folder-campaigns", "bob", "SiteConsumer").await;
    let report = reconciler.run().await;
    assert_eq!(report.revokes_recorded, 1);
    assert_eq!(report.grants_recorded, 0);

    let history = store.history_for_node("folder-campaigns").await?;
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].action_type, ActionType::Revoke);
    assert!(!history[0].is_active);
    assert!(history[0].revoked_date.is_some());
    assert!(history[0].expiry_date.is_none());
    assert_eq!(history[1].action_type, ActionType::Grant);

    // Revoking again is not a change
    let report = reconciler.run().await;
    assert_eq!(report.changes(), 0);

    Ok(())
}

#[tokio::test]
async fn test_regrant_after_revoke_is_recorded() -> Result<()> {
    init_tracing();
    let store = memory_store().await?;
    let repo = site().await?;
    let mut reconciler = reconciler(&store, &repo)?;
    reconciler.run().await;

    repo.revoke("doc-plan", "carol", "SiteCollaborator").await;
    reconciler.run().await;
    repo.grant("doc-plan", "carol", "SiteCollaborator").await;
    let report = reconciler.run().await;
    assert_eq!(report.grants_recorded, 1);

    let actions: Vec<_> = store
        .history_for_node("doc-plan")
        .await?
        .into_iter()
        .map(|event| event.action_type)
        .collect();
    assert_eq!(actions, vec![ActionType::Grant, ActionType::Revoke, ActionType::Grant]);

    Ok(())
}

#[tokio::test]
async fn test_node_under_two_containers_recorded_once() -> Result<()> {
    init_tracing();
    let store = memory_store().await?;
    let repo = site().await?;
    let mut reconciler = reconciler(&store, &repo)?;
    reconciler.run().await;

    // doc-brief hangs under both the library and the campaigns folder
    let history = store.history_for_node("doc-brief").await?;
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].grantee, "GROUP_CYCLE_A");

    Ok(())
}

#[tokio::test]
async fn test_cold_restart_rehydrates_snapshot() -> Result<()> {
    init_tracing();
    let store = memory_store().await?;
    let repo = site().await?;

    let mut first = reconciler(&store, &repo)?;
    first.run().await;
    let before = audit_rows(&store).await?;
    drop(first);

    repo.revoke("folder-campaigns", "bob", "SiteConsumer").await;

    let mut restarted = reconciler(&store, &repo)?;
    let report = restarted.run().await;
    assert_eq!(report.grants_recorded, 0);
    assert_eq!(report.revokes_recorded, 1);
    assert_eq!(audit_rows(&store).await?, before + 1);

    Ok(())
}

#[tokio::test]
async fn test_unreadable_subtree_does_not_stop_run() -> Result<()> {
    init_tracing();
    let store = memory_store().await?;
    let repo = site().await?;
    repo.fail_lookups_for("folder-campaigns").await;

    let mut reconciler = reconciler(&store, &repo)?;
    let report = reconciler.run().await;

    // The folder's ACL and children both fail
    assert_eq!(report.error_count(ErrorKind::Provider), 2);
    assert_eq!(report.error_count(ErrorKind::Persistence), 0);
    // doc-plan is only reachable through the folder
    assert!(store.history_for_node("doc-plan").await?.is_empty());
    assert_eq!(store.history_for_node("doc-brief").await?.len(), 1);

    Ok(())
}

#[tokio::test]
async fn test_report_expands_groups() -> Result<()> {
    init_tracing();
    let repo = site().await?;

    let report = EffectivePermissionReport::from_repository(repo)
        .direct_permissions("site-marketing")
        .await;

    let library: Vec<_> = report
        .rows
        .iter()
        .filter(|row| row.node_id == "site-marketing-library")
        .map(|row| (row.username.as_str(), row.permission_type, row.group_name.as_deref()))
        .collect();
    assert_eq!(
        library,
        vec![
            ("alice", PermissionType::Group, Some("GROUP_X")),
            ("bob", PermissionType::Group, Some("GROUP_X")),
        ]
    );

    // Cyclic groups still resolve to their users
    let mut brief: Vec<_> = report
        .rows
        .iter()
        .filter(|row| row.node_id == "doc-brief")
        .map(|row| row.username.as_str())
        .collect();
    brief.sort();
    assert_eq!(brief, vec!["dave", "erin"]);

    assert_eq!(report.counts.nodes, 5);
    assert_eq!(report.counts.total_permissions, 4);
    assert_eq!(report.counts.user_permissions, 2);
    assert_eq!(report.counts.group_permissions, 2);
    assert_eq!(report.counts.effective_permissions, 6);

    Ok(())
}

#[tokio::test]
async fn test_query_facade_over_reconciled_history() -> Result<()> {
    init_tracing();
    let store = memory_store().await?;
    let repo = site().await?;
    let mut reconciler = reconciler(&store, &repo)?;
    reconciler.run().await;

    let facade = QueryFacade::new(store.clone());
    let granted = facade
        .latest_grant_date("doc-plan", "carol", "SiteCollaborator")
        .await;
    assert!(granted.is_some());
    assert!(!facade
        .is_expired("doc-plan", "carol", "SiteCollaborator", chrono::Utc::now())
        .await);
    assert_eq!(facade.history_for_user("carol").await.len(), 1);

    Ok(())
}
