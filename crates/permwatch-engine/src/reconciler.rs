//! Polling reconciliation of ACL state against the audit history
//!
//! Each run walks every root, reads the current ACL of each node, drops
//! system entries and compares what is left with the keys seen on the
//! previous run. New keys become GRANT rows, vanished keys become REVOKE
//! rows. The previous-run snapshot lives on the [`Reconciler`]; on a cold
//! start it is rebuilt from the active rows of the audit store.
//!
//! ```no_run
//! use std::sync::Arc;
//! use permwatch_engine::{AuditStore, InMemoryRepository, Reconciler, StoreOptions};
//!
//! # async fn example() -> permwatch_engine::Result<()> {
//! let store = AuditStore::connect("sqlite::memory:", &StoreOptions::default()).await?;
//! store.ensure_schema().await?;
//!
//! let repo = Arc::new(InMemoryRepository::from_path("repository.json")?);
//! let mut reconciler = Reconciler::builder().store(store).repository(repo).build()?;
//!
//! let report = reconciler.run().await;
//! println!("{} grants, {} revokes", report.grants_recorded, report.revokes_recorded);
//! # Ok(())
//! # }
//! ```

use chrono::{DateTime, Utc};
use permwatch_common::{ActionType, PermissionKey};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn, Span};
use uuid::Uuid;

use crate::error::{EngineError, ErrorKind, Result};
use crate::filter::is_system_permission;
use crate::providers::{AclProvider, NodeProvider, RootProvider};
use crate::store::AuditStore;
use crate::walker::TreeWalker;

/// Name recorded as the actor of reconciler writes
pub const DEFAULT_ACTOR: &str = "system";

/// Permission keys per node as of the last reconciliation
pub type Snapshot = HashMap<String, HashSet<PermissionKey>>;

/// Outcome of one run, or of one single-node check
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub roots: usize,
    pub nodes_visited: usize,
    pub grants_recorded: usize,
    pub revokes_recorded: usize,
    pub errors: BTreeMap<ErrorKind, usize>,
}

impl RunReport {
    fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            finished_at: None,
            roots: 0,
            nodes_visited: 0,
            grants_recorded: 0,
            revokes_recorded: 0,
            errors: BTreeMap::new(),
        }
    }

    fn record_error(&mut self, kind: ErrorKind) {
        *self.errors.entry(kind).or_default() += 1;
    }

    pub fn error_count(&self, kind: ErrorKind) -> usize {
        self.errors.get(&kind).copied().unwrap_or(0)
    }

    pub fn total_errors(&self) -> usize {
        self.errors.values().sum()
    }

    /// Rows written by this run
    pub fn changes(&self) -> usize {
        self.grants_recorded + self.revokes_recorded
    }

    fn finish(mut self) -> Self {
        self.finished_at = Some(Utc::now());
        self
    }
}

/// State scoped to a single run
struct RunContext {
    visited: HashSet<String>,
    report: RunReport,
}

impl RunContext {
    fn new() -> Self {
        Self {
            visited: HashSet::new(),
            report: RunReport::new(),
        }
    }
}

pub struct Reconciler {
    store: AuditStore,
    nodes: Arc<dyn NodeProvider>,
    acls: Arc<dyn AclProvider>,
    roots: Arc<dyn RootProvider>,
    actor: String,
    snapshot: Snapshot,
    rehydrated: bool,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("store", &self.store)
            .field("actor", &self.actor)
            .field("snapshot_nodes", &self.snapshot.len())
            .field("rehydrated", &self.rehydrated)
            .finish_non_exhaustive()
    }
}

impl Reconciler {
    pub fn builder() -> ReconcilerBuilder {
        ReconcilerBuilder::default()
    }

    /// Reconcile every node reachable from the configured roots
    ///
    /// Errors never abort the run. They are logged and counted in the report.
    #[instrument(skip(self), fields(run_id = tracing::field::Empty))]
    pub async fn run(&mut self) -> RunReport {
        let mut ctx = RunContext::new();
        Span::current().record("run_id", tracing::field::display(ctx.report.run_id));
        info!("Starting permission reconciliation");

        self.ensure_snapshot(&mut ctx.report).await;

        let roots = match self.roots.roots().await {
            Ok(roots) => roots,
            Err(e) => {
                error!(error = %e, "Failed to enumerate roots");
                ctx.report.record_error(e.kind());
                return self.finish(ctx.report);
            },
        };

        let nodes = Arc::clone(&self.nodes);
        for root in &roots {
            ctx.report.roots += 1;
            debug!(root = %root, "Walking root");

            let mut walker = TreeWalker::new(nodes.as_ref(), root, &mut ctx.visited);
            while let Some(item) = walker.next().await {
                match item {
                    Ok(node_id) => {
                        ctx.report.nodes_visited += 1;
                        self.reconcile_node(&node_id, &mut ctx.report).await;
                    },
                    Err(e) => {
                        warn!(root = %root, error = %e, "Skipping unreadable subtree");
                        ctx.report.record_error(e.kind());
                    },
                }
            }
        }

        self.finish(ctx.report)
    }

    /// Reconcile a single node outside of a full run
    #[instrument(skip(self))]
    pub async fn check_node(&mut self, node_id: &str) -> Result<RunReport> {
        if !self.nodes.exists(node_id).await? {
            return Err(EngineError::provider(format!("Node not found: {node_id}")));
        }

        let mut report = RunReport::new();
        self.ensure_snapshot(&mut report).await;
        report.nodes_visited = 1;
        self.reconcile_node(node_id, &mut report).await;

        Ok(report.finish())
    }

    /// Forget what previous runs observed; the next run rebuilds it from
    /// the audit store
    pub fn clear_snapshot(&mut self) {
        info!(nodes = self.snapshot.len(), "Clearing permission snapshot");
        self.snapshot.clear();
        self.rehydrated = false;
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    pub fn store(&self) -> &AuditStore {
        &self.store
    }

    async fn ensure_snapshot(&mut self, report: &mut RunReport) {
        if self.rehydrated {
            return;
        }

        match self.store.active_permission_keys().await {
            Ok(active) => {
                info!(nodes = active.len(), "Rehydrated permission snapshot from audit store");
                // Nodes checked since the last clear are more recent than the store
                for (node_id, keys) in active {
                    self.snapshot.entry(node_id).or_insert(keys);
                }
                self.rehydrated = true;
            },
            Err(e) => {
                error!(error = %e, "Failed to rehydrate permission snapshot");
                report.record_error(e.kind());
            },
        }
    }

    async fn reconcile_node(&mut self, node_id: &str, report: &mut RunReport) {
        let grants = match self.acls.all_set_permissions(node_id).await {
            Ok(grants) => grants,
            Err(e) => {
                warn!(node = %node_id, error = %e, "Failed to read permissions");
                report.record_error(e.kind());
                return;
            },
        };

        let current: BTreeSet<PermissionKey> = grants
            .iter()
            .filter(|g| !is_system_permission(&g.authority, &g.permission))
            .map(|g| g.key())
            .collect();
        let previous: BTreeSet<PermissionKey> = self
            .snapshot
            .get(node_id)
            .map(|keys| keys.iter().cloned().collect())
            .unwrap_or_default();

        // What the snapshot ends up holding: failed writes are retried next run
        let mut observed: HashSet<PermissionKey> = current.iter().cloned().collect();

        for key in current.difference(&previous) {
            match self.record_grant_once(node_id, key).await {
                Ok(true) => report.grants_recorded += 1,
                Ok(false) => {},
                Err(e) => {
                    error!(node = %node_id, key = %key, error = %e, "Failed to record grant");
                    report.record_error(e.kind());
                    observed.remove(key);
                },
            }
        }

        for key in previous.difference(&current) {
            let revoked = self
                .store
                .record_revoke(
                    node_id,
                    &key.authority,
                    &key.permission,
                    Some(self.actor.as_str()),
                    Utc::now(),
                )
                .await;
            match revoked {
                Ok(()) => {
                    info!(
                        node = %node_id,
                        authority = %key.authority,
                        permission = %key.permission,
                        "Permission removed"
                    );
                    report.revokes_recorded += 1;
                },
                Err(e) => {
                    error!(node = %node_id, key = %key, error = %e, "Failed to record revoke");
                    report.record_error(e.kind());
                    observed.insert(key.clone());
                },
            }
        }

        self.snapshot.insert(node_id.to_string(), observed);
    }

    /// Record a GRANT unless the triple's latest row already is one
    async fn record_grant_once(&self, node_id: &str, key: &PermissionKey) -> Result<bool> {
        let latest = self
            .store
            .latest_event(node_id, &key.authority, &key.permission)
            .await?;

        if latest.is_some_and(|event| event.action_type == ActionType::Grant) {
            debug!(node = %node_id, key = %key, "Grant already recorded");
            return Ok(false);
        }

        self.store
            .record_grant(
                node_id,
                &key.authority,
                &key.permission,
                Some(self.actor.as_str()),
                Utc::now(),
                None,
            )
            .await?;

        info!(
            node = %node_id,
            authority = %key.authority,
            permission = %key.permission,
            "Permission added"
        );
        Ok(true)
    }

    fn finish(&self, report: RunReport) -> RunReport {
        let report = report.finish();
        info!(
            roots = report.roots,
            nodes = report.nodes_visited,
            grants = report.grants_recorded,
            revokes = report.revokes_recorded,
            errors = report.total_errors(),
            "Permission reconciliation finished"
        );
        report
    }
}

/// Builder for [`Reconciler`]
#[derive(Default)]
pub struct ReconcilerBuilder {
    store: Option<AuditStore>,
    nodes: Option<Arc<dyn NodeProvider>>,
    acls: Option<Arc<dyn AclProvider>>,
    roots: Option<Arc<dyn RootProvider>>,
    actor: Option<String>,
}

impl ReconcilerBuilder {
    pub fn store(mut self, store: AuditStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn nodes(mut self, nodes: Arc<dyn NodeProvider>) -> Self {
        self.nodes = Some(nodes);
        self
    }

    pub fn acls(mut self, acls: Arc<dyn AclProvider>) -> Self {
        self.acls = Some(acls);
        self
    }

    pub fn roots(mut self, roots: Arc<dyn RootProvider>) -> Self {
        self.roots = Some(roots);
        self
    }

    /// Use one repository for nodes, ACLs and roots
    pub fn repository<R>(self, repository: Arc<R>) -> Self
    where
        R: NodeProvider + AclProvider + RootProvider + 'static,
    {
        self.nodes(repository.clone())
            .acls(repository.clone())
            .roots(repository)
    }

    pub fn actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }

    pub fn build(self) -> Result<Reconciler> {
        Ok(Reconciler {
            store: self
                .store
                .ok_or_else(|| EngineError::config("Reconciler needs an audit store"))?,
            nodes: self
                .nodes
                .ok_or_else(|| EngineError::config("Reconciler needs a node provider"))?,
            acls: self
                .acls
                .ok_or_else(|| EngineError::config("Reconciler needs an ACL provider"))?,
            roots: self
                .roots
                .ok_or_else(|| EngineError::config("Reconciler needs a root provider"))?,
            actor: self.actor.unwrap_or_else(|| DEFAULT_ACTOR.to_string()),
            snapshot: Snapshot::new(),
            rehydrated: false,
        })
    }
}
