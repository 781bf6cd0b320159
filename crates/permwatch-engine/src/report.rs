//! Effective permission report
//!
//! Lists, for every node under a root, which users hold which permission and
//! whether they hold it directly or through a group. Group grants are
//! expanded into one row per member.

use chrono::{DateTime, Utc};
use permwatch_common::types::is_group_authority;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use tracing::{info, warn};

use crate::filter::is_system_permission;
use crate::group::GroupExpander;
use crate::providers::{AclProvider, AuthorityProvider, NodeProvider};
use crate::walker::TreeWalker;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PermissionType {
    Direct,
    Group,
}

impl std::fmt::Display for PermissionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PermissionType::Direct => f.write_str("DIRECT"),
            PermissionType::Group => f.write_str("GROUP"),
        }
    }
}

/// What kind of node a row is about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    Container,
    Content,
}

impl std::fmt::Display for NodeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeType::Container => f.write_str("container"),
            NodeType::Content => f.write_str("content"),
        }
    }
}

/// Node details shared by every row of one node
#[derive(Debug, Clone)]
struct NodeInfo {
    id: String,
    path: Option<String>,
    node_type: NodeType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EffectivePermissionRow {
    pub username: String,
    pub node_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_path: Option<String>,
    pub node_type: NodeType,
    pub role: String,
    /// Group the user got the permission through
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_name: Option<String>,
    pub permission_type: PermissionType,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReportCounts {
    pub nodes: usize,
    /// ACL entries after dropping system entries
    pub total_permissions: usize,
    pub user_permissions: usize,
    pub group_permissions: usize,
    /// Rows, i.e. per-user permissions after group expansion
    pub effective_permissions: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct DirectPermissionsReport {
    pub root: String,
    pub generated_at: DateTime<Utc>,
    pub rows: Vec<EffectivePermissionRow>,
    pub counts: ReportCounts,
    /// Nodes or subtrees that could not be read
    pub errors: usize,
}

pub struct EffectivePermissionReport {
    nodes: Arc<dyn NodeProvider>,
    acls: Arc<dyn AclProvider>,
    authorities: Arc<dyn AuthorityProvider>,
}

impl EffectivePermissionReport {
    pub fn new(
        nodes: Arc<dyn NodeProvider>,
        acls: Arc<dyn AclProvider>,
        authorities: Arc<dyn AuthorityProvider>,
    ) -> Self {
        Self {
            nodes,
            acls,
            authorities,
        }
    }

    pub fn from_repository<R>(repository: Arc<R>) -> Self
    where
        R: NodeProvider + AclProvider + AuthorityProvider + 'static,
    {
        Self::new(repository.clone(), repository.clone(), repository)
    }

    /// Who can do what under `root`
    pub async fn direct_permissions(&self, root: &str) -> DirectPermissionsReport {
        let mut visited = HashSet::new();
        let mut walker = TreeWalker::new(self.nodes.as_ref(), root, &mut visited);
        let expander = GroupExpander::new(self.authorities.as_ref());
        let mut expanded: HashMap<String, BTreeSet<String>> = HashMap::new();

        let mut rows = Vec::new();
        let mut counts = ReportCounts::default();
        let mut errors = 0;

        while let Some(item) = walker.next().await {
            let node_id = match item {
                Ok(node_id) => node_id,
                Err(e) => {
                    warn!(root = %root, error = %e, "Skipping unreadable subtree");
                    errors += 1;
                    continue;
                },
            };
            counts.nodes += 1;

            let grants = match self.acls.all_set_permissions(&node_id).await {
                Ok(grants) => grants,
                Err(e) => {
                    warn!(node = %node_id, error = %e, "Failed to read permissions");
                    errors += 1;
                    continue;
                },
            };
            let node = self.node_info(node_id).await;

            for grant in grants {
                if is_system_permission(&grant.authority, &grant.permission) {
                    continue;
                }
                counts.total_permissions += 1;

                if !is_group_authority(&grant.authority) {
                    counts.user_permissions += 1;
                    rows.push(EffectivePermissionRow {
                        username: grant.authority,
                        node_id: node.id.clone(),
                        node_path: node.path.clone(),
                        node_type: node.node_type,
                        role: grant.permission,
                        group_name: None,
                        permission_type: PermissionType::Direct,
                    });
                    continue;
                }

                counts.group_permissions += 1;
                if !expanded.contains_key(&grant.authority) {
                    let members = expander.expand(&grant.authority).await.unwrap_or_else(|e| {
                        warn!(group = %grant.authority, error = %e, "Failed to expand group");
                        BTreeSet::new()
                    });
                    expanded.insert(grant.authority.clone(), members);
                }

                for user in expanded.get(&grant.authority).into_iter().flatten() {
                    rows.push(EffectivePermissionRow {
                        username: user.clone(),
                        node_id: node.id.clone(),
                        node_path: node.path.clone(),
                        node_type: node.node_type,
                        role: grant.permission.clone(),
                        group_name: Some(grant.authority.clone()),
                        permission_type: PermissionType::Group,
                    });
                }
            }
        }

        counts.effective_permissions = rows.len();
        info!(
            root = %root,
            nodes = counts.nodes,
            rows = counts.effective_permissions,
            errors,
            "Built effective permission report"
        );

        DirectPermissionsReport {
            root: root.to_string(),
            generated_at: Utc::now(),
            rows,
            counts,
            errors,
        }
    }

    /// Path and type lookups are cosmetic; failures leave the defaults
    async fn node_info(&self, node_id: String) -> NodeInfo {
        let path = self.nodes.display_path(&node_id).await.unwrap_or_else(|e| {
            warn!(node = %node_id, error = %e, "Failed to resolve node path");
            None
        });
        let node_type = match self.nodes.is_container(&node_id).await {
            Ok(true) => NodeType::Container,
            Ok(false) => NodeType::Content,
            Err(e) => {
                warn!(node = %node_id, error = %e, "Failed to resolve node type");
                NodeType::Content
            },
        };

        NodeInfo {
            id: node_id,
            path,
            node_type,
        }
    }
}
