//! Repository backed by a JSON snapshot held in memory
//!
//! Implements every provider trait, so a reconciler or report can run
//! against a repository exported to a file. The mutation helpers let tests
//! change ACLs and memberships between runs.
//!
//! ```json
//! {
//!   "roots": ["site-a"],
//!   "nodes": {
//!     "site-a": { "container": true, "children": ["doc-1"], "acl": [] },
//!     "doc-1": { "acl": [{ "authority": "GROUP_X", "permission": "SiteConsumer" }] }
//!   },
//!   "groups": { "GROUP_X": ["alice", "bob"] },
//!   "users": ["alice", "bob"]
//! }
//! ```

use async_trait::async_trait;
use permwatch_common::{AccessGrant, PermwatchError};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use tokio::sync::RwLock;

use crate::error::{EngineError, Result};
use crate::providers::{AclProvider, AuthorityProvider, NodeProvider, RootProvider};

/// One node of a repository snapshot
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeEntry {
    #[serde(default)]
    pub container: bool,
    #[serde(default)]
    pub children: Vec<String>,
    #[serde(default)]
    pub acl: Vec<AccessGrant>,
    /// Display path, e.g. `/Sites/marketing/documentLibrary/brief.docx`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

/// Serialized form of a whole repository
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RepositorySnapshot {
    #[serde(default)]
    pub roots: Vec<String>,
    #[serde(default)]
    pub nodes: BTreeMap<String, NodeEntry>,
    /// Direct members per group; members may be users or groups
    #[serde(default)]
    pub groups: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub users: Vec<String>,
}

#[derive(Debug, Default)]
pub struct InMemoryRepository {
    state: RwLock<RepositorySnapshot>,
    /// Ids whose children, ACL or membership lookups fail
    failing: RwLock<HashSet<String>>,
}

impl InMemoryRepository {
    pub fn new(snapshot: RepositorySnapshot) -> Self {
        Self {
            state: RwLock::new(snapshot),
            failing: RwLock::new(HashSet::new()),
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let snapshot: RepositorySnapshot =
            serde_json::from_str(json).map_err(PermwatchError::from)?;
        Ok(Self::new(snapshot))
    }

    /// Load a snapshot file
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            EngineError::config(format!(
                "Failed to read repository snapshot {}: {e}",
                path.display()
            ))
        })?;
        Self::from_json(&json)
    }

    /// Copy of the current state
    pub async fn snapshot(&self) -> RepositorySnapshot {
        self.state.read().await.clone()
    }

    /// Swap in a freshly exported snapshot, e.g. between polling runs
    pub async fn replace(&self, snapshot: RepositorySnapshot) {
        *self.state.write().await = snapshot;
    }

    /// Re-read a snapshot file into this repository
    pub async fn reload(&self, path: impl AsRef<Path>) -> Result<()> {
        let fresh = Self::from_path(path)?;
        let snapshot = fresh.state.into_inner();
        self.replace(snapshot).await;
        Ok(())
    }

    pub async fn add_root(&self, node_id: &str) {
        let mut state = self.state.write().await;
        if !state.roots.iter().any(|r| r == node_id) {
            state.roots.push(node_id.to_string());
        }
    }

    /// Insert a node, attaching it to `parent` when given
    pub async fn add_node(&self, node_id: &str, container: bool, parent: Option<&str>) {
        let mut state = self.state.write().await;
        state
            .nodes
            .entry(node_id.to_string())
            .or_default()
            .container = container;

        if let Some(parent) = parent {
            let parent = state.nodes.entry(parent.to_string()).or_default();
            parent.container = true;
            if !parent.children.iter().any(|c| c == node_id) {
                parent.children.push(node_id.to_string());
            }
        }
    }

    pub async fn set_path(&self, node_id: &str, path: &str) {
        let mut state = self.state.write().await;
        state.nodes.entry(node_id.to_string()).or_default().path = Some(path.to_string());
    }

    pub async fn remove_node(&self, node_id: &str) {
        let mut state = self.state.write().await;
        state.nodes.remove(node_id);
    }

    pub async fn grant(&self, node_id: &str, authority: &str, permission: &str) {
        let grant = AccessGrant::new(authority, permission);
        let mut state = self.state.write().await;
        let acl = &mut state.nodes.entry(node_id.to_string()).or_default().acl;
        if !acl.contains(&grant) {
            acl.push(grant);
        }
    }

    pub async fn revoke(&self, node_id: &str, authority: &str, permission: &str) {
        let mut state = self.state.write().await;
        if let Some(node) = state.nodes.get_mut(node_id) {
            node.acl
                .retain(|g| !(g.authority == authority && g.permission == permission));
        }
    }

    pub async fn add_member(&self, group: &str, member: &str) {
        let mut state = self.state.write().await;
        let members = state.groups.entry(group.to_string()).or_default();
        if !members.iter().any(|m| m == member) {
            members.push(member.to_string());
        }
    }

    /// Make children, ACL and membership lookups for `id` fail
    pub async fn fail_lookups_for(&self, id: &str) {
        self.failing.write().await.insert(id.to_string());
    }

    async fn check_failing(&self, id: &str) -> Result<()> {
        if self.failing.read().await.contains(id) {
            return Err(EngineError::provider(format!("Lookup failed for {id}")));
        }
        Ok(())
    }

    async fn node(&self, node_id: &str) -> Result<NodeEntry> {
        self.state
            .read()
            .await
            .nodes
            .get(node_id)
            .cloned()
            .ok_or_else(|| EngineError::provider(format!("Node not found: {node_id}")))
    }
}

#[async_trait]
impl NodeProvider for InMemoryRepository {
    async fn exists(&self, node_id: &str) -> Result<bool> {
        Ok(self.state.read().await.nodes.contains_key(node_id))
    }

    async fn children_of(&self, node_id: &str) -> Result<Vec<String>> {
        self.check_failing(node_id).await?;
        Ok(self.node(node_id).await?.children)
    }

    async fn is_container(&self, node_id: &str) -> Result<bool> {
        Ok(self.node(node_id).await?.container)
    }

    async fn display_path(&self, node_id: &str) -> Result<Option<String>> {
        Ok(self.node(node_id).await?.path)
    }
}

#[async_trait]
impl AclProvider for InMemoryRepository {
    async fn all_set_permissions(&self, node_id: &str) -> Result<Vec<AccessGrant>> {
        self.check_failing(node_id).await?;
        Ok(self.node(node_id).await?.acl)
    }
}

#[async_trait]
impl AuthorityProvider for InMemoryRepository {
    async fn members_of(&self, group: &str, recursive: bool) -> Result<Vec<String>> {
        self.check_failing(group).await?;

        let state = self.state.read().await;
        let direct = state
            .groups
            .get(group)
            .ok_or_else(|| EngineError::provider(format!("Unknown group: {group}")))?;

        if !recursive {
            return Ok(direct.clone());
        }

        let mut seen: HashSet<&str> = HashSet::from([group]);
        let mut stack: Vec<&str> = direct.iter().map(String::as_str).collect();
        let mut members = Vec::new();
        while let Some(member) = stack.pop() {
            if !seen.insert(member) {
                continue;
            }
            members.push(member.to_string());
            if let Some(nested) = state.groups.get(member) {
                stack.extend(nested.iter().map(String::as_str));
            }
        }
        Ok(members)
    }

    async fn exists(&self, authority: &str) -> Result<bool> {
        let state = self.state.read().await;
        Ok(state.groups.contains_key(authority) || state.users.iter().any(|u| u == authority))
    }
}

#[async_trait]
impl RootProvider for InMemoryRepository {
    async fn roots(&self) -> Result<Vec<String>> {
        Ok(self.state.read().await.roots.clone())
    }
}
