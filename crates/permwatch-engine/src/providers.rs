//! Collaborator interfaces onto the hosting content repository
//!
//! The engine never talks to a repository directly. Everything it needs
//! (nodes, ACLs, group membership, the roots to audit) comes through these
//! traits, so any backend can be plugged in.

use async_trait::async_trait;
use permwatch_common::AccessGrant;

use crate::error::Result;

/// Node hierarchy
#[async_trait]
pub trait NodeProvider: Send + Sync {
    async fn exists(&self, node_id: &str) -> Result<bool>;

    /// Direct children of a container, in repository order
    async fn children_of(&self, node_id: &str) -> Result<Vec<String>>;

    async fn is_container(&self, node_id: &str) -> Result<bool>;

    /// Human-readable location of the node, when the repository has one
    async fn display_path(&self, _node_id: &str) -> Result<Option<String>> {
        Ok(None)
    }
}

/// Access control lists
#[async_trait]
pub trait AclProvider: Send + Sync {
    /// Every entry set on the node, inherited entries included
    async fn all_set_permissions(&self, node_id: &str) -> Result<Vec<AccessGrant>>;
}

/// Users and groups
#[async_trait]
pub trait AuthorityProvider: Send + Sync {
    /// Members of `group`. With `recursive = false` only direct members are
    /// returned, nested groups included as group authorities.
    async fn members_of(&self, group: &str, recursive: bool) -> Result<Vec<String>>;

    async fn exists(&self, authority: &str) -> Result<bool>;
}

/// Where a reconciliation run starts
#[async_trait]
pub trait RootProvider: Send + Sync {
    async fn roots(&self) -> Result<Vec<String>>;
}
