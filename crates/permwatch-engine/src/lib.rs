//! permwatch Engine
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Permission audit and reconciliation over a content repository.
//!
//! # Overview
//!
//! - **Store**: append-only grant/revoke history in `permission_audit`, on
//!   PostgreSQL, MySQL or SQLite, with idempotent schema management
//! - **Reconciler**: polling diff of current ACLs against the previous run
//! - **Group expansion**: cycle-safe resolution of groups into users
//! - **Walker**: deduplicated depth-first traversal of the node tree
//! - **Query / Report**: read-only history lookups and effective permission
//!   reports
//!
//! The repository itself is reached through the traits in [`providers`].
//! [`InMemoryRepository`] implements all of them from a JSON snapshot.

pub mod error;
pub mod filter;
pub mod group;
pub mod memory;
pub mod providers;
pub mod query;
pub mod reconciler;
pub mod report;
pub mod store;
pub mod walker;

pub use error::{EngineError, ErrorKind, Result};
pub use filter::is_system_permission;
pub use group::GroupExpander;
pub use memory::{InMemoryRepository, RepositorySnapshot};
pub use providers::{AclProvider, AuthorityProvider, NodeProvider, RootProvider};
pub use query::QueryFacade;
pub use reconciler::{Reconciler, ReconcilerBuilder, RunReport};
pub use report::{DirectPermissionsReport, EffectivePermissionReport, NodeType, PermissionType};
pub use store::{AuditEvent, AuditStore, SchemaOutcome, StoreOptions};
pub use walker::TreeWalker;
