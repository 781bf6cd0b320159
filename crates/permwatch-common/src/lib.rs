//! permwatch Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared types, logging setup, and error handling for the permwatch project.
//!
//! # Overview
//!
//! This crate provides common functionality used across all permwatch workspace members:
//!
//! - **Error Handling**: Custom error types and result types
//! - **Logging**: `tracing` subscriber configuration shared by every binary
//! - **Types**: Access grants, permission keys and audit action types
//!
//! # Example
//!
//! ```no_run
//! use permwatch_common::types::PermissionKey;
//!
//! fn main() -> permwatch_common::Result<()> {
//!     let key: PermissionKey = "GROUP_X:SiteConsumer".parse()?;
//!     assert_eq!(key.authority, "GROUP_X");
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod logging;
pub mod types;

// Re-export commonly used types
pub use error::{PermwatchError, Result};
pub use types::{AccessGrant, ActionType, PermissionKey};
