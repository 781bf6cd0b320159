//! permwatch CLI Library
//!
//! Operator surface for the permission audit engine.
//!
//! # Overview
//!
//! - **Schema**: create or migrate the audit table (`permwatch schema init`)
//! - **Reconciliation**: one-shot or polling runs (`permwatch reconcile`)
//! - **Single nodes**: reconcile one node on demand (`permwatch check-node`)
//! - **History**: grant/revoke history per node or user (`permwatch history`)
//! - **Latest grant**: last grant of a triple and its expiry (`permwatch latest`)
//! - **Reporting**: effective permissions under a root (`permwatch report`)

pub mod commands;
pub mod config;
pub mod error;

// Re-export commonly used types
pub use config::Config;
pub use error::{CliError, Result};

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// permwatch - Permission audit and reconciliation
#[derive(Parser, Debug)]
#[command(name = "permwatch")]
#[command(author, version, about, long_about = None)]
#[command(arg_required_else_help = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Audit database URL (postgres://, mysql://, sqlite:)
    #[arg(long, env = "PERMWATCH_DATABASE_URL", global = true)]
    pub database_url: Option<String>,

    /// Repository snapshot (JSON) to audit
    #[arg(long, env = "PERMWATCH_REPOSITORY", global = true)]
    pub repository: Option<PathBuf>,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Table, global = true)]
    pub format: OutputFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Table,
    Json,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Manage the audit table
    Schema {
        #[command(subcommand)]
        command: SchemaCommand,
    },

    /// Reconcile every node under the repository roots
    Reconcile {
        /// Keep polling, waiting this many seconds between runs
        #[arg(short, long)]
        interval: Option<u64>,

        /// Stop after this many runs (with --interval)
        #[arg(long)]
        max_runs: Option<usize>,
    },

    /// Reconcile a single node
    CheckNode {
        /// Node id
        node: String,
    },

    /// Show grant/revoke history
    History {
        /// History of this node
        #[arg(long, conflicts_with = "user", required_unless_present = "user")]
        node: Option<String>,

        /// History of this user or group
        #[arg(long)]
        user: Option<String>,

        /// Limit number of events to show
        #[arg(short, long, default_value = "50")]
        limit: usize,
    },

    /// Show the latest grant of a permission
    Latest {
        /// Node id
        node: String,

        /// User or group
        authority: String,

        /// Permission name
        permission: String,
    },

    /// Effective permissions under a root, groups expanded
    Report {
        /// Root node id
        root: String,
    },
}

/// Schema subcommands
#[derive(Subcommand, Debug)]
pub enum SchemaCommand {
    /// Create the audit table or migrate an older layout
    Init,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_history_needs_node_or_user() {
        let parsed = Cli::try_parse_from(["permwatch", "history", "--node", "doc-1"]).unwrap();
        assert!(matches!(parsed.command, Commands::History { node: Some(_), .. }));

        assert!(Cli::try_parse_from(["permwatch", "history"]).is_err());
        assert!(
            Cli::try_parse_from(["permwatch", "history", "--node", "a", "--user", "b"]).is_err()
        );
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let parsed = Cli::try_parse_from([
            "permwatch",
            "report",
            "site",
            "--format",
            "json",
            "--database-url",
            "sqlite::memory:",
        ])
        .unwrap();
        assert_eq!(parsed.format, OutputFormat::Json);
        assert_eq!(parsed.database_url.as_deref(), Some("sqlite::memory:"));
    }
}
