//! `permwatch check-node` command implementation

use crate::commands::reconcile::print_report;
use crate::commands::{load_repository, open_ready_store};
use crate::config::Config;
use crate::error::{CliError, Result};
use crate::OutputFormat;
use permwatch_engine::{NodeProvider, Reconciler};

/// Reconcile one node against the audit history
pub async fn run(config: &Config, node: &str, format: OutputFormat) -> Result<()> {
    let repository = load_repository(config)?;
    if !NodeProvider::exists(repository.as_ref(), node).await? {
        return Err(CliError::NodeNotFound(node.to_string()));
    }

    let store = open_ready_store(config).await?;
    let mut reconciler = Reconciler::builder()
        .store(store)
        .repository(repository)
        .build()?;

    let report = reconciler.check_node(node).await?;
    print_report(&report, format)
}
