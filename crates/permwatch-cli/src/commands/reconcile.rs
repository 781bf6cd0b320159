//! `permwatch reconcile` command implementation
//!
//! Runs once, or keeps polling with `--interval`. In polling mode the
//! repository snapshot is re-read before every run so exported changes are
//! picked up.

use crate::commands::{format_timestamp, load_repository, open_ready_store, print_json};
use crate::config::Config;
use crate::error::{CliError, Result};
use crate::OutputFormat;
use colored::Colorize;
use permwatch_engine::{ErrorKind, Reconciler, RunReport};
use std::time::Duration;
use tracing::{info, warn};

pub async fn run(
    config: &Config,
    interval: Option<u64>,
    max_runs: Option<usize>,
    format: OutputFormat,
) -> Result<()> {
    let store = open_ready_store(config).await?;
    let repository = load_repository(config)?;
    let mut reconciler = Reconciler::builder()
        .store(store)
        .repository(repository.clone())
        .build()?;

    let Some(seconds) = interval else {
        let report = reconciler.run().await;
        return print_report(&report, format);
    };

    if seconds == 0 {
        return Err(CliError::config("--interval must be at least 1 second"));
    }

    let mut ticker = tokio::time::interval(Duration::from_secs(seconds));
    let mut runs = 0usize;
    info!(interval_secs = seconds, "Polling for permission changes");

    loop {
        tokio::select! {
            _ = ticker.tick() => {},
            _ = tokio::signal::ctrl_c() => {
                info!(runs, "Interrupted, stopping");
                break;
            },
        }

        if runs > 0 {
            if let Err(e) = repository.reload(config.repository()?).await {
                warn!(error = %e, "Failed to reload repository snapshot, reusing the previous one");
            }
        }

        let report = reconciler.run().await;
        print_report(&report, format)?;

        runs += 1;
        if max_runs.is_some_and(|max| runs >= max) {
            break;
        }
    }

    Ok(())
}

pub(crate) fn print_report(report: &RunReport, format: OutputFormat) -> Result<()> {
    if format == OutputFormat::Json {
        return print_json(report);
    }

    let status = if report.total_errors() == 0 {
        "✓".green()
    } else {
        "!".yellow()
    };
    println!(
        "{} Run {} finished at {}",
        status,
        report.run_id.to_string().bright_black(),
        report
            .finished_at
            .map(format_timestamp)
            .unwrap_or_else(|| "-".to_string())
            .dimmed()
    );
    println!("  Roots:   {}", report.roots);
    println!("  Nodes:   {}", report.nodes_visited);
    println!("  Grants:  {}", report.grants_recorded.to_string().green());
    println!("  Revokes: {}", report.revokes_recorded.to_string().red());

    if report.total_errors() > 0 {
        println!(
            "  Errors:  {} provider, {} persistence",
            report.error_count(ErrorKind::Provider).to_string().yellow(),
            report.error_count(ErrorKind::Persistence).to_string().yellow()
        );
    }

    Ok(())
}
