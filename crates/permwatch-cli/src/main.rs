//! permwatch CLI - Main entry point

use clap::Parser;
use permwatch_cli::{Cli, Commands, Config};
use permwatch_common::logging::{init_logging, LogConfig, LogLevel, LogOutput};
use std::process;
use tracing::error;

#[tokio::main]
async fn main() {
    // .env has to be loaded before clap reads `env =` defaults
    dotenvy::dotenv().ok();

    // Parse command-line arguments
    let cli = Cli::parse();

    // Verbose mode logs debug to the console, otherwise warnings only
    let level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Warn
    };
    let log_config = LogConfig::builder()
        .level(level)
        .output(LogOutput::Console)
        .log_file_prefix("permwatch-cli")
        .build();

    // Environment variables take precedence
    let log_config = log_config.clone().with_env().unwrap_or(log_config);

    // The CLI works without logging
    let _ = init_logging(&log_config);

    if let Err(e) = execute_command(&cli).await {
        error!(error = %e, "Command failed");
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

/// Execute the CLI command
async fn execute_command(cli: &Cli) -> permwatch_cli::Result<()> {
    let config = Config::load()?.with_overrides(cli.database_url.clone(), cli.repository.clone());
    let format = cli.format;

    match &cli.command {
        Commands::Schema { command } => {
            permwatch_cli::commands::schema::run(&config, command, format).await
        },

        Commands::Reconcile { interval, max_runs } => {
            permwatch_cli::commands::reconcile::run(&config, *interval, *max_runs, format).await
        },

        Commands::CheckNode { node } => {
            permwatch_cli::commands::check_node::run(&config, node, format).await
        },

        Commands::History { node, user, limit } => {
            permwatch_cli::commands::history::run(
                &config,
                node.as_deref(),
                user.as_deref(),
                *limit,
                format,
            )
            .await
        },

        Commands::Latest {
            node,
            authority,
            permission,
        } => {
            permwatch_cli::commands::latest::run(&config, node, authority, permission, format)
                .await
        },

        Commands::Report { root } => {
            permwatch_cli::commands::report::run(&config, root, format).await
        },
    }
}
