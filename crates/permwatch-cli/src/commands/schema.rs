//! `permwatch schema` command implementation

use crate::commands::{open_store, print_json};
use crate::config::Config;
use crate::error::Result;
use crate::{OutputFormat, SchemaCommand};
use colored::Colorize;

pub async fn run(config: &Config, command: &SchemaCommand, format: OutputFormat) -> Result<()> {
    match command {
        SchemaCommand::Init => init(config, format).await,
    }
}

async fn init(config: &Config, format: OutputFormat) -> Result<()> {
    let store = open_store(config).await?;
    let outcome = store.ensure_schema().await?;

    if format == OutputFormat::Json {
        return print_json(&outcome);
    }

    if outcome.created_table {
        println!("{} Created audit table ({})", "✓".green(), store.dialect().name());
    } else {
        println!("{} Audit table already present ({})", "→".cyan(), store.dialect().name());
    }

    for column in &outcome.added_columns {
        println!("  {} column {}", "added".green(), column);
    }
    for column in &outcome.dropped_columns {
        println!("  {} column {}", "dropped".yellow(), column);
    }
    if outcome.sentinel_inserted {
        println!("  {} init record", "inserted".green());
    }
    if outcome.warnings > 0 {
        println!(
            "{} {} non-fatal schema statement(s) failed, run with --verbose for details",
            "!".yellow(),
            outcome.warnings
        );
    }

    Ok(())
}
