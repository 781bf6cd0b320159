//! `permwatch latest` command implementation

use crate::commands::{format_optional_timestamp, format_timestamp, open_store, print_json};
use crate::config::Config;
use crate::error::Result;
use crate::OutputFormat;
use chrono::Utc;
use colored::Colorize;
use permwatch_engine::QueryFacade;
use serde_json::json;

/// Latest grant of a permission and whether it has expired
pub async fn run(
    config: &Config,
    node: &str,
    authority: &str,
    permission: &str,
    format: OutputFormat,
) -> Result<()> {
    let facade = QueryFacade::new(open_store(config).await?);
    let now = Utc::now();
    let latest = facade.latest_grant(node, authority, permission).await;
    let expired = latest.as_ref().is_some_and(|event| event.is_expired_at(now));

    if format == OutputFormat::Json {
        return print_json(&json!({
            "node": node,
            "authority": authority,
            "permission": permission,
            "latest_grant": latest,
            "expired": expired,
        }));
    }

    let Some(event) = latest else {
        println!(
            "{} {} was never granted {} on {}",
            "→".cyan(),
            authority.bold(),
            permission.bold(),
            node
        );
        return Ok(());
    };

    println!("{} {} {} on {}", "✓".green(), authority.bold(), permission.bold(), node);
    println!("  Granted: {}", format_timestamp(event.date_granted));
    println!("  Expiry:  {}", format_optional_timestamp(event.expiry_date));
    if expired {
        println!("  {}", "Expired".red().bold());
    }

    Ok(())
}
