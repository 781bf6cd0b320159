//! `permwatch report` command implementation
//!
//! Reads the repository only; the audit database is not needed.

use crate::commands::{load_repository, new_table, print_json};
use crate::config::Config;
use crate::error::{CliError, Result};
use crate::OutputFormat;
use colored::Colorize;
use permwatch_engine::{EffectivePermissionReport, NodeProvider};

pub async fn run(config: &Config, root: &str, format: OutputFormat) -> Result<()> {
    let repository = load_repository(config)?;
    if !NodeProvider::exists(repository.as_ref(), root).await? {
        return Err(CliError::NodeNotFound(root.to_string()));
    }

    let report = EffectivePermissionReport::from_repository(repository)
        .direct_permissions(root)
        .await;

    if format == OutputFormat::Json {
        return print_json(&report);
    }

    println!("{} Effective permissions under {}", "→".cyan(), root.bold());

    if report.rows.is_empty() {
        println!("  No permissions found.");
    } else {
        let mut table = new_table(["User", "Node", "Role", "Via", "Type"]);
        for row in &report.rows {
            table.add_row(vec![
                row.username.clone(),
                row.node_path.clone().unwrap_or_else(|| row.node_id.clone()),
                row.role.clone(),
                row.group_name.clone().unwrap_or_else(|| "-".to_string()),
                row.permission_type.to_string(),
            ]);
        }
        println!("{table}");
    }

    let counts = &report.counts;
    println!("{}", "Summary:".cyan().bold());
    println!("  Nodes:                 {}", counts.nodes);
    println!("  Permissions:           {}", counts.total_permissions);
    println!("  User permissions:      {}", counts.user_permissions);
    println!("  Group permissions:     {}", counts.group_permissions);
    println!("  Effective permissions: {}", counts.effective_permissions);
    if report.errors > 0 {
        println!("  {} {} node(s) could not be read", "!".yellow(), report.errors);
    }

    Ok(())
}
