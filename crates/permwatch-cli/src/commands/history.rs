//! `permwatch history` command implementation

use crate::commands::{
    format_optional_timestamp, format_timestamp, new_table, open_store, print_json,
};
use crate::config::Config;
use crate::error::Result;
use crate::OutputFormat;
use colored::Colorize;
use permwatch_engine::{AuditEvent, QueryFacade};

/// Show the most recent events for a node or a grantee
pub async fn run(
    config: &Config,
    node: Option<&str>,
    user: Option<&str>,
    limit: usize,
    format: OutputFormat,
) -> Result<()> {
    let facade = QueryFacade::new(open_store(config).await?);

    let (subject, mut events) = match (node, user) {
        (Some(node), _) => (format!("node {node}"), facade.history_for_node(node).await),
        (None, Some(user)) => (format!("user {user}"), facade.history_for_user(user).await),
        (None, None) => (String::new(), Vec::new()),
    };
    events.truncate(limit);

    if format == OutputFormat::Json {
        return print_json(&events);
    }

    if events.is_empty() {
        println!("{} No audit events found for {}", "→".cyan(), subject);
        return Ok(());
    }

    println!("{} Showing {} most recent events for {}:", "→".cyan(), events.len(), subject);
    println!("{}", events_table(&events));
    Ok(())
}

fn events_table(events: &[AuditEvent]) -> comfy_table::Table {
    let mut table = new_table([
        "ID", "Date", "Action", "Node", "Grantee", "Permission", "Expiry", "Active",
    ]);

    for event in events {
        table.add_row(vec![
            event.id.to_string(),
            format_timestamp(event.date_granted),
            event.action_type.to_string(),
            event.node_ref.clone(),
            event.grantee.clone(),
            event.permission.clone(),
            format_optional_timestamp(event.expiry_date),
            if event.is_active { "yes" } else { "no" }.to_string(),
        ]);
    }

    table
}
