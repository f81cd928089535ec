//! Flow definition subcommands: import, export, list, show, delete.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Subcommand;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;
use uuid::Uuid;

use leadflow_types::flow::Flow;

use crate::state::AppState;

#[derive(Subcommand)]
pub enum FlowCommand {
    /// Validate and save a flow from a JSON document (creates or replaces).
    Import {
        /// Path to the flow JSON file.
        file: PathBuf,
    },

    /// Write a flow as JSON.
    Export {
        /// Flow ID.
        id: Uuid,

        /// Output file (stdout when omitted).
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List flow definitions.
    #[command(alias = "ls")]
    List,

    /// Show a flow's nodes and edges.
    Show {
        /// Flow ID.
        id: Uuid,
    },

    /// Delete a flow definition. Execution history is kept.
    #[command(alias = "rm")]
    Delete {
        /// Flow ID.
        id: Uuid,
    },
}

pub async fn handle_flow_command(cmd: FlowCommand, state: &AppState, json: bool) -> Result<()> {
    match cmd {
        FlowCommand::Import { file } => import_flow(&file, state, json).await,
        FlowCommand::Export { id, output } => export_flow(id, output, state).await,
        FlowCommand::List => list_flows(state, json).await,
        FlowCommand::Show { id } => show_flow(id, state, json).await,
        FlowCommand::Delete { id } => delete_flow(id, state, json).await,
    }
}

async fn import_flow(file: &Path, state: &AppState, json: bool) -> Result<()> {
    let content = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("reading {}", file.display()))?;
    let flow = state.flow_service.import_json(&content).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&flow)?);
        return Ok(());
    }

    println!();
    println!(
        "  {} Flow '{}' saved",
        style("✓").green().bold(),
        style(&flow.name).cyan()
    );
    println!("  {}  {}", style("ID:").bold(), style(flow.id.to_string()).dim());
    println!(
        "  {}  {} nodes, {} edges",
        style("Graph:").bold(),
        flow.nodes.len(),
        flow.edges.len()
    );
    if !flow.has_form_trigger() {
        println!(
            "  {} no form_submit trigger: form submissions will not start this flow",
            style("!").yellow().bold()
        );
    }
    println!();
    Ok(())
}

async fn export_flow(id: Uuid, output: Option<PathBuf>, state: &AppState) -> Result<()> {
    let document = state.flow_service.export_json(&id).await?;
    match output {
        Some(path) => {
            tokio::fs::write(&path, document)
                .await
                .with_context(|| format!("writing {}", path.display()))?;
            eprintln!("  Flow written to {}", style(path.display()).cyan());
        }
        None => println!("{document}"),
    }
    Ok(())
}

async fn list_flows(state: &AppState, json: bool) -> Result<()> {
    let flows = state.flow_service.list().await?;

    if json {
        let out: Vec<_> = flows
            .iter()
            .map(|f| {
                serde_json::json!({
                    "id": f.id,
                    "name": f.name,
                    "is_active": f.is_active,
                    "nodes": f.nodes.len(),
                    "edges": f.edges.len(),
                    "form_trigger": f.has_form_trigger(),
                    "updated_at": f.updated_at.to_rfc3339(),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    if flows.is_empty() {
        println!();
        println!("  No flows defined.");
        println!(
            "  Import one with: {}",
            style("leadflow flow import <flow.json>").dim()
        );
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("ID").fg(Color::Cyan),
            Cell::new("Name"),
            Cell::new("Active"),
            Cell::new("Nodes"),
            Cell::new("Edges"),
            Cell::new("Updated"),
        ]);

    for f in &flows {
        let active = if f.is_active {
            Cell::new("yes").fg(Color::Green)
        } else {
            Cell::new("no").fg(Color::DarkGrey)
        };
        table.add_row(vec![
            Cell::new(f.id),
            Cell::new(&f.name),
            active,
            Cell::new(f.nodes.len()),
            Cell::new(f.edges.len()),
            Cell::new(f.updated_at.format("%Y-%m-%d %H:%M").to_string()),
        ]);
    }

    println!();
    println!("{table}");
    println!();
    Ok(())
}

async fn show_flow(id: Uuid, state: &AppState, json: bool) -> Result<()> {
    let flow = state.flow_service.get(&id).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&flow)?);
        return Ok(());
    }

    println!();
    println!("  {}  {}", style("Flow:").bold(), style(&flow.name).cyan());
    if let Some(description) = &flow.description {
        println!("  {}", style(description).dim());
    }
    println!("  {}  {}", style("ID:").bold(), style(flow.id.to_string()).dim());
    println!();

    let mut nodes = Table::new();
    nodes
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Node").fg(Color::Cyan),
            Cell::new("Type"),
            Cell::new("Subtype"),
            Cell::new("Config"),
        ]);
    for n in &flow.nodes {
        nodes.add_row(vec![
            Cell::new(n.id),
            Cell::new(&n.node_type),
            Cell::new(&n.subtype),
            Cell::new(serde_json::Value::Object(n.data.clone()).to_string()),
        ]);
    }
    println!("{nodes}");

    if !flow.edges.is_empty() {
        println!();
        let mut edges = Table::new();
        edges
            .load_preset(presets::UTF8_FULL_CONDENSED)
            .set_content_arrangement(ContentArrangement::Dynamic)
            .set_header(vec![
                Cell::new("From").fg(Color::Cyan),
                Cell::new("To"),
                Cell::new("Condition"),
                Cell::new("Label"),
            ]);
        for e in &flow.edges {
            edges.add_row(vec![
                Cell::new(node_ref(&flow, &e.source_node_id)),
                Cell::new(node_ref(&flow, &e.target_node_id)),
                Cell::new(e.condition_type.as_str()),
                Cell::new(e.label.as_deref().unwrap_or("-")),
            ]);
        }
        println!("{edges}");
    }
    println!();
    Ok(())
}

/// `subtype (abcd1234)`, or the bare id when the node is gone.
fn node_ref(flow: &Flow, id: &Uuid) -> String {
    match flow.node(id) {
        Some(n) => format!("{} ({})", n.subtype, super::short_id(id)),
        None => id.to_string(),
    }
}

async fn delete_flow(id: Uuid, state: &AppState, json: bool) -> Result<()> {
    state.flow_service.delete(&id).await?;

    if json {
        println!("{}", serde_json::json!({ "deleted": id }));
    } else {
        println!();
        println!("  {} Flow {} deleted", style("✓").green().bold(), style(id).cyan());
        println!();
    }
    Ok(())
}
