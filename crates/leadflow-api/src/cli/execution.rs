//! Execution monitoring subcommands: list, show steps, retry, stats.

use anyhow::Result;
use clap::Subcommand;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;
use uuid::Uuid;

use leadflow_core::engine::RetryError;
use leadflow_core::repository::execution::ExecutionRepository;
use leadflow_types::execution::{ExecutionFilter, ExecutionStatus};

use super::{execution_status_cell, short_id, step_status_cell};
use crate::state::AppState;

#[derive(Subcommand)]
pub enum ExecutionsCommand {
    /// List executions, newest first.
    #[command(alias = "ls")]
    List {
        /// Only executions of this flow.
        #[arg(long)]
        flow: Option<Uuid>,

        /// Only executions in this status (pending, running, completed, failed).
        #[arg(long)]
        status: Option<ExecutionStatus>,

        /// Maximum number of executions to show.
        #[arg(long, default_value_t = 20)]
        limit: u32,

        /// Number of executions to skip.
        #[arg(long, default_value_t = 0)]
        offset: u32,
    },

    /// Show one execution and its steps.
    Steps {
        /// Execution ID.
        id: Uuid,
    },

    /// Retry a failed execution.
    Retry {
        /// Execution ID.
        id: Uuid,
    },

    /// Totals per status and per day.
    Stats {
        /// Number of trailing days in the daily breakdown.
        #[arg(long, default_value_t = 7)]
        days: u32,
    },
}

pub async fn handle_executions_command(
    cmd: ExecutionsCommand,
    state: &AppState,
    json: bool,
) -> Result<()> {
    match cmd {
        ExecutionsCommand::List {
            flow,
            status,
            limit,
            offset,
        } => {
            let filter = ExecutionFilter {
                flow_id: flow,
                status,
                limit,
                offset,
            };
            list_executions(&filter, state, json).await
        }
        ExecutionsCommand::Steps { id } => show_steps(id, state, json).await,
        ExecutionsCommand::Retry { id } => retry_execution(id, state, json).await,
        ExecutionsCommand::Stats { days } => show_stats(days, state, json).await,
    }
}

async fn list_executions(filter: &ExecutionFilter, state: &AppState, json: bool) -> Result<()> {
    let executions = state
        .runner
        .executions()
        .list_executions(filter)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to list executions: {e}"))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&executions)?);
        return Ok(());
    }

    if executions.is_empty() {
        println!();
        println!("  No executions found.");
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("ID").fg(Color::Cyan),
            Cell::new("Flow"),
            Cell::new("Status"),
            Cell::new("Attempt"),
            Cell::new("Created"),
            Cell::new("Error"),
        ]);

    for ex in &executions {
        table.add_row(vec![
            Cell::new(ex.id),
            Cell::new(short_id(&ex.flow_id)),
            execution_status_cell(ex.status),
            Cell::new(ex.attempt),
            Cell::new(ex.created_at.format("%Y-%m-%d %H:%M:%S").to_string()),
            Cell::new(ex.error.as_deref().unwrap_or("")),
        ]);
    }

    println!();
    println!("{table}");
    println!();
    Ok(())
}

async fn show_steps(id: Uuid, state: &AppState, json: bool) -> Result<()> {
    let executions = state.runner.executions();
    let execution = executions
        .get_execution(&id)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to get execution: {e}"))?
        .ok_or_else(|| anyhow::anyhow!("Execution not found: {id}"))?;
    let steps = executions
        .list_steps(&id)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to list steps: {e}"))?;

    if json {
        let out = serde_json::json!({ "execution": execution, "steps": steps });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!();
    println!("  {}  {}", style("Execution:").bold(), style(execution.id).cyan());
    println!(
        "  {}       {}",
        style("Flow:").bold(),
        style(execution.flow_id).dim()
    );
    println!(
        "  {}     {}  (attempt {})",
        style("Status:").bold(),
        execution.status,
        execution.attempt
    );
    if let Some(error) = &execution.error {
        println!("  {}      {}", style("Error:").bold(), style(error).red());
    }
    println!();

    if steps.is_empty() {
        println!("  No steps recorded.");
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Node").fg(Color::Cyan),
            Cell::new("Label"),
            Cell::new("Status"),
            Cell::new("Duration"),
            Cell::new("Detail"),
        ]);

    for step in &steps {
        let label = step
            .input
            .as_ref()
            .map(|i| i.node_label.clone())
            .unwrap_or_default();
        let duration = step
            .duration_secs()
            .map(|s| format!("{s}s"))
            .unwrap_or_else(|| "-".to_string());
        let detail = match (&step.error, &step.output) {
            (Some(error), _) => error.clone(),
            (None, Some(output)) => match output.get("result") {
                Some(serde_json::Value::String(s)) => s.clone(),
                Some(other) => other.to_string(),
                None => output.to_string(),
            },
            (None, None) => String::new(),
        };
        table.add_row(vec![
            Cell::new(short_id(&step.node_id)),
            Cell::new(label),
            step_status_cell(step.status),
            Cell::new(duration),
            Cell::new(detail),
        ]);
    }

    println!("{table}");
    println!();
    Ok(())
}

async fn retry_execution(id: Uuid, state: &AppState, json: bool) -> Result<()> {
    let report = state.runner.retry(id).await.map_err(|e| match &e {
        RetryError::NotFailed { .. } | RetryError::NotFound(_) => anyhow::anyhow!("{e}"),
        _ => anyhow::anyhow!("Failed to retry execution: {e}"),
    })?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!();
    println!("  {} Retrying execution {}", style("↻").cyan().bold(), short_id(&id));
    super::run::print_report(&report);
    Ok(())
}

async fn show_stats(days: u32, state: &AppState, json: bool) -> Result<()> {
    let stats = state
        .runner
        .executions()
        .execution_stats(days)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to compute stats: {e}"))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    println!();
    println!("  {}", style("Executions").bold().underlined());
    println!();
    println!("  {:<12} {}", style("Total").bold(), stats.total_executions);
    println!(
        "  {:<12} {}",
        style("Completed").green(),
        stats.successful_executions
    );
    println!("  {:<12} {}", style("Failed").red(), stats.failed_executions);
    println!(
        "  {:<12} {}",
        style("Running").blue(),
        stats.running_executions
    );
    println!(
        "  {:<12} {}",
        style("Pending").yellow(),
        stats.pending_executions
    );
    println!();

    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Date").fg(Color::Cyan),
            Cell::new("Total"),
            Cell::new("Completed"),
            Cell::new("Failed"),
        ]);
    for day in &stats.recent_executions {
        table.add_row(vec![
            Cell::new(day.date),
            Cell::new(day.count),
            Cell::new(day.successful),
            Cell::new(day.failed),
        ]);
    }
    println!("{table}");
    println!();
    Ok(())
}
