//! CLI command definitions for the `leadflow` binary.
//!
//! Uses clap derive macros for argument parsing. Commands follow a noun-verb
//! pattern (e.g., `leadflow flow import`, `leadflow executions retry`).

pub mod execution;
pub mod flow;
pub mod run;
pub mod worker;

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use comfy_table::{Cell, Color};
use leadflow_types::execution::{ExecutionStatus, StepStatus};

/// Run contact follow-up flows: triggers, emails, SMS and timed waits.
#[derive(Parser)]
#[command(name = "leadflow", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all output except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for verbose, -vv for debug/trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Export spans through OpenTelemetry (stdout exporter).
    #[arg(long, global = true, env = "LEADFLOW_OTEL")]
    pub otel: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Manage flow definitions.
    Flow {
        #[command(subcommand)]
        action: flow::FlowCommand,
    },

    /// Run a flow for a one-off contact (not stored).
    Run {
        /// Flow ID.
        flow_id: uuid::Uuid,

        #[command(flatten)]
        contact: run::ContactArgs,
    },

    /// Submit a contact form: store the contact and start the form flow.
    Submit {
        #[command(flatten)]
        contact: run::ContactArgs,
    },

    /// Inspect and retry flow executions.
    #[command(alias = "exec")]
    Executions {
        #[command(subcommand)]
        action: execution::ExecutionsCommand,
    },

    /// Resume suspended executions as their delays elapse.
    Worker {
        /// Process the tasks due now and exit.
        #[arg(long)]
        once: bool,
    },

    /// Start the REST API server with an in-process worker.
    Serve {
        /// Port to listen on (default from config, 3000).
        #[arg(short, long)]
        port: Option<u16>,

        /// Host to bind to (default from config, 127.0.0.1).
        #[arg(long)]
        host: Option<String>,

        /// Do not run the resumption worker inside the server.
        #[arg(long)]
        no_worker: bool,
    },

    /// Generate shell completions.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}

/// Default log filter for the verbosity flags.
pub fn log_filter(verbose: u8, quiet: bool) -> &'static str {
    match verbose {
        0 if quiet => "error",
        0 => "warn",
        1 => "info,leadflow=debug",
        _ => "trace",
    }
}

pub(crate) fn execution_status_cell(status: ExecutionStatus) -> Cell {
    match status {
        ExecutionStatus::Pending => Cell::new("pending").fg(Color::Yellow),
        ExecutionStatus::Running => Cell::new("running").fg(Color::Blue),
        ExecutionStatus::Completed => Cell::new("completed").fg(Color::Green),
        ExecutionStatus::Failed => Cell::new("failed").fg(Color::Red),
    }
}

pub(crate) fn step_status_cell(status: StepStatus) -> Cell {
    match status {
        StepStatus::Pending => Cell::new("pending").fg(Color::Yellow),
        StepStatus::Running => Cell::new("running").fg(Color::Blue),
        StepStatus::Completed => Cell::new("completed").fg(Color::Green),
        StepStatus::Failed => Cell::new("failed").fg(Color::Red),
        StepStatus::Skipped => Cell::new("skipped").fg(Color::DarkGrey),
    }
}

/// First eight characters of an id, for tables.
pub(crate) fn short_id(id: &uuid::Uuid) -> String {
    id.to_string().chars().take(8).collect()
}
