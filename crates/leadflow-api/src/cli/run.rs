//! Starting executions from the command line: manual runs and form submissions.

use anyhow::Result;
use clap::Args;
use console::style;
use uuid::Uuid;

use leadflow_core::engine::RunReport;
use leadflow_core::service::contact::ContactError;
use leadflow_types::contact::{Contact, ContactSubmission};
use leadflow_types::execution::ExecutionStatus;

use crate::state::AppState;

/// Contact fields supplied on the command line.
#[derive(Args, Debug, Clone)]
pub struct ContactArgs {
    /// Contact name.
    #[arg(long)]
    pub name: String,

    /// Contact email address.
    #[arg(long)]
    pub email: Option<String>,

    /// Contact phone number in E.164 form (+15551234567).
    #[arg(long)]
    pub phone: Option<String>,
}

impl From<ContactArgs> for ContactSubmission {
    fn from(args: ContactArgs) -> Self {
        ContactSubmission {
            name: args.name,
            email: args.email,
            phone: args.phone,
        }
    }
}

/// Run a flow for a transient contact. Nothing about the contact is stored
/// beyond the execution context.
pub async fn run_flow(state: &AppState, flow_id: Uuid, contact: ContactArgs, json: bool) -> Result<()> {
    let contact = Contact::transient(contact.name, contact.email, contact.phone);
    let report = state
        .runner
        .run_flow(flow_id, &contact)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to run flow: {e}"))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }
    Ok(())
}

/// Store a contact through the form path and start the active form flow.
pub async fn submit(state: &AppState, contact: ContactArgs, json: bool) -> Result<()> {
    let outcome = match state.contact_service.submit(&contact.into()).await {
        Ok(outcome) => outcome,
        Err(ContactError::Invalid(errors)) => {
            if json {
                println!("{}", serde_json::json!({ "errors": errors }));
            } else {
                println!();
                for e in &errors {
                    println!(
                        "  {} {}: {}",
                        style("✗").red().bold(),
                        style(e.field).bold(),
                        e.message
                    );
                }
                println!();
            }
            anyhow::bail!("submission rejected");
        }
        Err(e) => return Err(anyhow::anyhow!("Failed to submit contact: {e}")),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
        return Ok(());
    }

    println!();
    println!(
        "  {} Contact '{}' saved",
        style("✓").green().bold(),
        style(&outcome.contact.name).cyan()
    );
    if let Some(id) = outcome.contact.id {
        println!("  {}  {}", style("ID:").bold(), style(id).dim());
    }
    match (&outcome.run, outcome.flow_id) {
        (Some(report), _) => print_report(report),
        (None, Some(flow_id)) => {
            println!(
                "  {} Flow {} could not be started; see the log for details.",
                style("!").yellow().bold(),
                super::short_id(&flow_id)
            );
            println!();
        }
        (None, None) => {
            println!(
                "  {}",
                style("No active flow with a form_submit trigger; nothing started.").dim()
            );
            println!();
        }
    }
    Ok(())
}

pub(crate) fn print_report(report: &RunReport) {
    let status = match report.status {
        ExecutionStatus::Completed => style("completed").green().bold(),
        ExecutionStatus::Running => style("waiting").blue().bold(),
        ExecutionStatus::Failed => style("failed").red().bold(),
        ExecutionStatus::Pending => style("pending").yellow().bold(),
    };

    println!();
    println!(
        "  {}  {}",
        style("Execution:").bold(),
        style(report.execution_id).cyan()
    );
    println!("  {}     {status}", style("Status:").bold());
    println!("  {}      {}", style("Steps:").bold(), report.steps);
    if !report.scheduled_tasks.is_empty() {
        println!(
            "  {}  {} resumption task(s) scheduled",
            style("Waiting:").bold(),
            report.scheduled_tasks.len()
        );
    }
    if let Some(error) = &report.error {
        println!("  {}      {}", style("Error:").bold(), style(error).red());
    }
    println!();
}
