//! `leadflow worker`: resume suspended executions as their delays elapse.

use anyhow::Result;
use console::style;
use tokio_util::sync::CancellationToken;

use leadflow_core::scheduler::TaskQueue;

use crate::state::AppState;

pub async fn run_worker(state: &AppState, once: bool, json: bool) -> Result<()> {
    let worker = state.worker();

    if once {
        let summary = worker
            .tick()
            .await
            .map_err(|e| anyhow::anyhow!("Failed to process due tasks: {e}"))?;
        let queued = state
            .runner
            .queue()
            .pending_count()
            .await
            .map_err(|e| anyhow::anyhow!("Failed to count queued tasks: {e}"))?;

        if json {
            let out = serde_json::json!({
                "claimed": summary.claimed,
                "resumed": summary.resumed,
                "discarded": summary.discarded,
                "released": summary.released,
                "dropped": summary.dropped,
                "queued": queued,
            });
            println!("{}", serde_json::to_string_pretty(&out)?);
        } else {
            println!();
            println!(
                "  {} {} due task(s): {} resumed, {} discarded, {} released, {} dropped",
                style("✓").green().bold(),
                summary.claimed,
                summary.resumed,
                summary.discarded,
                summary.released,
                summary.dropped
            );
            println!("  {}", style(format!("{queued} task(s) still queued")).dim());
            println!();
        }
        return Ok(());
    }

    let cancel = CancellationToken::new();
    let handle = {
        let cancel = cancel.clone();
        tokio::spawn(async move { worker.run(cancel).await })
    };

    eprintln!(
        "  {} Worker running. Press {} to stop.",
        style("▶").cyan().bold(),
        style("Ctrl-C").bold()
    );
    tokio::signal::ctrl_c().await?;
    cancel.cancel();
    handle.await?;
    eprintln!("  Worker stopped.");
    Ok(())
}
