//! Leadflow CLI and REST API entry point.
//!
//! Binary name: `leadflow`
//!
//! Parses CLI arguments, initializes database and services, then dispatches
//! to the appropriate command handler or starts the REST API server.

mod cli;
mod http;
mod state;

use clap::Parser;
use clap_complete::generate;
use tokio_util::sync::CancellationToken;

use cli::{Cli, Commands};
use leadflow_observe::tracing_setup::{LogFormat, init_tracing, shutdown_tracing};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Shell completions don't need app state
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = <Cli as clap::CommandFactory>::command();
        generate(*shell, &mut cmd, "leadflow", &mut std::io::stdout());
        return Ok(());
    }

    let format = if cli.log_json {
        LogFormat::Json
    } else {
        LogFormat::Pretty
    };
    init_tracing(cli::log_filter(cli.verbose, cli.quiet), format, cli.otel)
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {e}"))?;

    let result = dispatch(cli).await;
    shutdown_tracing();
    result
}

async fn dispatch(cli: Cli) -> anyhow::Result<()> {
    let state = AppState::init().await?;
    let json = cli.json;

    match cli.command {
        Commands::Flow { action } => {
            cli::flow::handle_flow_command(action, &state, json).await?;
        }

        Commands::Run { flow_id, contact } => {
            cli::run::run_flow(&state, flow_id, contact, json).await?;
        }

        Commands::Submit { contact } => {
            cli::run::submit(&state, contact, json).await?;
        }

        Commands::Executions { action } => {
            cli::execution::handle_executions_command(action, &state, json).await?;
        }

        Commands::Worker { once } => {
            cli::worker::run_worker(&state, once, json).await?;
        }

        Commands::Serve {
            port,
            host,
            no_worker,
        } => {
            let host = host.unwrap_or_else(|| state.config.server.host.clone());
            let port = port.unwrap_or(state.config.server.port);
            let addr = format!("{host}:{port}");
            let listener = tokio::net::TcpListener::bind(&addr).await?;

            let cancel = CancellationToken::new();
            let worker = (!no_worker).then(|| {
                let worker = state.worker();
                let cancel = cancel.clone();
                tokio::spawn(async move { worker.run(cancel).await })
            });

            println!(
                "  {} Leadflow API listening on {}",
                console::style("⚡").bold(),
                console::style(format!("http://{addr}")).cyan()
            );
            if worker.is_none() {
                println!(
                    "  {}",
                    console::style("Resumption worker disabled (--no-worker)").yellow()
                );
            }
            println!("  {}", console::style("Press Ctrl+C to stop").dim());

            let router = http::router::build_router(state);

            axum::serve(listener, router)
                .with_graceful_shutdown(shutdown_signal())
                .await?;

            cancel.cancel();
            if let Some(handle) = worker {
                handle.await?;
            }

            println!("\n  Server stopped.");
        }

        Commands::Completions { .. } => unreachable!("handled above"),
    }

    Ok(())
}

/// Wait for Ctrl+C or SIGTERM for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl+C");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
