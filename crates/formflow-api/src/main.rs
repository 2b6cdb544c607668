//! Formflow CLI and REST API entry point.
//!
//! Binary name: `formflow`
//!
//! Parses CLI arguments, initializes tracing, the database and services,
//! then dispatches to the appropriate command handler or starts the REST
//! API server.

mod cli;
mod http;
mod state;

use clap::Parser;
use formflow_observe::{TracingOptions, init_tracing, shutdown_tracing};

use cli::{Cli, Commands};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Serve logs at info by default; one-shot commands stay quiet.
    let verbosity = match cli.command {
        Commands::Serve { .. } => cli.verbose.max(1),
        _ => cli.verbose,
    };
    let tracing_options = TracingOptions {
        enable_otel: cli.otel,
        ..TracingOptions::from_verbosity(verbosity)
    };
    init_tracing(&tracing_options).map_err(|e| anyhow::anyhow!("failed to init tracing: {e}"))?;

    // Initialize application state (config, DB, services)
    let state = AppState::init().await?;

    let result = run(&state, cli).await;

    state.db_pool.close().await;
    shutdown_tracing();
    result
}

async fn run(state: &AppState, cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Serve { port, host } => {
            let host = host.unwrap_or_else(|| state.config.server.host.clone());
            let port = port.unwrap_or(state.config.server.port);
            let addr = format!("{host}:{port}");
            let listener = tokio::net::TcpListener::bind(&addr).await?;

            println!(
                "  {} Formflow API listening on {}",
                console::style("⚡").bold(),
                console::style(format!("http://{addr}")).cyan()
            );
            println!(
                "  {}",
                console::style(format!("Data directory: {}", state.data_dir.display())).dim()
            );
            println!("  {}", console::style("Press Ctrl+C to stop").dim());

            let router = http::router::build_router(state.clone());

            axum::serve(listener, router)
                .with_graceful_shutdown(shutdown_signal())
                .await?;

            let in_flight = state.engine.active_runs();
            if in_flight > 0 {
                tracing::warn!(in_flight, "shutting down with runs still in flight");
            }
            println!("\n  Server stopped.");
        }

        Commands::Trigger {
            automation_id,
            data,
        } => {
            cli::automation::trigger(state, automation_id, data.as_deref(), cli.json).await?;
        }

        Commands::TestWebhook { webhook_id, data } => {
            cli::webhook::test_webhook(state, webhook_id, data.as_deref(), cli.json).await?;
        }

        Commands::Executions {
            automation_id,
            limit,
        } => {
            cli::automation::list_executions(state, automation_id, limit, cli.json).await?;
        }

        Commands::Events {
            limit,
            event_type,
            search,
        } => {
            cli::event::list_events(state, limit, event_type, search, cli.json).await?;
        }
    }

    Ok(())
}

/// Wait for Ctrl+C or SIGTERM for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
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
