//! Loanflow CLI and REST API entry point.
//!
//! Binary name: `loanflow`
//!
//! Parses CLI arguments, initializes logging, the database, and the workflow
//! runtime, then dispatches to a command handler or starts the REST API server.

mod cli;
mod http;
mod state;

use std::time::Duration;

use clap::Parser;
use clap_complete::generate;
use loanflow_observe::{LogFormat, TracingOptions, init_tracing, shutdown_tracing};

use cli::{Cli, Commands};
use state::AppState;

/// How long in-flight runs get to reach a checkpoint on exit.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Shell completions don't need logging or app state
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = <Cli as clap::CommandFactory>::command();
        generate(*shell, &mut cmd, "loanflow", &mut std::io::stdout());
        return Ok(());
    }

    let tracing_options = TracingOptions {
        format: if cli.log_json {
            LogFormat::Json
        } else {
            LogFormat::Pretty
        },
        default_directive: TracingOptions::directive_for(cli.verbose, cli.quiet).to_string(),
        enable_otel: cli.otel,
    };
    if let Err(e) = init_tracing(&tracing_options) {
        eprintln!("Warning: failed to initialize tracing: {e}");
    }

    let state = AppState::init().await?;
    let result = run_command(&state, cli).await;

    state.runtime.shutdown(SHUTDOWN_GRACE).await;
    state.db_pool.close().await;
    shutdown_tracing();
    result
}

async fn run_command(state: &AppState, cli: Cli) -> anyhow::Result<()> {
    let json = cli.json;

    match cli.command {
        Commands::Submit {
            application_id,
            name,
            email,
            phone,
            amount,
            purpose,
            income,
            run_id,
            detach,
        } => {
            let application = cli::loan::application_from_flags(
                application_id,
                name,
                email,
                phone,
                amount,
                purpose,
                income,
            );
            cli::loan::submit(state, application, run_id, detach, json).await?;
        }

        Commands::Approve { run_id } => {
            cli::loan::approve(state, run_id, json).await?;
        }

        Commands::Send {
            run_id,
            topic,
            payload,
        } => {
            cli::run::send(state, run_id, &topic, cli::parse_payload(&payload), json).await?;
        }

        Commands::Result {
            run_id,
            timeout_secs,
        } => {
            cli::run::result(state, run_id, timeout_secs, json).await?;
        }

        Commands::Status { run_id } => {
            cli::run::status(state, run_id, json).await?;
        }

        Commands::Steps { run_id } => {
            cli::run::steps(state, run_id, json).await?;
        }

        Commands::Runs { limit } => {
            cli::run::list(state, limit, json).await?;
        }

        Commands::Loan { application_id } => {
            cli::loan::show(state, &application_id, json).await?;
        }

        Commands::Resume { timeout_secs } => {
            cli::run::resume(state, timeout_secs, json).await?;
        }

        Commands::Serve { port, host } => {
            serve(state, &host, port, cli.quiet).await?;
        }

        Commands::Completions { .. } => unreachable!("handled above"),
    }

    Ok(())
}

async fn serve(state: &AppState, host: &str, port: u16, quiet: bool) -> anyhow::Result<()> {
    let resumed = state.runtime.resume_incomplete().await?;
    if resumed > 0 {
        tracing::info!(resumed, "resumed incomplete runs");
    }

    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    if !quiet {
        println!(
            "  {} {} API listening on {}",
            console::style("⚡").bold(),
            state.config.application_name,
            console::style(format!("http://{addr}")).cyan()
        );
        println!("  {}", console::style("Press Ctrl+C to stop").dim());
    }

    let router = http::router::build_router(state.clone());

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if !quiet {
        println!("\n  Server stopped.");
    }
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {e}");
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
                tracing::error!("failed to install SIGTERM handler: {e}");
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
