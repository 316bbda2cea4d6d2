use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use tokio::sync::watch;
use tracing::{info, warn};

use toto_settler::{
    clock::SystemClock, config::WorkerConfig, init_tracing, metrics::MetricsCollector,
    orchestrator::Orchestrator, pocketbase::PocketBaseClient,
};

#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Lock, settle and score on every poll interval until interrupted
    Run,
    /// Run a single cycle and exit
    Once,
}

async fn shutdown_signal(tx: watch::Sender<bool>) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("failed to listen for ctrl-c: {}", e);
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
                warn!("failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received ctrl-c"),
        _ = terminate => info!("received SIGTERM"),
    }

    let _ = tx.send(true);
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let config = WorkerConfig::from_env().context("Invalid worker configuration")?;

    let metrics = MetricsCollector::new();
    let client = PocketBaseClient::new(&config.service, &config.rate_limits, metrics.clone())?;
    let mut worker = Orchestrator::new(client, SystemClock, config.service.credentials(), metrics)
        .with_session_ttl(config.service.session_ttl());

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Once => {
            let report = worker.run_cycle().await;
            if report.skipped_for_auth {
                warn!("cycle skipped, data service rejected the configured credentials");
            }
        }
        Commands::Run => {
            let (tx, rx) = watch::channel(false);
            tokio::spawn(shutdown_signal(tx));

            info!(base_url = %config.service.base_url, "starting settlement worker");
            worker.run(config.schedule.poll_interval(), rx).await;
        }
    }

    Ok(())
}
