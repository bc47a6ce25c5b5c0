use anyhow::{Context, Result};
use chain_metrics_collector::config::Config;
use chain_metrics_collector::query::commands::seed_targets;
use chain_metrics_collector::repository::{Database, TargetRepository};
use chain_metrics_collector::rpc::RpcClient;
use chain_metrics_collector::scheduler::{PollScheduler, SweepReport};
use clap::Parser;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "collector")]
#[command(about = "Poll chain RPC endpoints and record block metrics", long_about = None)]
struct Cli {
    /// Override DATABASE_URL
    #[arg(long)]
    database_url: Option<String>,

    /// Override POLL_INTERVAL_SECS
    #[arg(long)]
    interval_secs: Option<u64>,

    /// Run a single sweep and exit
    #[arg(long, default_value = "false")]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let mut config = Config::from_env().context("failed to load configuration")?;
    if let Some(database_url) = cli.database_url {
        config.database_url = database_url;
    }
    if let Some(secs) = cli.interval_secs {
        if secs == 0 {
            anyhow::bail!("--interval-secs must be greater than zero");
        }
        config.settings.poll_interval = Duration::from_secs(secs);
    }

    info!("Starting chain metrics collector");

    let db = Database::new(&config.database_url)?;
    info!("Database initialized");

    if !config.seed_targets.is_empty() {
        let seeded = seed_targets(&TargetRepository::new(&db.conn), &config.seed_targets)?;
        info!("Registered {} target(s) from POLL_TARGETS", seeded);
    }

    let client = RpcClient::new(config.settings.block_timeout, config.settings.logs_timeout);
    let scheduler = PollScheduler::new(client, db, config.settings.clone());

    if cli.once {
        return match scheduler.sweep().await {
            SweepReport::Completed(summary) => {
                let failed = summary.targets.iter().filter(|t| !t.succeeded()).count();
                info!(
                    "Sweep finished in {:?}: {} target(s), {} failed",
                    summary.elapsed,
                    summary.targets.len(),
                    failed
                );
                Ok(())
            }
            SweepReport::RegistryUnavailable(e) => {
                error!("Could not list targets: {}", e);
                Err(e.into())
            }
            SweepReport::Skipped => Ok(()),
        };
    }

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => info!("Shutdown requested, finishing current sweep"),
                Err(e) => warn!("Failed to listen for shutdown signal: {}", e),
            }
            cancel.cancel();
        }
    });

    scheduler.run(cancel).await;

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();
}
