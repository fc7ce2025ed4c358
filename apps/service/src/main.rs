use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{error, info};

use chainwatch_service::config::Config;
use chainwatch_service::database::{self, Database, DatabaseImpl};
use chainwatch_service::monitoring::{BatchRunner, ProbeExecutor, RunnerSettings, Scheduler};
use chainwatch_service::pool::open_pool;
use chainwatch_service::registry::{load_registry, sync_registry};

#[derive(Debug, Parser)]
#[command(version, about = "Health checks for Cosmos RPC and REST API endpoints")]
struct Cli {
    /// Config file (defaults to $XDG_CONFIG_HOME/chainwatch/config.toml)
    #[arg(long, short)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Clone, Copy, Subcommand)]
enum Command {
    /// Check endpoints every interval until interrupted
    Run,
    /// Run a single batch and exit
    Once,
    /// Sync the endpoint registry and exit
    Sync,
}

async fn sync(database: &dyn Database, config: &Config) -> Result<()> {
    let path = PathBuf::from(&config.registry.path);
    if let Some(registry) = load_registry(&path)? {
        sync_registry(database, &registry).await?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    logger::init_tracing();

    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Command::Run);

    let config = Config::load(cli.config.as_ref()).context("failed to load configuration")?;
    info!("{}", config);

    let pool = open_pool(&config.database.path, config.worker.max_concurrent_probes + 1)
        .await
        .with_context(|| format!("failed to open database {}", config.database.path))?;
    {
        let conn = pool.get().await?;
        database::initialize_database(&conn).await?;
    }
    let database: Arc<dyn Database> = Arc::new(DatabaseImpl::new_from_pool(pool));

    if matches!(command, Command::Sync) {
        return sync(database.as_ref(), &config).await;
    }

    if config.registry.sync_on_start {
        // A broken registry must not keep already known endpoints from being checked
        if let Err(e) = sync(database.as_ref(), &config).await {
            error!("Registry sync failed: {:#}", e);
        }
    }

    let executor = Arc::new(ProbeExecutor::new(config.worker.request_timeout())?);
    let settings = RunnerSettings {
        batch_limit: config.worker.batch_limit,
        max_concurrent_probes: config.worker.max_concurrent_probes,
    };
    let runner = Arc::new(BatchRunner::new(database, executor, settings));

    info!(
        "Starting chainwatch worker: interval={}s timeout={}s batch_limit={}",
        config.worker.check_interval_seconds, config.worker.request_timeout_seconds, config.worker.batch_limit
    );

    let scheduler = Scheduler::new(runner, config.worker.check_interval());

    match command {
        Command::Once => {
            scheduler.run_iteration().await;
        }
        _ => {
            scheduler
                .run_until(async {
                    if let Err(e) = tokio::signal::ctrl_c().await {
                        error!("Failed to listen for shutdown signal: {}", e);
                        std::future::pending::<()>().await;
                    }
                })
                .await;
        }
    }

    info!("Chainwatch worker stopped");
    Ok(())
}
