mod commands;

use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use promopilot_core::SystemClock;
use promopilot_engine::{EngineContext, EnginePolicy, Worker};
use promopilot_market::MarketClient;

#[derive(Debug, Parser)]
#[command(name = "promopilot-cli")]
#[command(about = "Promopilot command line interface")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Score the catalog into a fresh suggestion batch.
    Suggest,
    /// Run one schedule tick: fire every due window edge now.
    Tick,
    /// Pull marketplace counters and fold them into the rollups.
    CollectMetrics,
    /// Generate new forecasts and reconcile elapsed ones.
    Predict,
    /// Print the newest suggestion batch, best score first.
    Suggestions,
    /// Print recent worker runs, newest first.
    Runs {
        #[arg(long, default_value_t = 20)]
        limit: i64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = promopilot_core::load_app_config()?;
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let pool_config = promopilot_db::PoolConfig::from_app_config(&config);
    let pool = promopilot_db::connect_pool(&config.database_url, pool_config).await?;
    promopilot_db::run_migrations(&pool).await?;

    let market = match config.market_base_url.as_deref() {
        Some(base_url) => {
            MarketClient::with_base_url(&config.market_token, config.market_timeout_secs, base_url)?
        }
        None => MarketClient::new(&config.market_token, config.market_timeout_secs)?,
    }
    .with_retry_policy(config.market_max_retries, config.market_backoff_base_ms);

    let engine = EngineContext::new(
        pool.clone(),
        Arc::new(market),
        Arc::new(SystemClock),
        EnginePolicy::from_app_config(&config),
    );

    match cli.command {
        Commands::Suggest => commands::run_worker_command(&engine, Worker::Suggest).await,
        Commands::Tick => commands::run_worker_command(&engine, Worker::ScheduleTick).await,
        Commands::CollectMetrics => {
            commands::run_worker_command(&engine, Worker::CollectMetrics).await
        }
        Commands::Predict => commands::run_worker_command(&engine, Worker::Predict).await,
        Commands::Suggestions => commands::show_suggestions(&pool, config.seller_id).await,
        Commands::Runs { limit } => commands::show_runs(&pool, limit).await,
    }
}
