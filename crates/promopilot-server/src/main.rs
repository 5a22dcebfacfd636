mod api;
mod middleware;
mod scheduler;

use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use promopilot_core::SystemClock;
use promopilot_engine::{EngineContext, EnginePolicy};
use promopilot_market::MarketClient;

use crate::{
    api::{build_app, AppState},
    middleware::{AuthState, RateLimitPolicy, RateLimitState},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
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

    let _scheduler = scheduler::build_scheduler(engine.clone(), &config).await?;

    let auth = AuthState::from_config(&config)?;
    let rate_limit = RateLimitState::new(RateLimitPolicy::default());
    let app = build_app(AppState { pool, engine }, auth, rate_limit);

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to listen for ctrl-c");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("received shutdown signal, starting graceful shutdown");
}
