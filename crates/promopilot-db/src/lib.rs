//! Database access layer for promopilot.
//!
//! Owns the Postgres connection pool, the embedded migrations, and every SQL
//! statement in the workspace. Higher layers (engine, server, CLI) call the
//! functions re-exported at the bottom of this file and never hand-write SQL.

use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;

/// Workspace migrations, embedded at compile time.
///
/// The path is relative to this crate's root, so `"../../migrations"`
/// resolves to the `migrations/` directory at the workspace root.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("../../migrations");

/// Errors surfaced by the database layer.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("DATABASE_URL is not set")]
    MissingDatabaseUrl,

    #[error("row not found")]
    NotFound,

    #[error("worker run {id} is not in status '{expected_status}'")]
    InvalidWorkerRunTransition {
        id: i64,
        expected_status: &'static str,
    },

    #[error("refusing to record negative metric delta for campaign {campaign_id}")]
    NegativeDelta { campaign_id: i64 },

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),

    #[error(transparent)]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Connection pool tuning.
#[derive(Debug, Clone, Copy)]
pub struct PoolConfig {
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout_secs: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 10,
            min_connections: 1,
            acquire_timeout_secs: 10,
        }
    }
}

impl PoolConfig {
    /// Reads `PROMOPILOT_DB_*` overrides from the environment, falling back
    /// to the defaults for anything unset or unparseable.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_connections: read_u32("PROMOPILOT_DB_MAX_CONNECTIONS", defaults.max_connections),
            min_connections: read_u32("PROMOPILOT_DB_MIN_CONNECTIONS", defaults.min_connections),
            acquire_timeout_secs: read_u64(
                "PROMOPILOT_DB_ACQUIRE_TIMEOUT_SECS",
                defaults.acquire_timeout_secs,
            ),
        }
    }

    /// Builds pool settings from an already-parsed [`promopilot_core::AppConfig`].
    #[must_use]
    pub fn from_app_config(config: &promopilot_core::AppConfig) -> Self {
        Self {
            max_connections: config.db_max_connections,
            min_connections: config.db_min_connections,
            acquire_timeout_secs: config.db_acquire_timeout_secs,
        }
    }
}

fn read_u32(var: &str, default: u32) -> u32 {
    std::env::var(var)
        .ok()
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(default)
}

fn read_u64(var: &str, default: u64) -> u64 {
    std::env::var(var)
        .ok()
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(default)
}

/// Connects to Postgres with the given pool settings.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] when the pool cannot be established.
pub async fn connect_pool(database_url: &str, config: PoolConfig) -> Result<PgPool, DbError> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
        .connect(database_url)
        .await?;
    Ok(pool)
}

/// Connects using `DATABASE_URL` and `PROMOPILOT_DB_*` from the environment.
///
/// # Errors
///
/// Returns [`DbError::MissingDatabaseUrl`] when `DATABASE_URL` is unset, or
/// [`DbError::Sqlx`] when the connection fails.
pub async fn connect_pool_from_env() -> Result<PgPool, DbError> {
    let database_url = std::env::var("DATABASE_URL").map_err(|_| DbError::MissingDatabaseUrl)?;
    connect_pool(&database_url, PoolConfig::from_env()).await
}

/// Applies pending migrations and returns the total number recorded.
///
/// # Errors
///
/// Returns [`DbError::Migration`] when a migration fails to apply.
pub async fn run_migrations(pool: &PgPool) -> Result<i64, DbError> {
    MIGRATOR.run(pool).await?;
    let applied: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM _sqlx_migrations")
        .fetch_one(pool)
        .await?;
    Ok(applied)
}

/// Round-trips a trivial query to verify the pool is usable.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] when the query cannot be executed.
pub async fn health_check(pool: &PgPool) -> Result<(), DbError> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}

pub mod campaigns;
pub mod metrics;
pub mod predictions;
pub mod schedules;
pub mod suggestions;
pub mod worker_runs;

pub use campaigns::{
    create_campaign, delete_campaign, expire_due_campaigns, get_campaign,
    get_campaign_by_public_id, list_campaigns, set_campaign_state, update_campaign_config,
    CampaignRow, NewCampaign,
};
pub use metrics::{
    get_checkpoint, list_collectible_campaigns, list_rollups, record_observation,
    sum_rollups_between, upsert_checkpoint, CheckpointRow, MetricTotals, Observation, RollupRow,
};
pub use predictions::{
    campaigns_with_min_history, has_open_prediction, insert_prediction,
    list_due_reconciliations, list_predictions_for_campaign, reconcile_prediction, NewPrediction,
    PredictionRow,
};
pub use schedules::{
    create_schedule, delete_schedule, get_schedule, list_due_schedules,
    list_schedules_for_campaign, mark_schedule_escalated, mark_schedule_executed,
    mark_schedule_failed, mark_schedule_moot, moot_schedules_for_campaign, update_schedule,
    ScheduleRow, ScheduleSpec,
};
pub use suggestions::{
    get_suggestion, insert_suggestion, latest_suggestions, purge_suggestions_before,
    NewSuggestion, SuggestionRow,
};
pub use worker_runs::{
    complete_worker_run, create_worker_run, fail_worker_run, get_worker_run, list_worker_runs,
    start_worker_run, WorkerRunRow,
};
