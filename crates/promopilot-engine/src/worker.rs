//! Worker dispatch: audit rows, run-level mutual exclusion, and the shared
//! context every batch job runs against.
//!
//! Each worker type runs at most one instance at a time. The gate is an
//! in-process lock keyed by worker name; an overlapping trigger (cron firing
//! while an API-triggered run is still going) is refused with
//! [`EngineError::AlreadyRunning`] rather than queued, because every worker
//! re-derives its work from the database and the next tick covers whatever
//! the refused run would have done.

use std::sync::Arc;

use sqlx::PgPool;
use tokio::sync::Mutex;

use promopilot_core::{AppConfig, Clock};
use promopilot_db as db;
use promopilot_market::MarketClient;

use crate::error::EngineError;
use crate::{metrics, predict, schedule, suggest};

/// The four periodic batch jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Worker {
    Suggest,
    ScheduleTick,
    CollectMetrics,
    Predict,
}

impl Worker {
    /// Stable name stored in `worker_runs.worker`; also the exclusion key.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Worker::Suggest => "suggest",
            Worker::ScheduleTick => "schedule_tick",
            Worker::CollectMetrics => "collect_metrics",
            Worker::Predict => "predict",
        }
    }
}

impl std::fmt::Display for Worker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// What kicked a run off. Recorded on the audit row so a backlog of failed
/// runs can be traced to the cron loop, a dashboard button, or an operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerSource {
    Cron,
    Api,
    Cli,
}

impl TriggerSource {
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            TriggerSource::Cron => "cron",
            TriggerSource::Api => "api",
            TriggerSource::Cli => "cli",
        }
    }
}

/// One lock slot per worker type.
#[derive(Debug, Default)]
struct WorkerGate {
    suggest: Arc<Mutex<()>>,
    schedule_tick: Arc<Mutex<()>>,
    collect_metrics: Arc<Mutex<()>>,
    predict: Arc<Mutex<()>>,
}

impl WorkerGate {
    fn slot(&self, worker: Worker) -> &Arc<Mutex<()>> {
        match worker {
            Worker::Suggest => &self.suggest,
            Worker::ScheduleTick => &self.schedule_tick,
            Worker::CollectMetrics => &self.collect_metrics,
            Worker::Predict => &self.predict,
        }
    }
}

/// Tunables the workers read, lifted out of [`AppConfig`] so the engine
/// never touches raw environment configuration.
#[derive(Debug, Clone, Copy)]
pub struct EnginePolicy {
    pub seller_id: i64,
    /// Failed attempts per schedule edge before the engine gives up on the
    /// window and escalates.
    pub schedule_max_failures: i32,
    pub suggestion_retention_days: i64,
    /// How long an expired campaign keeps being polled for late counters.
    pub metrics_lookback_days: i64,
    pub prediction_horizon_days: i64,
    pub prediction_min_history_days: i64,
    /// Per-run wall-clock budget. Batches checkpoint between items and stop
    /// cleanly once the budget is spent; leftover work waits for the next
    /// tick.
    pub worker_deadline_secs: u64,
}

impl EnginePolicy {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            seller_id: config.seller_id,
            schedule_max_failures: config.schedule_max_failures,
            suggestion_retention_days: config.suggestion_retention_days,
            metrics_lookback_days: config.metrics_lookback_days,
            prediction_horizon_days: config.prediction_horizon_days,
            prediction_min_history_days: config.prediction_min_history_days,
            worker_deadline_secs: config.worker_deadline_secs,
        }
    }

    /// The run budget as a chrono duration. Clamped to a day so the
    /// seconds conversion cannot overflow on a nonsense configuration.
    pub(crate) fn worker_deadline(&self) -> chrono::Duration {
        let secs = self.worker_deadline_secs.min(86_400);
        chrono::Duration::seconds(i64::try_from(secs).unwrap_or(86_400))
    }
}

/// Everything a worker run needs. Cheap to clone; the cron scheduler and
/// API handlers each hold their own copy.
#[derive(Clone)]
pub struct EngineContext {
    pub pool: PgPool,
    pub market: Arc<MarketClient>,
    pub clock: Arc<dyn Clock>,
    pub policy: EnginePolicy,
    gate: Arc<WorkerGate>,
}

impl EngineContext {
    #[must_use]
    pub fn new(
        pool: PgPool,
        market: Arc<MarketClient>,
        clock: Arc<dyn Clock>,
        policy: EnginePolicy,
    ) -> Self {
        Self {
            pool,
            market,
            clock,
            policy,
            gate: Arc::new(WorkerGate::default()),
        }
    }
}

/// Per-run outcome counts, as stored on the `worker_runs` row.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Tally {
    pub processed: i32,
    pub failed: i32,
}

/// The recorded outcome of a completed worker run.
#[derive(Debug, Clone, Copy)]
pub struct WorkerReport {
    pub run_id: i64,
    pub items_processed: i32,
    pub items_failed: i32,
}

/// Runs one batch worker end to end: takes the run lock, writes the audit
/// row, executes the batch, and records the outcome.
///
/// # Errors
///
/// Returns [`EngineError::AlreadyRunning`] when a previous run of the same
/// worker still holds the lock, or the batch-fatal error the worker hit.
/// Per-item failures do not error; they land in the report's failure count.
pub async fn run_worker(
    ctx: &EngineContext,
    worker: Worker,
    trigger: TriggerSource,
) -> Result<WorkerReport, EngineError> {
    let Ok(_permit) = Arc::clone(ctx.gate.slot(worker)).try_lock_owned() else {
        return Err(EngineError::AlreadyRunning(worker.name()));
    };

    let run = db::create_worker_run(&ctx.pool, worker.name(), trigger.name()).await?;
    db::start_worker_run(&ctx.pool, run.id).await?;
    tracing::info!(
        run_id = run.id,
        worker = worker.name(),
        trigger = trigger.name(),
        "worker run started"
    );

    let outcome = match worker {
        Worker::Suggest => suggest::run_suggestion_refresh(ctx).await,
        Worker::ScheduleTick => schedule::run_schedule_tick(ctx).await,
        Worker::CollectMetrics => metrics::run_metrics_collection(ctx).await,
        Worker::Predict => predict::run_prediction_refresh(ctx).await,
    };

    match outcome {
        Ok(tally) => {
            db::complete_worker_run(&ctx.pool, run.id, tally.processed, tally.failed).await?;
            tracing::info!(
                run_id = run.id,
                worker = worker.name(),
                processed = tally.processed,
                failed = tally.failed,
                "worker run finished"
            );
            Ok(WorkerReport {
                run_id: run.id,
                items_processed: tally.processed,
                items_failed: tally.failed,
            })
        }
        Err(e) => {
            tracing::error!(run_id = run.id, worker = worker.name(), error = %e, "worker run failed");
            fail_run_best_effort(&ctx.pool, run.id, &e).await;
            Err(e)
        }
    }
}

/// Marking the run failed must not mask the original error.
async fn fail_run_best_effort(pool: &PgPool, run_id: i64, error: &EngineError) {
    if let Err(db_err) = db::fail_worker_run(pool, run_id, &error.to_string()).await {
        tracing::error!(run_id, error = %db_err, "could not record worker run failure");
    }
}
