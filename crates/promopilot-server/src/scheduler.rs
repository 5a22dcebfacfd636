//! Background job scheduler.
//!
//! Initialises a [`JobScheduler`] at server startup and registers the four
//! recurring worker jobs. Job bodies never propagate errors: a failed run is
//! logged and the next fire starts clean, because every worker re-derives
//! its work from the database.

use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};

use promopilot_core::AppConfig;
use promopilot_engine::{run_worker, EngineContext, EngineError, TriggerSource, Worker};

/// Builds and starts the background job scheduler.
///
/// Registers all recurring worker jobs and starts the scheduler. Returns
/// the running [`JobScheduler`] handle, which the caller must keep alive
/// for the lifetime of the process; dropping it shuts down all jobs.
///
/// # Errors
///
/// Returns [`JobSchedulerError`] if the scheduler cannot be initialised,
/// a job cannot be registered, or the scheduler fails to start.
pub async fn build_scheduler(
    engine: EngineContext,
    config: &AppConfig,
) -> Result<JobScheduler, JobSchedulerError> {
    let scheduler = JobScheduler::new().await?;

    register_worker_job(
        &scheduler,
        engine.clone(),
        Worker::ScheduleTick,
        &config.schedule_tick_cron,
    )
    .await?;
    register_worker_job(
        &scheduler,
        engine.clone(),
        Worker::CollectMetrics,
        &config.metrics_cron,
    )
    .await?;
    register_worker_job(&scheduler, engine.clone(), Worker::Suggest, &config.suggest_cron)
        .await?;
    register_worker_job(&scheduler, engine, Worker::Predict, &config.predict_cron).await?;

    scheduler.start().await?;
    Ok(scheduler)
}

async fn register_worker_job(
    scheduler: &JobScheduler,
    engine: EngineContext,
    worker: Worker,
    cron: &str,
) -> Result<(), JobSchedulerError> {
    let job = Job::new_async(cron, move |_uuid, _lock| {
        let engine = engine.clone();

        Box::pin(async move {
            match run_worker(&engine, worker, TriggerSource::Cron).await {
                Ok(report) => {
                    tracing::info!(
                        worker = worker.name(),
                        run_id = report.run_id,
                        processed = report.items_processed,
                        failed = report.items_failed,
                        "scheduler: worker run complete"
                    );
                }
                Err(EngineError::AlreadyRunning(_)) => {
                    tracing::info!(
                        worker = worker.name(),
                        "scheduler: previous run still active; skipping this fire"
                    );
                }
                Err(e) => {
                    tracing::error!(worker = worker.name(), error = %e, "scheduler: worker run failed");
                }
            }
        })
    })?;

    scheduler.add(job).await?;
    Ok(())
}
