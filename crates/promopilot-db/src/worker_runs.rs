//! Worker run bookkeeping shared by the cron scheduler, the API, and the CLI.
//!
//! Every background pass (suggestion refresh, schedule tick, metrics poll,
//! prediction refresh) records a run row. Status moves strictly
//! queued -> running -> succeeded | failed; each transition is guarded by the
//! expected current status and a wrong-state write is a typed error, because
//! that always indicates a dispatcher bug rather than a data race.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::DbError;

/// A row in the `worker_runs` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct WorkerRunRow {
    pub id: i64,
    pub public_id: Uuid,
    pub worker: String,
    pub trigger_source: String,
    pub status: String,
    pub items_processed: Option<i32>,
    pub items_failed: Option<i32>,
    pub error: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Inserts a run in `queued` status and returns the stored row.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] on constraint violations or connection failure.
pub async fn create_worker_run(
    pool: &PgPool,
    worker: &str,
    trigger_source: &str,
) -> Result<WorkerRunRow, DbError> {
    let row = sqlx::query_as::<_, WorkerRunRow>(
        "INSERT INTO worker_runs (public_id, worker, trigger_source) \
         VALUES ($1, $2, $3) \
         RETURNING id, public_id, worker, trigger_source, status, items_processed, \
                   items_failed, error, started_at, completed_at, created_at",
    )
    .bind(Uuid::new_v4())
    .bind(worker)
    .bind(trigger_source)
    .fetch_one(pool)
    .await?;
    Ok(row)
}

/// Moves a run from `queued` to `running` and stamps `started_at`.
///
/// # Errors
///
/// Returns [`DbError::InvalidWorkerRunTransition`] when the run is not
/// currently queued (or does not exist).
pub async fn start_worker_run(pool: &PgPool, id: i64) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE worker_runs SET status = 'running', started_at = NOW() \
         WHERE id = $1 AND status = 'queued'",
    )
    .bind(id)
    .execute(pool)
    .await?;
    if result.rows_affected() == 0 {
        return Err(DbError::InvalidWorkerRunTransition {
            id,
            expected_status: "queued",
        });
    }
    Ok(())
}

/// Moves a run from `running` to `succeeded` with its item counts.
///
/// # Errors
///
/// Returns [`DbError::InvalidWorkerRunTransition`] when the run is not
/// currently running (or does not exist).
pub async fn complete_worker_run(
    pool: &PgPool,
    id: i64,
    items_processed: i32,
    items_failed: i32,
) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE worker_runs \
         SET status = 'succeeded', items_processed = $2, items_failed = $3, \
             completed_at = NOW() \
         WHERE id = $1 AND status = 'running'",
    )
    .bind(id)
    .bind(items_processed)
    .bind(items_failed)
    .execute(pool)
    .await?;
    if result.rows_affected() == 0 {
        return Err(DbError::InvalidWorkerRunTransition {
            id,
            expected_status: "running",
        });
    }
    Ok(())
}

/// Moves a run from `running` to `failed` with an error description.
///
/// # Errors
///
/// Returns [`DbError::InvalidWorkerRunTransition`] when the run is not
/// currently running (or does not exist).
pub async fn fail_worker_run(pool: &PgPool, id: i64, error: &str) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE worker_runs \
         SET status = 'failed', error = $2, completed_at = NOW() \
         WHERE id = $1 AND status = 'running'",
    )
    .bind(id)
    .bind(error)
    .execute(pool)
    .await?;
    if result.rows_affected() == 0 {
        return Err(DbError::InvalidWorkerRunTransition {
            id,
            expected_status: "running",
        });
    }
    Ok(())
}

/// Fetches a run by id.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] when no such run exists.
pub async fn get_worker_run(pool: &PgPool, id: i64) -> Result<WorkerRunRow, DbError> {
    sqlx::query_as::<_, WorkerRunRow>(
        "SELECT id, public_id, worker, trigger_source, status, items_processed, \
                items_failed, error, started_at, completed_at, created_at \
         FROM worker_runs WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)
}

/// Lists recent runs, newest first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] on connection failure.
pub async fn list_worker_runs(pool: &PgPool, limit: i64) -> Result<Vec<WorkerRunRow>, DbError> {
    let rows = sqlx::query_as::<_, WorkerRunRow>(
        "SELECT id, public_id, worker, trigger_source, status, items_processed, \
                items_failed, error, started_at, completed_at, created_at \
         FROM worker_runs \
         ORDER BY created_at DESC, id DESC \
         LIMIT $1",
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}
