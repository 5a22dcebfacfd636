//! Weekly schedule rules and their execution bookkeeping.
//!
//! `next_execution` always points at the next window edge the tick should
//! honor. A failed attempt keeps it in place so the next tick retries; a
//! successful or mooted attempt advances it one week. The due scan joins
//! campaigns so rules belonging to expired campaigns never surface again.

use chrono::{DateTime, NaiveTime, Utc};
use sqlx::PgPool;

use crate::DbError;

/// A row in the `campaign_schedules` table. `day_of_week` is 0 = Monday
/// through 6 = Sunday, matching `promopilot_core::validate::weekday_index`.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ScheduleRow {
    pub id: i64,
    pub campaign_id: i64,
    pub day_of_week: i16,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub action: String,
    pub status: String,
    pub failure_count: i32,
    pub last_executed: Option<DateTime<Utc>>,
    pub next_execution: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The caller-computed shape of a schedule rule. `next_execution` comes from
/// the engine's window math, never from SQL.
#[derive(Debug, Clone)]
pub struct ScheduleSpec<'a> {
    pub day_of_week: i16,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub action: &'a str,
    pub next_execution: DateTime<Utc>,
}

/// Inserts a schedule rule in `pending` status.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] on constraint violations or connection failure.
pub async fn create_schedule(
    pool: &PgPool,
    campaign_id: i64,
    spec: &ScheduleSpec<'_>,
) -> Result<ScheduleRow, DbError> {
    let row = sqlx::query_as::<_, ScheduleRow>(
        "INSERT INTO campaign_schedules \
         (campaign_id, day_of_week, start_time, end_time, action, next_execution) \
         VALUES ($1, $2, $3, $4, $5, $6) \
         RETURNING id, campaign_id, day_of_week, start_time, end_time, action, status, \
                   failure_count, last_executed, next_execution, created_at, updated_at",
    )
    .bind(campaign_id)
    .bind(spec.day_of_week)
    .bind(spec.start_time)
    .bind(spec.end_time)
    .bind(spec.action)
    .bind(spec.next_execution)
    .fetch_one(pool)
    .await?;
    Ok(row)
}

/// Fetches a schedule by id.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] when no such schedule exists.
pub async fn get_schedule(pool: &PgPool, id: i64) -> Result<ScheduleRow, DbError> {
    sqlx::query_as::<_, ScheduleRow>(
        "SELECT id, campaign_id, day_of_week, start_time, end_time, action, status, \
                failure_count, last_executed, next_execution, created_at, updated_at \
         FROM campaign_schedules WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)
}

/// Lists a campaign's schedule rules in weekly order.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] on connection failure.
pub async fn list_schedules_for_campaign(
    pool: &PgPool,
    campaign_id: i64,
) -> Result<Vec<ScheduleRow>, DbError> {
    let rows = sqlx::query_as::<_, ScheduleRow>(
        "SELECT id, campaign_id, day_of_week, start_time, end_time, action, status, \
                failure_count, last_executed, next_execution, created_at, updated_at \
         FROM campaign_schedules \
         WHERE campaign_id = $1 \
         ORDER BY day_of_week ASC, start_time ASC, id ASC",
    )
    .bind(campaign_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Replaces a schedule rule. Execution bookkeeping restarts: status returns
/// to `pending` and the failure count resets, since the old attempts applied
/// to a rule that no longer exists.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] when no such schedule exists.
pub async fn update_schedule(
    pool: &PgPool,
    id: i64,
    spec: &ScheduleSpec<'_>,
) -> Result<ScheduleRow, DbError> {
    sqlx::query_as::<_, ScheduleRow>(
        "UPDATE campaign_schedules \
         SET day_of_week = $2, start_time = $3, end_time = $4, action = $5, \
             next_execution = $6, status = 'pending', failure_count = 0, updated_at = NOW() \
         WHERE id = $1 \
         RETURNING id, campaign_id, day_of_week, start_time, end_time, action, status, \
                   failure_count, last_executed, next_execution, created_at, updated_at",
    )
    .bind(id)
    .bind(spec.day_of_week)
    .bind(spec.start_time)
    .bind(spec.end_time)
    .bind(spec.action)
    .bind(spec.next_execution)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)
}

/// Deletes a schedule rule.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] on connection failure.
pub async fn delete_schedule(pool: &PgPool, id: i64) -> Result<bool, DbError> {
    let result = sqlx::query("DELETE FROM campaign_schedules WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Scans for schedules whose window edge has arrived, oldest edge first.
///
/// Schedules of expired campaigns are excluded here rather than retired row
/// by row; the join keeps dead campaigns from churning every tick.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] on connection failure.
pub async fn list_due_schedules(
    pool: &PgPool,
    now: DateTime<Utc>,
) -> Result<Vec<ScheduleRow>, DbError> {
    let rows = sqlx::query_as::<_, ScheduleRow>(
        "SELECT s.id, s.campaign_id, s.day_of_week, s.start_time, s.end_time, s.action, \
                s.status, s.failure_count, s.last_executed, s.next_execution, s.created_at, \
                s.updated_at \
         FROM campaign_schedules s \
         JOIN campaigns c ON c.id = s.campaign_id \
         WHERE s.next_execution <= $1 AND c.state <> 'expired' \
         ORDER BY s.next_execution ASC, s.id ASC",
    )
    .bind(now)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Records a successful execution and advances to the next weekly edge.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] on connection failure.
pub async fn mark_schedule_executed(
    pool: &PgPool,
    id: i64,
    executed_at: DateTime<Utc>,
    next_execution: DateTime<Utc>,
) -> Result<(), DbError> {
    sqlx::query(
        "UPDATE campaign_schedules \
         SET status = 'executed', last_executed = $2, next_execution = $3, \
             failure_count = 0, updated_at = NOW() \
         WHERE id = $1",
    )
    .bind(id)
    .bind(executed_at)
    .bind(next_execution)
    .execute(pool)
    .await?;
    Ok(())
}

/// Retires a due edge without running it. `last_executed` is left alone
/// because no action actually happened.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] on connection failure.
pub async fn mark_schedule_moot(
    pool: &PgPool,
    id: i64,
    next_execution: DateTime<Utc>,
) -> Result<(), DbError> {
    sqlx::query(
        "UPDATE campaign_schedules \
         SET status = 'executed', next_execution = $2, failure_count = 0, updated_at = NOW() \
         WHERE id = $1",
    )
    .bind(id)
    .bind(next_execution)
    .execute(pool)
    .await?;
    Ok(())
}

/// Records a failed attempt. `next_execution` stays put so the next tick
/// retries the same edge. Returns the new failure count.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] when no such schedule exists.
pub async fn mark_schedule_failed(pool: &PgPool, id: i64) -> Result<i32, DbError> {
    sqlx::query_scalar::<_, i32>(
        "UPDATE campaign_schedules \
         SET status = 'failed', failure_count = failure_count + 1, updated_at = NOW() \
         WHERE id = $1 \
         RETURNING failure_count",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)
}

/// Gives up on the current edge after repeated failures: the failure count
/// resets and the rule moves on to the next weekly occurrence.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] on connection failure.
pub async fn mark_schedule_escalated(
    pool: &PgPool,
    id: i64,
    next_execution: DateTime<Utc>,
) -> Result<(), DbError> {
    sqlx::query(
        "UPDATE campaign_schedules \
         SET status = 'failed', failure_count = 0, next_execution = $2, updated_at = NOW() \
         WHERE id = $1",
    )
    .bind(id)
    .bind(next_execution)
    .execute(pool)
    .await?;
    Ok(())
}

/// Marks every non-executed schedule of a campaign as executed. Used when a
/// campaign expires so its rules read as settled.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] on connection failure.
pub async fn moot_schedules_for_campaign(
    pool: &PgPool,
    campaign_id: i64,
) -> Result<u64, DbError> {
    let result = sqlx::query(
        "UPDATE campaign_schedules \
         SET status = 'executed', updated_at = NOW() \
         WHERE campaign_id = $1 AND status <> 'executed'",
    )
    .bind(campaign_id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}
