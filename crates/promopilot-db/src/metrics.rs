//! Metric checkpoints, delta samples, and additive rollups.
//!
//! The engine normalizes cumulative marketplace counters into deltas; this
//! module persists one observation atomically: the raw sample, the hourly and
//! daily rollup buckets, the campaign lifetime accumulators, and the new
//! checkpoint all move in a single transaction. A partial write here would
//! double-count on the next poll, so nothing is committed piecemeal.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;

use crate::campaigns::CampaignRow;
use crate::DbError;

/// Last observed cumulative counters for a campaign.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CheckpointRow {
    pub campaign_id: i64,
    pub clicks: i64,
    pub impressions: i64,
    pub conversions: i64,
    pub sales_amount: Decimal,
    pub observed_at: DateTime<Utc>,
}

/// Additive counter totals over some window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, sqlx::FromRow)]
pub struct MetricTotals {
    pub clicks: i64,
    pub impressions: i64,
    pub conversions: i64,
    pub sales_amount: Decimal,
}

/// A normalized poll result, ready to persist. Bucket starts are computed by
/// the engine (UTC hour and day truncation of `collected_at`).
#[derive(Debug, Clone, Copy)]
pub struct Observation {
    pub collected_at: DateTime<Utc>,
    pub hour_bucket: DateTime<Utc>,
    pub day_bucket: DateTime<Utc>,
    pub delta: MetricTotals,
    pub counter_reset: bool,
    pub cumulative: MetricTotals,
}

/// A row in the `metric_rollups` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RollupRow {
    pub id: i64,
    pub campaign_id: i64,
    pub granularity: String,
    pub bucket_start: DateTime<Utc>,
    pub clicks: i64,
    pub impressions: i64,
    pub conversions: i64,
    pub sales_amount: Decimal,
    pub ctr: f64,
    pub conversion_rate: f64,
    pub updated_at: DateTime<Utc>,
}

/// Fetches the checkpoint for a campaign, if one has been recorded.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] on connection failure.
pub async fn get_checkpoint(
    pool: &PgPool,
    campaign_id: i64,
) -> Result<Option<CheckpointRow>, DbError> {
    let row = sqlx::query_as::<_, CheckpointRow>(
        "SELECT campaign_id, clicks, impressions, conversions, sales_amount, observed_at \
         FROM counter_checkpoints WHERE campaign_id = $1",
    )
    .bind(campaign_id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// Writes or refreshes the cumulative checkpoint for a campaign.
///
/// Accepts any executor so it can run standalone (a poll that produced no
/// delta) or inside the [`record_observation`] transaction.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] on connection failure.
pub async fn upsert_checkpoint<'e>(
    executor: impl sqlx::PgExecutor<'e>,
    campaign_id: i64,
    cumulative: &MetricTotals,
    observed_at: DateTime<Utc>,
) -> Result<(), DbError> {
    sqlx::query(
        "INSERT INTO counter_checkpoints \
         (campaign_id, clicks, impressions, conversions, sales_amount, observed_at) \
         VALUES ($1, $2, $3, $4, $5, $6) \
         ON CONFLICT (campaign_id) DO UPDATE SET \
           clicks = EXCLUDED.clicks, \
           impressions = EXCLUDED.impressions, \
           conversions = EXCLUDED.conversions, \
           sales_amount = EXCLUDED.sales_amount, \
           observed_at = EXCLUDED.observed_at",
    )
    .bind(campaign_id)
    .bind(cumulative.clicks)
    .bind(cumulative.impressions)
    .bind(cumulative.conversions)
    .bind(cumulative.sales_amount)
    .bind(observed_at)
    .execute(executor)
    .await?;
    Ok(())
}

/// Persists one normalized observation atomically: sample row, hourly and
/// daily rollups, campaign lifetime accumulators, and the new checkpoint.
///
/// # Errors
///
/// Returns [`DbError::NegativeDelta`] when any delta component is negative
/// (normalization upstream must have failed), or [`DbError::Sqlx`] when any
/// statement in the transaction fails.
pub async fn record_observation(
    pool: &PgPool,
    campaign_id: i64,
    observation: &Observation,
) -> Result<(), DbError> {
    let delta = &observation.delta;
    if delta.clicks < 0
        || delta.impressions < 0
        || delta.conversions < 0
        || delta.sales_amount < Decimal::ZERO
    {
        return Err(DbError::NegativeDelta { campaign_id });
    }

    let mut tx = pool.begin().await?;

    sqlx::query(
        "INSERT INTO metric_samples \
         (campaign_id, collected_at, clicks, impressions, conversions, sales_amount, \
          counter_reset) \
         VALUES ($1, $2, $3, $4, $5, $6, $7)",
    )
    .bind(campaign_id)
    .bind(observation.collected_at)
    .bind(delta.clicks)
    .bind(delta.impressions)
    .bind(delta.conversions)
    .bind(delta.sales_amount)
    .bind(observation.counter_reset)
    .execute(&mut *tx)
    .await?;

    upsert_rollup(&mut tx, campaign_id, "hourly", observation.hour_bucket, delta).await?;
    upsert_rollup(&mut tx, campaign_id, "daily", observation.day_bucket, delta).await?;

    sqlx::query(
        "UPDATE campaigns \
         SET total_clicks = total_clicks + $2, \
             total_impressions = total_impressions + $3, \
             total_conversions = total_conversions + $4, \
             total_sales_amount = total_sales_amount + $5, \
             updated_at = NOW() \
         WHERE id = $1",
    )
    .bind(campaign_id)
    .bind(delta.clicks)
    .bind(delta.impressions)
    .bind(delta.conversions)
    .bind(delta.sales_amount)
    .execute(&mut *tx)
    .await?;

    upsert_checkpoint(
        &mut *tx,
        campaign_id,
        &observation.cumulative,
        observation.collected_at,
    )
    .await?;

    tx.commit().await?;
    Ok(())
}

/// Adds a delta into one rollup bucket and recomputes the derived rates from
/// the bucket's new totals. Rates fall back to zero when the denominator is
/// zero.
async fn upsert_rollup(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    campaign_id: i64,
    granularity: &str,
    bucket_start: DateTime<Utc>,
    delta: &MetricTotals,
) -> Result<(), DbError> {
    sqlx::query(
        "INSERT INTO metric_rollups \
         (campaign_id, granularity, bucket_start, clicks, impressions, conversions, \
          sales_amount, ctr, conversion_rate) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, \
                 CASE WHEN $5 > 0 THEN $4::double precision / $5::double precision \
                      ELSE 0 END, \
                 CASE WHEN $4 > 0 THEN $6::double precision / $4::double precision \
                      ELSE 0 END) \
         ON CONFLICT (campaign_id, granularity, bucket_start) DO UPDATE SET \
           clicks = metric_rollups.clicks + EXCLUDED.clicks, \
           impressions = metric_rollups.impressions + EXCLUDED.impressions, \
           conversions = metric_rollups.conversions + EXCLUDED.conversions, \
           sales_amount = metric_rollups.sales_amount + EXCLUDED.sales_amount, \
           ctr = CASE WHEN metric_rollups.impressions + EXCLUDED.impressions > 0 \
                 THEN (metric_rollups.clicks + EXCLUDED.clicks)::double precision \
                      / (metric_rollups.impressions + EXCLUDED.impressions)::double precision \
                 ELSE 0 END, \
           conversion_rate = CASE WHEN metric_rollups.clicks + EXCLUDED.clicks > 0 \
                 THEN (metric_rollups.conversions + EXCLUDED.conversions)::double precision \
                      / (metric_rollups.clicks + EXCLUDED.clicks)::double precision \
                 ELSE 0 END, \
           updated_at = NOW()",
    )
    .bind(campaign_id)
    .bind(granularity)
    .bind(bucket_start)
    .bind(delta.clicks)
    .bind(delta.impressions)
    .bind(delta.conversions)
    .bind(delta.sales_amount)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// Lists rollup buckets for a campaign at one granularity, newest first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] on connection failure.
pub async fn list_rollups(
    pool: &PgPool,
    campaign_id: i64,
    granularity: &str,
    limit: i64,
) -> Result<Vec<RollupRow>, DbError> {
    let rows = sqlx::query_as::<_, RollupRow>(
        "SELECT id, campaign_id, granularity, bucket_start, clicks, impressions, conversions, \
                sales_amount, ctr, conversion_rate, updated_at \
         FROM metric_rollups \
         WHERE campaign_id = $1 AND granularity = $2 \
         ORDER BY bucket_start DESC \
         LIMIT $3",
    )
    .bind(campaign_id)
    .bind(granularity)
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Sums the daily rollups in `[from, to)` for one campaign. Missing buckets
/// contribute nothing, so a sparse history sums cleanly.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] on connection failure.
pub async fn sum_rollups_between(
    pool: &PgPool,
    campaign_id: i64,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> Result<MetricTotals, DbError> {
    let totals = sqlx::query_as::<_, MetricTotals>(
        "SELECT COALESCE(SUM(clicks), 0)::bigint AS clicks, \
                COALESCE(SUM(impressions), 0)::bigint AS impressions, \
                COALESCE(SUM(conversions), 0)::bigint AS conversions, \
                COALESCE(SUM(sales_amount), 0) AS sales_amount \
         FROM metric_rollups \
         WHERE campaign_id = $1 AND granularity = 'daily' \
           AND bucket_start >= $2 AND bucket_start < $3",
    )
    .bind(campaign_id)
    .bind(from)
    .bind(to)
    .fetch_one(pool)
    .await?;
    Ok(totals)
}

/// Campaigns worth polling for counters: anything live, plus campaigns that
/// expired recently enough that their final counters may still move.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] on connection failure.
pub async fn list_collectible_campaigns(
    pool: &PgPool,
    expired_after: DateTime<Utc>,
) -> Result<Vec<CampaignRow>, DbError> {
    let rows = sqlx::query_as::<_, CampaignRow>(
        "SELECT id, public_id, seller_id, item_id, campaign_name, discount_percentage, \
                timezone, start_date, end_date, state, state_source, state_updated_at, \
                total_clicks, total_impressions, total_conversions, total_sales_amount, \
                created_at, updated_at \
         FROM campaigns \
         WHERE state IN ('active', 'paused') \
            OR (state = 'expired' AND end_date > $1) \
         ORDER BY id ASC",
    )
    .bind(expired_after)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}
