//! Forecast records and their post-horizon reconciliation.
//!
//! A prediction row is written once when the forecast is made and completed
//! exactly once after its horizon elapses, when the observed rollups are
//! folded back in as actuals. The predictor never writes to campaigns or
//! schedules.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;

use crate::metrics::MetricTotals;
use crate::DbError;

/// A row in the `prediction_records` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PredictionRow {
    pub id: i64,
    pub campaign_id: i64,
    pub generated_at: DateTime<Utc>,
    pub horizon_days: i32,
    pub sample_days: i32,
    pub predicted_clicks: i64,
    pub predicted_impressions: i64,
    pub predicted_conversions: i64,
    pub predicted_sales_amount: Decimal,
    pub confidence: f64,
    pub actual_clicks: Option<i64>,
    pub actual_impressions: Option<i64>,
    pub actual_conversions: Option<i64>,
    pub actual_sales_amount: Option<Decimal>,
    pub accuracy: Option<f64>,
    pub reconciled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// A freshly generated forecast.
#[derive(Debug, Clone)]
pub struct NewPrediction {
    pub campaign_id: i64,
    pub generated_at: DateTime<Utc>,
    pub horizon_days: i32,
    pub sample_days: i32,
    pub predicted_clicks: i64,
    pub predicted_impressions: i64,
    pub predicted_conversions: i64,
    pub predicted_sales_amount: Decimal,
    pub confidence: f64,
}

/// Inserts a forecast record.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] on constraint violations or connection failure.
pub async fn insert_prediction(
    pool: &PgPool,
    new: &NewPrediction,
) -> Result<PredictionRow, DbError> {
    let row = sqlx::query_as::<_, PredictionRow>(
        "INSERT INTO prediction_records \
         (campaign_id, generated_at, horizon_days, sample_days, predicted_clicks, \
          predicted_impressions, predicted_conversions, predicted_sales_amount, confidence) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
         RETURNING id, campaign_id, generated_at, horizon_days, sample_days, \
                   predicted_clicks, predicted_impressions, predicted_conversions, \
                   predicted_sales_amount, confidence, actual_clicks, actual_impressions, \
                   actual_conversions, actual_sales_amount, accuracy, reconciled_at, created_at",
    )
    .bind(new.campaign_id)
    .bind(new.generated_at)
    .bind(new.horizon_days)
    .bind(new.sample_days)
    .bind(new.predicted_clicks)
    .bind(new.predicted_impressions)
    .bind(new.predicted_conversions)
    .bind(new.predicted_sales_amount)
    .bind(new.confidence)
    .fetch_one(pool)
    .await?;
    Ok(row)
}

/// Lists a campaign's forecasts, newest first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] on connection failure.
pub async fn list_predictions_for_campaign(
    pool: &PgPool,
    campaign_id: i64,
    limit: i64,
) -> Result<Vec<PredictionRow>, DbError> {
    let rows = sqlx::query_as::<_, PredictionRow>(
        "SELECT id, campaign_id, generated_at, horizon_days, sample_days, \
                predicted_clicks, predicted_impressions, predicted_conversions, \
                predicted_sales_amount, confidence, actual_clicks, actual_impressions, \
                actual_conversions, actual_sales_amount, accuracy, reconciled_at, created_at \
         FROM prediction_records \
         WHERE campaign_id = $1 \
         ORDER BY generated_at DESC, id DESC \
         LIMIT $2",
    )
    .bind(campaign_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// True when the campaign already has a forecast awaiting reconciliation.
/// Used to avoid stacking overlapping forecasts for the same campaign.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] on connection failure.
pub async fn has_open_prediction(pool: &PgPool, campaign_id: i64) -> Result<bool, DbError> {
    let exists: bool = sqlx::query_scalar(
        "SELECT EXISTS( \
            SELECT 1 FROM prediction_records \
            WHERE campaign_id = $1 AND reconciled_at IS NULL)",
    )
    .bind(campaign_id)
    .fetch_one(pool)
    .await?;
    Ok(exists)
}

/// Forecasts whose horizon has fully elapsed but which have not been
/// reconciled yet, oldest first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] on connection failure.
pub async fn list_due_reconciliations(
    pool: &PgPool,
    now: DateTime<Utc>,
) -> Result<Vec<PredictionRow>, DbError> {
    let rows = sqlx::query_as::<_, PredictionRow>(
        "SELECT id, campaign_id, generated_at, horizon_days, sample_days, \
                predicted_clicks, predicted_impressions, predicted_conversions, \
                predicted_sales_amount, confidence, actual_clicks, actual_impressions, \
                actual_conversions, actual_sales_amount, accuracy, reconciled_at, created_at \
         FROM prediction_records \
         WHERE reconciled_at IS NULL \
           AND generated_at + make_interval(days => horizon_days) <= $1 \
         ORDER BY generated_at ASC, id ASC",
    )
    .bind(now)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Stores the observed actuals and the accuracy score for a forecast.
///
/// Returns `false` when the record was already reconciled by someone else.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] on connection failure.
pub async fn reconcile_prediction(
    pool: &PgPool,
    id: i64,
    actual: &MetricTotals,
    accuracy: f64,
    reconciled_at: DateTime<Utc>,
) -> Result<bool, DbError> {
    let result = sqlx::query(
        "UPDATE prediction_records \
         SET actual_clicks = $2, actual_impressions = $3, actual_conversions = $4, \
             actual_sales_amount = $5, accuracy = $6, reconciled_at = $7 \
         WHERE id = $1 AND reconciled_at IS NULL",
    )
    .bind(id)
    .bind(actual.clicks)
    .bind(actual.impressions)
    .bind(actual.conversions)
    .bind(actual.sales_amount)
    .bind(accuracy)
    .bind(reconciled_at)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Non-expired campaigns with at least `min_days` daily rollup buckets, the
/// eligibility bar for generating a forecast.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] on connection failure.
pub async fn campaigns_with_min_history(
    pool: &PgPool,
    min_days: i64,
) -> Result<Vec<i64>, DbError> {
    let ids = sqlx::query_scalar::<_, i64>(
        "SELECT r.campaign_id \
         FROM metric_rollups r \
         JOIN campaigns c ON c.id = r.campaign_id \
         WHERE r.granularity = 'daily' AND c.state <> 'expired' \
         GROUP BY r.campaign_id \
         HAVING COUNT(*) >= $1 \
         ORDER BY r.campaign_id ASC",
    )
    .bind(min_days)
    .fetch_all(pool)
    .await?;
    Ok(ids)
}
