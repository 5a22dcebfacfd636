//! Performance forecasting over daily rollup history.
//!
//! Two passes per run, reconcile before generate. Reconciliation folds
//! observed rollups back into forecasts whose horizon has elapsed and
//! scores how close they came. Generation projects per-metric daily means
//! over the horizon for every campaign with enough history, with a
//! confidence score that shrinks as the history gets noisier. The
//! predictor reads campaigns and rollups but never writes either; its only
//! output is `prediction_records`.

use chrono::Duration;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;

use promopilot_db::{self as db, MetricTotals, NewPrediction, PredictionRow, RollupRow};

use crate::error::EngineError;
use crate::worker::{EngineContext, Tally};

/// Floor for the accuracy denominator so near-zero actuals do not blow the
/// relative error up to infinity.
const ACCURACY_EPSILON: f64 = 1.0;

/// Mean and coefficient of variation of a series. CV uses the population
/// standard deviation and collapses to zero when the mean is not positive,
/// since relative spread is meaningless around zero.
#[allow(clippy::cast_precision_loss)]
pub(crate) fn series_stats(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    if mean <= 0.0 {
        return (mean, 0.0);
    }
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, variance.sqrt() / mean)
}

/// Sample-count factor times variance factor, both in [0,1]. More history
/// raises confidence up to the policy bar; more relative spread always
/// lowers it.
#[allow(clippy::cast_precision_loss)]
pub(crate) fn confidence_score(sample_days: i64, min_history_days: i64, cv: f64) -> f64 {
    if sample_days <= 0 {
        return 0.0;
    }
    let sample_factor = if min_history_days <= 0 {
        1.0
    } else {
        (sample_days as f64 / min_history_days as f64).min(1.0)
    };
    sample_factor * (1.0 / (1.0 + cv.max(0.0)))
}

/// How close a prediction landed, as `1 - relative_error` clamped to [0,1].
/// An actual of zero scores against [`ACCURACY_EPSILON`] instead, so a
/// zero-zero pair is a perfect hit rather than a division by zero.
pub(crate) fn accuracy_score(predicted: f64, actual: f64) -> f64 {
    let scale = actual.abs().max(ACCURACY_EPSILON);
    (1.0 - (predicted - actual).abs() / scale).clamp(0.0, 1.0)
}

/// Mean accuracy across the four forecast metrics.
#[allow(clippy::cast_precision_loss)]
pub(crate) fn reconciliation_accuracy(prediction: &PredictionRow, actual: &MetricTotals) -> f64 {
    let scores = [
        accuracy_score(prediction.predicted_clicks as f64, actual.clicks as f64),
        accuracy_score(
            prediction.predicted_impressions as f64,
            actual.impressions as f64,
        ),
        accuracy_score(
            prediction.predicted_conversions as f64,
            actual.conversions as f64,
        ),
        accuracy_score(
            prediction.predicted_sales_amount.to_f64().unwrap_or(0.0),
            actual.sales_amount.to_f64().unwrap_or(0.0),
        ),
    ];
    scores.iter().sum::<f64>() / scores.len() as f64
}

/// A projected horizon total per metric, plus how trustworthy it is.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Forecast {
    pub clicks: i64,
    pub impressions: i64,
    pub conversions: i64,
    pub sales_amount: Decimal,
    pub confidence: f64,
    pub sample_days: i32,
}

#[allow(clippy::cast_possible_truncation)]
fn project(daily_mean: f64, horizon: f64) -> i64 {
    (daily_mean * horizon).round() as i64
}

/// Projects per-metric daily means over the horizon. `None` when there is
/// no history to project from or the sales series does not convert.
#[allow(clippy::cast_precision_loss)]
pub(crate) fn forecast_from_history(
    history: &[RollupRow],
    horizon_days: i64,
    min_history_days: i64,
) -> Option<Forecast> {
    if history.is_empty() {
        return None;
    }

    let clicks: Vec<f64> = history.iter().map(|r| r.clicks as f64).collect();
    let impressions: Vec<f64> = history.iter().map(|r| r.impressions as f64).collect();
    let conversions: Vec<f64> = history.iter().map(|r| r.conversions as f64).collect();
    let sales: Vec<f64> = history
        .iter()
        .map(|r| r.sales_amount.to_f64())
        .collect::<Option<Vec<_>>>()?;

    let (clicks_mean, clicks_cv) = series_stats(&clicks);
    let (impressions_mean, impressions_cv) = series_stats(&impressions);
    let (conversions_mean, conversions_cv) = series_stats(&conversions);
    let (sales_mean, sales_cv) = series_stats(&sales);

    let cv = (clicks_cv + impressions_cv + conversions_cv + sales_cv) / 4.0;
    let sample_days = i64::try_from(history.len()).unwrap_or(i64::MAX);
    let confidence = confidence_score(sample_days, min_history_days, cv);

    let horizon = horizon_days.max(0) as f64;
    Some(Forecast {
        clicks: project(clicks_mean, horizon),
        impressions: project(impressions_mean, horizon),
        conversions: project(conversions_mean, horizon),
        sales_amount: Decimal::from_f64(sales_mean * horizon)?.round_dp(2),
        confidence,
        sample_days: i32::try_from(history.len()).unwrap_or(i32::MAX),
    })
}

/// One prediction pass: settle elapsed forecasts, then issue new ones.
pub(crate) async fn run_prediction_refresh(ctx: &EngineContext) -> Result<Tally, EngineError> {
    let now = ctx.clock.now();
    let deadline = now + ctx.policy.worker_deadline();
    let mut tally = Tally::default();

    // Pass 1: reconcile. Forecasts settle against what the rollups actually
    // recorded over [generated_at, generated_at + horizon).
    let due = db::list_due_reconciliations(&ctx.pool, now).await?;
    if !due.is_empty() {
        tracing::info!(due = due.len(), "reconciling elapsed forecasts");
    }
    for prediction in &due {
        if ctx.clock.now() >= deadline {
            tracing::warn!("prediction run stopped at the run deadline during reconciliation");
            return Ok(tally);
        }
        let Some(horizon_end) = prediction
            .generated_at
            .checked_add_signed(Duration::days(i64::from(prediction.horizon_days)))
        else {
            tracing::error!(prediction_id = prediction.id, horizon_days = prediction.horizon_days, "horizon does not resolve to a valid instant; record skipped");
            tally.failed += 1;
            continue;
        };
        let actual = match db::sum_rollups_between(
            &ctx.pool,
            prediction.campaign_id,
            prediction.generated_at,
            horizon_end,
        )
        .await
        {
            Ok(actual) => actual,
            Err(e) => {
                tracing::warn!(prediction_id = prediction.id, error = %e, "actuals query failed; reconciliation retries next run");
                tally.failed += 1;
                continue;
            }
        };
        let accuracy = reconciliation_accuracy(prediction, &actual);
        match db::reconcile_prediction(&ctx.pool, prediction.id, &actual, accuracy, now).await {
            Ok(true) => {
                tracing::info!(
                    prediction_id = prediction.id,
                    campaign_id = prediction.campaign_id,
                    accuracy,
                    "forecast reconciled"
                );
                tally.processed += 1;
            }
            Ok(false) => {
                tracing::debug!(prediction_id = prediction.id, "forecast already reconciled concurrently");
            }
            Err(e) => {
                tracing::warn!(prediction_id = prediction.id, error = %e, "reconciliation write failed");
                tally.failed += 1;
            }
        }
    }

    // Pass 2: generate. One open forecast per campaign at a time; a new one
    // only goes out once the previous has been reconciled.
    let eligible =
        db::campaigns_with_min_history(&ctx.pool, ctx.policy.prediction_min_history_days).await?;
    for campaign_id in eligible {
        if ctx.clock.now() >= deadline {
            tracing::warn!("prediction run stopped at the run deadline during generation");
            break;
        }
        match db::has_open_prediction(&ctx.pool, campaign_id).await {
            Ok(true) => {
                tracing::debug!(campaign_id, "forecast already open; skipping");
                continue;
            }
            Ok(false) => {}
            Err(e) => {
                tracing::warn!(campaign_id, error = %e, "open-forecast check failed; campaign skipped");
                tally.failed += 1;
                continue;
            }
        }
        let history = match db::list_rollups(
            &ctx.pool,
            campaign_id,
            "daily",
            ctx.policy.prediction_min_history_days,
        )
        .await
        {
            Ok(history) => history,
            Err(e) => {
                tracing::warn!(campaign_id, error = %e, "history query failed; campaign skipped");
                tally.failed += 1;
                continue;
            }
        };
        let Some(forecast) = forecast_from_history(
            &history,
            ctx.policy.prediction_horizon_days,
            ctx.policy.prediction_min_history_days,
        ) else {
            tracing::warn!(campaign_id, "history did not produce a forecast; campaign skipped");
            tally.failed += 1;
            continue;
        };

        let new = NewPrediction {
            campaign_id,
            generated_at: now,
            horizon_days: i32::try_from(ctx.policy.prediction_horizon_days).unwrap_or(i32::MAX),
            sample_days: forecast.sample_days,
            predicted_clicks: forecast.clicks,
            predicted_impressions: forecast.impressions,
            predicted_conversions: forecast.conversions,
            predicted_sales_amount: forecast.sales_amount,
            confidence: forecast.confidence,
        };
        match db::insert_prediction(&ctx.pool, &new).await {
            Ok(row) => {
                tracing::info!(
                    campaign_id,
                    prediction_id = row.id,
                    confidence = row.confidence,
                    sample_days = row.sample_days,
                    "forecast generated"
                );
                tally.processed += 1;
            }
            Err(e) => {
                tracing::warn!(campaign_id, error = %e, "forecast insert failed");
                tally.failed += 1;
            }
        }
    }

    Ok(tally)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};

    const EPS: f64 = 1e-12;

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, day, 0, 0, 0).unwrap()
    }

    fn daily_bucket(
        day: u32,
        clicks: i64,
        impressions: i64,
        conversions: i64,
        sales_cents: i64,
    ) -> RollupRow {
        RollupRow {
            id: i64::from(day),
            campaign_id: 1,
            granularity: "daily".to_owned(),
            bucket_start: at(day),
            clicks,
            impressions,
            conversions,
            sales_amount: Decimal::new(sales_cents, 2),
            ctr: 0.0,
            conversion_rate: 0.0,
            updated_at: at(day),
        }
    }

    fn steady_history(days: u32) -> Vec<RollupRow> {
        (1..=days)
            .map(|d| daily_bucket(d.min(28), 10, 100, 2, 2_500))
            .collect()
    }

    // ========================================================================
    // Series statistics and confidence
    // ========================================================================

    #[test]
    fn constant_series_has_zero_spread() {
        let (mean, cv) = series_stats(&[5.0, 5.0, 5.0, 5.0]);
        assert!((mean - 5.0).abs() < EPS);
        assert!(cv.abs() < EPS);
    }

    #[test]
    fn known_series_spread_checks_out() {
        // [1, 3]: mean 2, population std 1, cv 0.5.
        let (mean, cv) = series_stats(&[1.0, 3.0]);
        assert!((mean - 2.0).abs() < EPS);
        assert!((cv - 0.5).abs() < EPS);
    }

    #[test]
    fn empty_and_flat_zero_series_are_inert() {
        assert_eq!(series_stats(&[]), (0.0, 0.0));
        let (mean, cv) = series_stats(&[0.0, 0.0]);
        assert!(mean.abs() < EPS);
        assert!(cv.abs() < EPS);
    }

    #[test]
    fn confidence_strictly_decreases_with_spread() {
        let calm = confidence_score(90, 90, 0.0);
        let choppy = confidence_score(90, 90, 0.5);
        let wild = confidence_score(90, 90, 2.0);
        assert!((calm - 1.0).abs() < EPS);
        assert!((choppy - 2.0 / 3.0).abs() < EPS);
        assert!((wild - 1.0 / 3.0).abs() < EPS);
        assert!(calm > choppy && choppy > wild);
    }

    #[test]
    fn confidence_scales_with_sample_count_up_to_the_bar() {
        assert!((confidence_score(45, 90, 0.0) - 0.5).abs() < EPS);
        assert!((confidence_score(180, 90, 0.0) - 1.0).abs() < EPS);
        assert!((confidence_score(10, 0, 0.0) - 1.0).abs() < EPS);
        assert!(confidence_score(0, 90, 0.0).abs() < EPS);
    }

    // ========================================================================
    // Accuracy scoring
    // ========================================================================

    #[test]
    fn exact_prediction_scores_one() {
        assert!((accuracy_score(120.0, 120.0) - 1.0).abs() < EPS);
    }

    #[test]
    fn doubling_the_actual_scores_zero() {
        assert!(accuracy_score(200.0, 100.0).abs() < EPS);
    }

    #[test]
    fn wild_overshoot_clamps_to_zero() {
        assert!(accuracy_score(1_000.0, 10.0).abs() < EPS);
    }

    #[test]
    fn zero_actuals_score_against_the_epsilon_floor() {
        assert!((accuracy_score(0.0, 0.0) - 1.0).abs() < EPS);
        assert!((accuracy_score(0.5, 0.0) - 0.5).abs() < EPS);
    }

    #[test]
    fn reconciliation_averages_the_four_metrics() {
        let prediction = PredictionRow {
            id: 1,
            campaign_id: 1,
            generated_at: at(1),
            horizon_days: 7,
            sample_days: 90,
            predicted_clicks: 70,
            predicted_impressions: 700,
            predicted_conversions: 14,
            predicted_sales_amount: Decimal::new(17_500, 2),
            confidence: 1.0,
            actual_clicks: None,
            actual_impressions: None,
            actual_conversions: None,
            actual_sales_amount: None,
            accuracy: None,
            reconciled_at: None,
            created_at: at(1),
        };
        let exact = MetricTotals {
            clicks: 70,
            impressions: 700,
            conversions: 14,
            sales_amount: Decimal::new(17_500, 2),
        };
        assert!((reconciliation_accuracy(&prediction, &exact) - 1.0).abs() < EPS);

        // Clicks land at half the prediction, everything else exact:
        // the clicks score is 1 - 35/35 = 0, so the mean drops to 0.75.
        let half_clicks = MetricTotals {
            clicks: 35,
            ..exact
        };
        assert!((reconciliation_accuracy(&prediction, &half_clicks) - 0.75).abs() < EPS);
    }

    // ========================================================================
    // Forecast projection
    // ========================================================================

    #[test]
    fn steady_history_projects_means_at_full_confidence() {
        let history = steady_history(90);
        let forecast = forecast_from_history(&history, 7, 90).unwrap();
        assert_eq!(forecast.clicks, 70);
        assert_eq!(forecast.impressions, 700);
        assert_eq!(forecast.conversions, 14);
        assert_eq!(forecast.sales_amount, Decimal::new(17_500, 2));
        assert!((forecast.confidence - 1.0).abs() < EPS);
        assert_eq!(forecast.sample_days, 90);
    }

    #[test]
    fn noisy_history_lowers_confidence() {
        // Clicks alternate 0/20 (cv 1.0); the other series stay flat, so
        // the averaged cv is 0.25 and confidence lands at 0.8.
        let history: Vec<RollupRow> = (1..=90)
            .map(|d| {
                let clicks = if d % 2 == 0 { 20 } else { 0 };
                daily_bucket(u32::try_from(d % 28 + 1).unwrap(), clicks, 100, 2, 2_500)
            })
            .collect();
        let forecast = forecast_from_history(&history, 7, 90).unwrap();
        assert_eq!(forecast.clicks, 70);
        assert!((forecast.confidence - 0.8).abs() < EPS);
    }

    #[test]
    fn short_history_caps_confidence_by_sample_count() {
        let history = steady_history(45);
        let forecast = forecast_from_history(&history, 7, 90).unwrap();
        assert!((forecast.confidence - 0.5).abs() < EPS);
        assert_eq!(forecast.sample_days, 45);
    }

    #[test]
    fn empty_history_produces_no_forecast() {
        assert!(forecast_from_history(&[], 7, 90).is_none());
    }
}
