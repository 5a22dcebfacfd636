//! Counter collection: cumulative marketplace counters in, additive
//! deltas out.
//!
//! The marketplace exposes only lifetime counters per campaign, and they
//! can move backwards when a listing is recreated or the upstream store
//! loses history. Each poll diffs the fresh snapshot against the stored
//! checkpoint metric by metric: a counter that went backwards is treated
//! as reset, and its current value becomes the whole delta for the
//! interval. Campaign accumulators and rollup buckets therefore only ever
//! grow, even across resets.

use chrono::{DateTime, Duration, NaiveTime, Timelike, Utc};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;

use promopilot_db::{self as db, CampaignRow, CheckpointRow, MetricTotals, Observation};
use promopilot_market::types::CounterSnapshot;

use crate::error::EngineError;
use crate::worker::{EngineContext, Tally};

fn monotonic_delta(current: i64, previous: i64) -> (i64, bool) {
    if current < previous {
        (current, true)
    } else {
        (current - previous, false)
    }
}

fn monotonic_money_delta(current: Decimal, previous: Decimal) -> (Decimal, bool) {
    if current < previous {
        (current, true)
    } else {
        (current - previous, false)
    }
}

/// Diffs a fresh cumulative snapshot against the last checkpoint. Each
/// metric applies the reset rule independently, so a recreated click
/// counter does not distort a healthy sales counter. Returns the interval
/// delta and whether any metric reset.
pub(crate) fn normalize_delta(
    current: &MetricTotals,
    checkpoint: Option<&MetricTotals>,
) -> (MetricTotals, bool) {
    let Some(previous) = checkpoint else {
        // First poll: lifetime totals to date form the first interval.
        return (*current, false);
    };
    let (clicks, clicks_reset) = monotonic_delta(current.clicks, previous.clicks);
    let (impressions, impressions_reset) =
        monotonic_delta(current.impressions, previous.impressions);
    let (conversions, conversions_reset) =
        monotonic_delta(current.conversions, previous.conversions);
    let (sales_amount, sales_reset) =
        monotonic_money_delta(current.sales_amount, previous.sales_amount);
    (
        MetricTotals {
            clicks,
            impressions,
            conversions,
            sales_amount,
        },
        clicks_reset || impressions_reset || conversions_reset || sales_reset,
    )
}

/// Truncates an instant to the top of its UTC hour.
pub(crate) fn hour_bucket(at: DateTime<Utc>) -> DateTime<Utc> {
    day_bucket(at) + Duration::hours(i64::from(at.hour()))
}

/// Truncates an instant to UTC midnight.
pub(crate) fn day_bucket(at: DateTime<Utc>) -> DateTime<Utc> {
    at.date_naive().and_time(NaiveTime::MIN).and_utc()
}

/// Converts a wire snapshot to stored totals, fixing the money column to
/// cents. `None` when the sales amount is not a finite number.
pub(crate) fn totals_from_snapshot(snapshot: &CounterSnapshot) -> Option<MetricTotals> {
    Some(MetricTotals {
        clicks: snapshot.clicks,
        impressions: snapshot.impressions,
        conversions: snapshot.conversions,
        sales_amount: Decimal::from_f64(snapshot.sales_amount)?.round_dp(2),
    })
}

fn checkpoint_totals(row: &CheckpointRow) -> MetricTotals {
    MetricTotals {
        clicks: row.clicks,
        impressions: row.impressions,
        conversions: row.conversions,
        sales_amount: row.sales_amount,
    }
}

/// One collection pass over every campaign worth polling.
pub(crate) async fn run_metrics_collection(ctx: &EngineContext) -> Result<Tally, EngineError> {
    let now = ctx.clock.now();
    let deadline = now + ctx.policy.worker_deadline();
    let mut tally = Tally::default();

    // Recently expired campaigns stay in the poll set for the lookback
    // window so their final counter movements still land.
    let expired_after = now - Duration::days(ctx.policy.metrics_lookback_days);
    let campaigns = db::list_collectible_campaigns(&ctx.pool, expired_after).await?;
    if campaigns.is_empty() {
        return Ok(tally);
    }
    tracing::info!(campaigns = campaigns.len(), "collecting campaign counters");

    for (position, campaign) in campaigns.iter().enumerate() {
        if ctx.clock.now() >= deadline {
            tracing::warn!(
                remaining = campaigns.len() - position,
                "collection stopped at the run deadline"
            );
            break;
        }
        collect_one(ctx, campaign, &mut tally).await;
    }

    Ok(tally)
}

/// Polls one campaign and persists whatever the poll yielded. Trouble here
/// is isolated: it logs, counts against the run, and moves on. A campaign
/// that fails keeps its old checkpoint, so the missed interval is folded
/// into the next successful poll rather than lost.
async fn collect_one(ctx: &EngineContext, campaign: &CampaignRow, tally: &mut Tally) {
    let campaign_ref = campaign.public_id.to_string();
    let snapshot = match ctx.market.campaign_counters(&campaign_ref).await {
        Ok(snapshot) => snapshot,
        Err(e) => {
            tracing::warn!(campaign_id = campaign.id, error = %e, "counter poll failed; checkpoint unchanged");
            tally.failed += 1;
            return;
        }
    };
    let Some(cumulative) = totals_from_snapshot(&snapshot) else {
        tracing::warn!(
            campaign_id = campaign.id,
            sales_amount = snapshot.sales_amount,
            "counter snapshot carries a non-finite sales amount; sample dropped"
        );
        tally.failed += 1;
        return;
    };

    let checkpoint = match db::get_checkpoint(&ctx.pool, campaign.id).await {
        Ok(checkpoint) => checkpoint,
        Err(e) => {
            tracing::warn!(campaign_id = campaign.id, error = %e, "checkpoint read failed; campaign skipped this poll");
            tally.failed += 1;
            return;
        }
    };
    let previous = checkpoint.as_ref().map(checkpoint_totals);
    let (delta, counter_reset) = normalize_delta(&cumulative, previous.as_ref());

    if counter_reset {
        tracing::warn!(
            campaign_id = campaign.id,
            "counter reset detected; current totals become the interval delta"
        );
    }

    let at = ctx.clock.now();
    if delta == MetricTotals::default() {
        // Nothing moved. Refresh the checkpoint timestamp and skip the
        // sample so rollups stay free of empty rows.
        match db::upsert_checkpoint(&ctx.pool, campaign.id, &cumulative, at).await {
            Ok(()) => tally.processed += 1,
            Err(e) => {
                tracing::warn!(campaign_id = campaign.id, error = %e, "checkpoint refresh failed");
                tally.failed += 1;
            }
        }
        return;
    }

    let observation = Observation {
        collected_at: at,
        hour_bucket: hour_bucket(at),
        day_bucket: day_bucket(at),
        delta,
        counter_reset,
        cumulative,
    };
    match db::record_observation(&ctx.pool, campaign.id, &observation).await {
        Ok(()) => {
            tracing::debug!(
                campaign_id = campaign.id,
                clicks = delta.clicks,
                impressions = delta.impressions,
                conversions = delta.conversions,
                counter_reset,
                "counter observation recorded"
            );
            tally.processed += 1;
        }
        Err(e) => {
            tracing::warn!(campaign_id = campaign.id, error = %e, "observation write failed; interval folds into the next poll");
            tally.failed += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn totals(clicks: i64, impressions: i64, conversions: i64, cents: i64) -> MetricTotals {
        MetricTotals {
            clicks,
            impressions,
            conversions,
            sales_amount: Decimal::new(cents, 2),
        }
    }

    // ========================================================================
    // Delta normalization
    // ========================================================================

    #[test]
    fn first_poll_takes_lifetime_totals_as_the_delta() {
        let current = totals(500, 10_000, 25, 125_000);
        let (delta, reset) = normalize_delta(&current, None);
        assert_eq!(delta, current);
        assert!(!reset);
    }

    #[test]
    fn monotone_growth_yields_the_difference() {
        let previous = totals(100, 2_000, 5, 25_000);
        let current = totals(150, 2_600, 8, 41_050);
        let (delta, reset) = normalize_delta(&current, Some(&previous));
        assert_eq!(delta, totals(50, 600, 3, 16_050));
        assert!(!reset);
    }

    #[test]
    fn backwards_counter_becomes_the_whole_delta() {
        // The listing was recreated: lifetime clicks collapsed from 500 to
        // 10. Those 10 clicks are new activity, not a negative interval.
        let previous = totals(500, 10_000, 25, 125_000);
        let current = totals(10, 200, 1, 5_000);
        let (delta, reset) = normalize_delta(&current, Some(&previous));
        assert_eq!(delta, current);
        assert!(reset);
    }

    #[test]
    fn reset_rule_applies_per_metric() {
        // Clicks reset while impressions kept growing; only clicks take
        // the current-value fallback.
        let previous = totals(500, 1_000, 5, 10_000);
        let current = totals(10, 1_500, 7, 13_000);
        let (delta, reset) = normalize_delta(&current, Some(&previous));
        assert_eq!(delta, totals(10, 500, 2, 3_000));
        assert!(reset);
    }

    #[test]
    fn identical_totals_yield_a_zero_delta() {
        let previous = totals(42, 900, 3, 7_525);
        let (delta, reset) = normalize_delta(&previous, Some(&previous));
        assert_eq!(delta, MetricTotals::default());
        assert!(!reset);
    }

    // ========================================================================
    // Buckets and snapshot conversion
    // ========================================================================

    #[test]
    fn buckets_truncate_to_hour_and_day() {
        let at = Utc.with_ymd_and_hms(2025, 6, 2, 14, 37, 25).unwrap();
        assert_eq!(
            hour_bucket(at),
            Utc.with_ymd_and_hms(2025, 6, 2, 14, 0, 0).unwrap()
        );
        assert_eq!(
            day_bucket(at),
            Utc.with_ymd_and_hms(2025, 6, 2, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn midnight_sits_in_its_own_buckets() {
        let at = Utc.with_ymd_and_hms(2025, 6, 3, 0, 0, 0).unwrap();
        assert_eq!(hour_bucket(at), at);
        assert_eq!(day_bucket(at), at);
    }

    #[test]
    fn snapshot_money_lands_in_cents() {
        let snapshot = CounterSnapshot {
            clicks: 3,
            impressions: 80,
            conversions: 1,
            sales_amount: 1234.5678,
            as_of: None,
        };
        let converted = totals_from_snapshot(&snapshot).unwrap();
        assert_eq!(converted.sales_amount, Decimal::new(123_457, 2));
        assert_eq!(converted.clicks, 3);
    }

    #[test]
    fn non_finite_sales_amount_is_rejected() {
        let snapshot = CounterSnapshot {
            clicks: 3,
            impressions: 80,
            conversions: 1,
            sales_amount: f64::NAN,
            as_of: None,
        };
        assert!(totals_from_snapshot(&snapshot).is_none());
    }
}
