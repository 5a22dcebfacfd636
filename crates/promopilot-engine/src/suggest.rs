//! Discount-candidate scoring.
//!
//! Each refresh pulls the seller's catalog, scores every eligible item with
//! a fixed weighted policy, and persists the top candidates as a suggestion
//! snapshot. The policy is versioned: changing any weight or curve below
//! means bumping [`SCORING_POLICY_VERSION`] so old snapshots stay
//! interpretable.
//!
//! Sub-scores are named pure functions over [`ItemSignals`] so the weights
//! can move without touching signal extraction, and extraction never
//! defaults a missing field: an item the marketplace reports incompletely
//! is excluded and counted as a failure, not scored with a guess.

use std::collections::HashMap;

use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;

use promopilot_db::{self as db, NewSuggestion};
use promopilot_market::types::{CategoryPerformance, ItemDoc, ItemVisits};

use crate::error::EngineError;
use crate::worker::{EngineContext, Tally};

/// Bump on any change to the weights or curves below.
pub const SCORING_POLICY_VERSION: &str = "v1";

/// Trailing window for the visit counts that feed engagement and trend.
pub const VISITS_WINDOW_DAYS: u32 = 30;

/// Suggestions kept per snapshot.
pub const MAX_SUGGESTIONS: usize = 5;

/// Candidates scoring below this never reach the output.
pub const MIN_SCORE_GATE: f64 = 0.5;

/// Half-saturation constant for the engagement curve: an item with this many
/// recent clicks scores 0.5 on engagement.
const ENGAGEMENT_SATURATION: f64 = 200.0;

/// Stock level at which availability stops improving the score.
const STOCK_TARGET: f64 = 50.0;

/// Price range the discount dashboard historically converts best in. Scores
/// decay proportionally outside it.
const PRICE_BAND_MIN: f64 = 20.0;
const PRICE_BAND_MAX: f64 = 200.0;

/// Sub-score for items in a condition other than `new`.
const USED_CONDITION_SCORE: f64 = 0.25;

/// Relative visit change below which the trend reads as flat.
const TREND_DEAD_BAND: f64 = 0.10;

const WEIGHT_ENGAGEMENT: f64 = 0.30;
const WEIGHT_VELOCITY: f64 = 0.25;
const WEIGHT_PRICE_BAND: f64 = 0.15;
const WEIGHT_STOCK: f64 = 0.15;
const WEIGHT_CATEGORY: f64 = 0.10;
const WEIGHT_CONDITION: f64 = 0.05;

/// Normalized inputs to the scoring policy for one item.
#[derive(Debug, Clone)]
pub struct ItemSignals {
    pub recent_clicks: i64,
    pub recent_sold: i64,
    pub available_stock: i64,
    pub price: f64,
    /// Conversion rate of the item's category across the seller's catalog.
    pub category_conversion: f64,
    /// Best category conversion rate in the catalog, for normalization.
    pub top_category_conversion: f64,
    pub is_new_condition: bool,
}

/// Visit-volume direction between the current window and the one before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trend {
    Up,
    Flat,
    Down,
}

impl Trend {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Trend::Up => "up",
            Trend::Flat => "flat",
            Trend::Down => "down",
        }
    }
}

/// Weighted potential score in `[0, 1]`.
#[must_use]
pub fn potential_score(signals: &ItemSignals) -> f64 {
    WEIGHT_ENGAGEMENT * engagement_score(signals.recent_clicks)
        + WEIGHT_VELOCITY * velocity_score(signals.recent_sold, signals.available_stock)
        + WEIGHT_PRICE_BAND * price_band_score(signals.price)
        + WEIGHT_STOCK * stock_score(signals.available_stock)
        + WEIGHT_CATEGORY
            * category_score(signals.category_conversion, signals.top_category_conversion)
        + WEIGHT_CONDITION * condition_score(signals.is_new_condition)
}

/// Saturation curve `clicks / (clicks + k)`: rises quickly for the first few
/// hundred clicks, approaches 1 asymptotically so raw volume alone cannot
/// dominate the weighted sum.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn engagement_score(recent_clicks: i64) -> f64 {
    let clicks = recent_clicks.max(0) as f64;
    clicks / (clicks + ENGAGEMENT_SATURATION)
}

/// Units sold over the trailing window relative to what is still on the
/// shelf, capped at 1 for items selling faster than they restock.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn velocity_score(recent_sold: i64, available_stock: i64) -> f64 {
    if available_stock <= 0 {
        return 0.0;
    }
    (recent_sold.max(0) as f64 / available_stock as f64).min(1.0)
}

/// 1 inside the discount-friendly band, decaying proportionally with the
/// distance outside it.
#[must_use]
pub fn price_band_score(price: f64) -> f64 {
    if price <= 0.0 {
        return 0.0;
    }
    if price < PRICE_BAND_MIN {
        price / PRICE_BAND_MIN
    } else if price > PRICE_BAND_MAX {
        PRICE_BAND_MAX / price
    } else {
        1.0
    }
}

/// Rises linearly to 1 at [`STOCK_TARGET`] units. Zero-stock items never get
/// here (hard filter), but the curve still maps them to 0.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn stock_score(available_stock: i64) -> f64 {
    (available_stock.max(0) as f64 / STOCK_TARGET).min(1.0)
}

/// Category conversion relative to the seller's best-performing category.
#[must_use]
pub fn category_score(conversion: f64, top_conversion: f64) -> f64 {
    if top_conversion <= 0.0 {
        return 0.0;
    }
    (conversion / top_conversion).clamp(0.0, 1.0)
}

#[must_use]
pub fn condition_score(is_new_condition: bool) -> f64 {
    if is_new_condition {
        1.0
    } else {
        USED_CONDITION_SCORE
    }
}

/// Compares the current visit window against the previous one, with a dead
/// band so ordinary noise reads as flat.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn engagement_trend(visits: i64, previous_visits: i64) -> Trend {
    if previous_visits <= 0 {
        return if visits > 0 { Trend::Up } else { Trend::Flat };
    }
    let change = (visits - previous_visits) as f64 / previous_visits as f64;
    if change > TREND_DEAD_BAND {
        Trend::Up
    } else if change < -TREND_DEAD_BAND {
        Trend::Down
    } else {
        Trend::Flat
    }
}

/// The first screening pass over a raw catalog item, before any per-item
/// HTTP calls are spent on it.
#[derive(Debug)]
pub(crate) enum Screen {
    /// Complete and eligible; carries the extracted catalog fields.
    Candidate {
        price: f64,
        available_stock: i64,
        recent_sold: i64,
        category_id: String,
        is_new_condition: bool,
    },
    /// The marketplace omitted a signal the policy needs.
    Missing(&'static str),
    /// Complete but hard-excluded.
    Filtered(&'static str),
}

pub(crate) fn screen_item(item: &ItemDoc) -> Screen {
    let Some(status) = item.status.as_deref() else {
        return Screen::Missing("status");
    };
    let Some(price) = item.price else {
        return Screen::Missing("price");
    };
    let Some(available_stock) = item.available_quantity else {
        return Screen::Missing("available_quantity");
    };
    let Some(recent_sold) = item.sold_quantity else {
        return Screen::Missing("sold_quantity");
    };
    let Some(category_id) = item.category_id.as_deref() else {
        return Screen::Missing("category_id");
    };
    let Some(condition) = item.condition.as_deref() else {
        return Screen::Missing("condition");
    };

    if status != "active" {
        return Screen::Filtered("listing not active");
    }
    if price <= 0.0 {
        return Screen::Filtered("non-positive price");
    }
    if available_stock <= 0 {
        return Screen::Filtered("zero stock");
    }

    Screen::Candidate {
        price,
        available_stock,
        recent_sold,
        category_id: category_id.to_owned(),
        is_new_condition: condition == "new",
    }
}

/// A scored item waiting for the ranking pass.
#[derive(Debug, Clone)]
pub(crate) struct ScoredCandidate {
    pub item_id: String,
    pub title: String,
    pub image_url: Option<String>,
    pub price: Decimal,
    pub available_stock: i64,
    pub recent_clicks: i64,
    pub recent_sold: i64,
    pub score: f64,
    pub trend: Trend,
}

/// Applies the score gate, orders the survivors, and keeps the top
/// [`MAX_SUGGESTIONS`]. Ordering is total: score descending, then recent
/// clicks descending, then item id ascending, so identical inputs always
/// produce the identical snapshot.
pub(crate) fn rank_candidates(mut candidates: Vec<ScoredCandidate>) -> Vec<ScoredCandidate> {
    candidates.retain(|c| c.score >= MIN_SCORE_GATE);
    candidates.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| b.recent_clicks.cmp(&a.recent_clicks))
            .then_with(|| a.item_id.cmp(&b.item_id))
    });
    candidates.truncate(MAX_SUGGESTIONS);
    candidates
}

fn category_index(rows: &[CategoryPerformance]) -> (HashMap<String, f64>, f64) {
    let mut index = HashMap::with_capacity(rows.len());
    let mut top = 0.0_f64;
    for row in rows {
        top = top.max(row.conversion_rate);
        index.insert(row.category_id.clone(), row.conversion_rate);
    }
    (index, top)
}

fn build_signals(
    screen: &Screen,
    visits: &ItemVisits,
    categories: &HashMap<String, f64>,
    top_conversion: f64,
) -> Option<ItemSignals> {
    let Screen::Candidate {
        price,
        available_stock,
        recent_sold,
        category_id,
        is_new_condition,
    } = screen
    else {
        return None;
    };
    Some(ItemSignals {
        recent_clicks: visits.visits,
        recent_sold: *recent_sold,
        available_stock: *available_stock,
        price: *price,
        // A category absent from the performance report has no recorded
        // conversions, so zero is its true rate, not a stand-in.
        category_conversion: categories.get(category_id).copied().unwrap_or(0.0),
        top_category_conversion: top_conversion,
        is_new_condition: *is_new_condition,
    })
}

/// One full scoring pass for the configured seller.
///
/// Processed counts persisted suggestions; failed counts items dropped for
/// incomplete or unreadable signals. Hard-filtered items are neither.
pub(crate) async fn run_suggestion_refresh(ctx: &EngineContext) -> Result<Tally, EngineError> {
    let now = ctx.clock.now();
    let deadline = now + ctx.policy.worker_deadline();
    let seller_id = ctx.policy.seller_id;
    let mut tally = Tally::default();

    // Step 1: pull the catalog and category benchmarks. Either failing means
    // there is nothing meaningful to score this run.
    let items = ctx.market.list_items(seller_id).await?;
    let categories = ctx.market.category_performance(seller_id).await?;
    let (category_rates, top_conversion) = category_index(&categories);
    tracing::debug!(
        seller_id,
        items = items.len(),
        categories = category_rates.len(),
        "catalog fetched for scoring"
    );

    // Step 2: screen and score items one at a time, spending per-item visit
    // lookups only on candidates that survive screening.
    let mut candidates: Vec<ScoredCandidate> = Vec::new();
    for item in &items {
        if ctx.clock.now() >= deadline {
            tracing::warn!(
                scored = candidates.len(),
                total = items.len(),
                "scoring stopped at the run deadline; ranking what is done"
            );
            break;
        }

        let screen = screen_item(item);
        match &screen {
            Screen::Missing(field) => {
                tracing::warn!(item_id = %item.id, missing = field, "item skipped: incomplete catalog signals");
                tally.failed += 1;
                continue;
            }
            Screen::Filtered(reason) => {
                tracing::debug!(item_id = %item.id, reason, "item filtered out");
                continue;
            }
            Screen::Candidate { .. } => {}
        }

        let visits = match ctx.market.item_visits(&item.id, VISITS_WINDOW_DAYS).await {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(item_id = %item.id, error = %e, "item skipped: visit counts unavailable");
                tally.failed += 1;
                continue;
            }
        };

        let Some(signals) = build_signals(&screen, &visits, &category_rates, top_conversion)
        else {
            continue;
        };
        let Some(price) = Decimal::from_f64(signals.price) else {
            tracing::warn!(item_id = %item.id, price = signals.price, "item skipped: unrepresentable price");
            tally.failed += 1;
            continue;
        };

        candidates.push(ScoredCandidate {
            item_id: item.id.clone(),
            title: item.title.clone(),
            image_url: item.thumbnail.clone(),
            price: price.round_dp(2),
            available_stock: signals.available_stock,
            recent_clicks: signals.recent_clicks,
            recent_sold: signals.recent_sold,
            score: potential_score(&signals),
            trend: engagement_trend(visits.visits, visits.previous_visits),
        });
    }

    // Step 3: gate, rank, and persist the snapshot.
    let ranked = rank_candidates(candidates);
    for candidate in &ranked {
        let new = NewSuggestion {
            seller_id,
            item_id: &candidate.item_id,
            title: &candidate.title,
            image_url: candidate.image_url.as_deref(),
            current_price: candidate.price,
            available_stock: candidate.available_stock,
            recent_clicks: candidate.recent_clicks,
            recent_sold: candidate.recent_sold,
            potential_score: candidate.score,
            engagement_trend: candidate.trend.as_str(),
            scoring_policy_version: SCORING_POLICY_VERSION,
            generated_at: now,
        };
        match db::insert_suggestion(&ctx.pool, &new).await {
            Ok(_) => tally.processed += 1,
            Err(e) => {
                tracing::warn!(item_id = %candidate.item_id, error = %e, "suggestion row not persisted");
                tally.failed += 1;
            }
        }
    }

    // Step 4: drop snapshots past the audit retention window.
    let cutoff = now - chrono::Duration::days(ctx.policy.suggestion_retention_days);
    let purged = db::purge_suggestions_before(&ctx.pool, cutoff).await?;
    if purged > 0 {
        tracing::debug!(purged, "old suggestion snapshots purged");
    }

    Ok(tally)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn baseline_signals() -> ItemSignals {
        ItemSignals {
            recent_clicks: 1000,
            recent_sold: 6,
            available_stock: 40,
            price: 49.90,
            category_conversion: 0.03,
            top_category_conversion: 0.03,
            is_new_condition: true,
        }
    }

    // ========================================================================
    // Sub-score curves
    // ========================================================================

    #[test]
    fn engagement_saturates_instead_of_growing_unbounded() {
        assert!((engagement_score(0) - 0.0).abs() < f64::EPSILON);
        assert!((engagement_score(200) - 0.5).abs() < 1e-12);
        assert!((engagement_score(1000) - 1000.0 / 1200.0).abs() < 1e-12);
        assert!(engagement_score(10_000_000) < 1.0);
        assert!(engagement_score(10_000_000) > 0.99);
    }

    #[test]
    fn negative_clicks_score_zero_engagement() {
        assert!((engagement_score(-5) - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn velocity_caps_at_one_and_handles_empty_stock() {
        assert!((velocity_score(6, 40) - 0.15).abs() < 1e-12);
        assert!((velocity_score(500, 40) - 1.0).abs() < f64::EPSILON);
        assert!((velocity_score(5, 0) - 0.0).abs() < f64::EPSILON);
        assert!((velocity_score(0, 40) - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn price_band_peaks_inside_and_decays_outside() {
        assert!((price_band_score(20.0) - 1.0).abs() < f64::EPSILON);
        assert!((price_band_score(49.90) - 1.0).abs() < f64::EPSILON);
        assert!((price_band_score(200.0) - 1.0).abs() < f64::EPSILON);
        assert!((price_band_score(10.0) - 0.5).abs() < 1e-12);
        assert!((price_band_score(400.0) - 0.5).abs() < 1e-12);
        assert!((price_band_score(0.0) - 0.0).abs() < f64::EPSILON);
        assert!((price_band_score(-3.0) - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn stock_rises_to_target_then_flattens() {
        assert!((stock_score(0) - 0.0).abs() < f64::EPSILON);
        assert!((stock_score(25) - 0.5).abs() < 1e-12);
        assert!((stock_score(50) - 1.0).abs() < f64::EPSILON);
        assert!((stock_score(5000) - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn category_normalizes_against_top_and_clamps() {
        assert!((category_score(0.03, 0.03) - 1.0).abs() < f64::EPSILON);
        assert!((category_score(0.015, 0.03) - 0.5).abs() < 1e-12);
        assert!((category_score(0.05, 0.0) - 0.0).abs() < f64::EPSILON);
        assert!((category_score(0.06, 0.03) - 1.0).abs() < f64::EPSILON);
        assert!((category_score(-0.1, 0.03) - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn condition_favors_new() {
        assert!((condition_score(true) - 1.0).abs() < f64::EPSILON);
        assert!((condition_score(false) - USED_CONDITION_SCORE).abs() < f64::EPSILON);
    }

    // ========================================================================
    // Weighted total
    // ========================================================================

    #[test]
    fn high_signal_item_clears_the_gate() {
        // clicks=1000, sold=6, stock=40, price in band, category at the top
        // rate, new condition: 0.25 + 0.0375 + 0.15 + 0.12 + 0.10 + 0.05.
        let score = potential_score(&baseline_signals());
        assert!((score - 0.7075).abs() < 1e-9);
        assert!(score >= MIN_SCORE_GATE);
    }

    #[test]
    fn weak_item_stays_below_the_gate() {
        let signals = ItemSignals {
            recent_clicks: 3,
            recent_sold: 0,
            available_stock: 2,
            price: 1200.0,
            category_conversion: 0.001,
            top_category_conversion: 0.03,
            is_new_condition: false,
        };
        assert!(potential_score(&signals) < MIN_SCORE_GATE);
    }

    #[test]
    fn score_stays_in_unit_interval_across_extremes() {
        let extremes = [
            ItemSignals {
                recent_clicks: i64::MAX / 2,
                recent_sold: i64::MAX / 2,
                available_stock: 1,
                price: 0.01,
                category_conversion: 5.0,
                top_category_conversion: 0.001,
                is_new_condition: true,
            },
            ItemSignals {
                recent_clicks: 0,
                recent_sold: 0,
                available_stock: 0,
                price: 0.0,
                category_conversion: 0.0,
                top_category_conversion: 0.0,
                is_new_condition: false,
            },
            ItemSignals {
                recent_clicks: -10,
                recent_sold: -10,
                available_stock: -1,
                price: -40.0,
                category_conversion: -1.0,
                top_category_conversion: -1.0,
                is_new_condition: false,
            },
            baseline_signals(),
        ];
        for signals in &extremes {
            let score = potential_score(signals);
            assert!((0.0..=1.0).contains(&score), "score {score} out of range");
        }
    }

    // ========================================================================
    // Trend detection
    // ========================================================================

    #[test]
    fn trend_uses_a_dead_band_around_flat() {
        assert_eq!(engagement_trend(110, 100), Trend::Flat);
        assert_eq!(engagement_trend(111, 100), Trend::Up);
        assert_eq!(engagement_trend(90, 100), Trend::Flat);
        assert_eq!(engagement_trend(89, 100), Trend::Down);
    }

    #[test]
    fn trend_from_zero_baseline() {
        assert_eq!(engagement_trend(5, 0), Trend::Up);
        assert_eq!(engagement_trend(0, 0), Trend::Flat);
    }

    // ========================================================================
    // Screening and ranking
    // ========================================================================

    fn doc(id: &str) -> ItemDoc {
        ItemDoc {
            id: id.to_owned(),
            title: format!("Item {id}"),
            thumbnail: None,
            price: Some(49.90),
            available_quantity: Some(40),
            sold_quantity: Some(6),
            category_id: Some("MLA1055".to_owned()),
            condition: Some("new".to_owned()),
            status: Some("active".to_owned()),
        }
    }

    #[test]
    fn screening_flags_missing_signals_by_field() {
        let mut item = doc("MLA1");
        item.price = None;
        assert!(matches!(screen_item(&item), Screen::Missing("price")));

        let mut item = doc("MLA1");
        item.available_quantity = None;
        assert!(matches!(
            screen_item(&item),
            Screen::Missing("available_quantity")
        ));

        let mut item = doc("MLA1");
        item.condition = None;
        assert!(matches!(screen_item(&item), Screen::Missing("condition")));
    }

    #[test]
    fn screening_hard_filters_ineligible_items() {
        let mut item = doc("MLA1");
        item.status = Some("paused".to_owned());
        assert!(matches!(screen_item(&item), Screen::Filtered(_)));

        let mut item = doc("MLA1");
        item.available_quantity = Some(0);
        assert!(matches!(screen_item(&item), Screen::Filtered("zero stock")));

        let mut item = doc("MLA1");
        item.price = Some(0.0);
        assert!(matches!(
            screen_item(&item),
            Screen::Filtered("non-positive price")
        ));
    }

    #[test]
    fn complete_active_item_screens_as_candidate() {
        assert!(matches!(screen_item(&doc("MLA1")), Screen::Candidate { .. }));
    }

    fn cand(item_id: &str, score: f64, clicks: i64) -> ScoredCandidate {
        ScoredCandidate {
            item_id: item_id.to_owned(),
            title: String::new(),
            image_url: None,
            price: Decimal::new(4990, 2),
            available_stock: 10,
            recent_clicks: clicks,
            recent_sold: 1,
            score,
            trend: Trend::Flat,
        }
    }

    #[test]
    fn ranking_gates_sorts_and_truncates() {
        let ranked = rank_candidates(vec![
            cand("g", 0.55, 10),
            cand("a", 0.92, 5),
            cand("b", 0.49, 900), // below the gate despite heavy clicks
            cand("c", 0.70, 30),
            cand("d", 0.70, 80),
            cand("e", 0.61, 2),
            cand("f", 0.58, 2),
        ]);

        let ids: Vec<&str> = ranked.iter().map(|c| c.item_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "d", "c", "e", "f"]);
        assert!(ranked.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[test]
    fn ranking_ties_break_on_clicks_then_item_id() {
        let ranked = rank_candidates(vec![
            cand("z", 0.8, 50),
            cand("m", 0.8, 50),
            cand("q", 0.8, 70),
        ]);
        let ids: Vec<&str> = ranked.iter().map(|c| c.item_id.as_str()).collect();
        assert_eq!(ids, vec!["q", "m", "z"]);
    }

    #[test]
    fn ranking_is_deterministic_for_identical_input() {
        let input = vec![cand("a", 0.8, 10), cand("b", 0.8, 10), cand("c", 0.6, 99)];
        let first = rank_candidates(input.clone());
        let second = rank_candidates(input);
        let first_ids: Vec<_> = first.iter().map(|c| c.item_id.clone()).collect();
        let second_ids: Vec<_> = second.iter().map(|c| c.item_id.clone()).collect();
        assert_eq!(first_ids, second_ids);
    }
}
