//! Marketplace API wire types.
//!
//! All types model the JSON structures returned by the marketplace REST API.
//! List endpoints wrap results in a `{"paging": ..., "results": [...]}`
//! envelope; error responses use `{"error": {"code": ..., "message": ...}}`.
//!
//! Catalog fields the marketplace may omit (price, stock, condition, ...)
//! are `Option` here on purpose: the scoring engine excludes incomplete
//! items instead of defaulting them, so the wire type must preserve the gap.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Offset-based pagination metadata on list responses.
#[derive(Debug, Clone, Deserialize)]
pub struct Paging {
    pub total: i64,
    pub offset: i64,
    pub limit: i64,
}

/// One page of a seller's item listings.
#[derive(Debug, Deserialize)]
pub struct ItemsPage {
    pub paging: Paging,
    pub results: Vec<ItemDoc>,
}

/// A catalog item as the marketplace reports it.
#[derive(Debug, Clone, Deserialize)]
pub struct ItemDoc {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub thumbnail: Option<String>,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub available_quantity: Option<i64>,
    /// Units sold over the marketplace's trailing sales window.
    #[serde(default)]
    pub sold_quantity: Option<i64>,
    #[serde(default)]
    pub category_id: Option<String>,
    /// `"new"`, `"refurbished"`, or `"used"`.
    #[serde(default)]
    pub condition: Option<String>,
    /// Listing status, e.g. `"active"` or `"paused"`.
    #[serde(default)]
    pub status: Option<String>,
}

/// Visit counts for one item over the requested trailing window plus the
/// window immediately before it (for trend detection).
#[derive(Debug, Clone, Deserialize)]
pub struct ItemVisits {
    pub item_id: String,
    pub window_days: u32,
    pub visits: i64,
    #[serde(default)]
    pub previous_visits: i64,
}

/// Per-category conversion performance across the seller's catalog.
#[derive(Debug, Clone, Deserialize)]
pub struct CategoryPerformance {
    pub category_id: String,
    /// Orders per visit for the category, already in [0, 1].
    pub conversion_rate: f64,
}

#[derive(Debug, Deserialize)]
pub struct CategoryPerformancePage {
    pub results: Vec<CategoryPerformance>,
}

/// Request body for `POST promotions/items/{id}/activate`.
#[derive(Debug, Clone, Serialize)]
pub struct ActivatePromotion {
    pub discount_percentage: f64,
    /// Our campaign public id, echoed back by the counters endpoint.
    pub campaign_ref: String,
    pub end_date: DateTime<Utc>,
}

/// Acknowledgement returned by the promotion activate/pause endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct PromotionAck {
    pub item_id: String,
    pub status: String,
}

/// Cumulative performance counters for one campaign, as reported by the
/// marketplace. These are running totals since campaign start; the metrics
/// collector turns them into deltas.
#[derive(Debug, Clone, Deserialize)]
pub struct CounterSnapshot {
    pub clicks: i64,
    pub impressions: i64,
    pub conversions: i64,
    pub sales_amount: f64,
    #[serde(default)]
    pub as_of: Option<DateTime<Utc>>,
}
