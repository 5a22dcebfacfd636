//! Campaign metrics read endpoints: lifetime summary and rollup listings.

use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::middleware::RequestId;

use super::{map_db_error, normalize_limit, resolve_campaign, ApiError, ApiResponse, AppState, ResponseMeta};

#[derive(Debug, Deserialize)]
pub(super) struct RollupQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub(super) struct MetricsSummary {
    pub total_clicks: i64,
    pub total_impressions: i64,
    pub total_conversions: i64,
    pub total_sales_amount: Decimal,
    pub ctr: f64,
    pub conversion_rate: f64,
}

#[derive(Debug, Serialize)]
pub(super) struct RollupItem {
    pub bucket_start: DateTime<Utc>,
    pub clicks: i64,
    pub impressions: i64,
    pub conversions: i64,
    pub sales_amount: Decimal,
    pub ctr: f64,
    pub conversion_rate: f64,
    pub updated_at: DateTime<Utc>,
}

impl From<promopilot_db::RollupRow> for RollupItem {
    fn from(row: promopilot_db::RollupRow) -> Self {
        Self {
            bucket_start: row.bucket_start,
            clicks: row.clicks,
            impressions: row.impressions,
            conversions: row.conversions,
            sales_amount: row.sales_amount,
            ctr: row.ctr,
            conversion_rate: row.conversion_rate,
            updated_at: row.updated_at,
        }
    }
}

/// Same zero-denominator rule as the rollup SQL: no traffic means 0, never
/// NaN or a division error.
#[allow(clippy::cast_precision_loss)]
fn rate(numerator: i64, denominator: i64) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

/// GET /api/v1/campaigns/:public_id/metrics/summary — lifetime totals.
pub(super) async fn get_metrics_summary(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(public_id): Path<String>,
) -> Result<Json<ApiResponse<MetricsSummary>>, ApiError> {
    let campaign = resolve_campaign(&state.pool, &public_id, &req_id.0).await?;

    Ok(Json(ApiResponse {
        data: MetricsSummary {
            total_clicks: campaign.total_clicks,
            total_impressions: campaign.total_impressions,
            total_conversions: campaign.total_conversions,
            total_sales_amount: campaign.total_sales_amount,
            ctr: rate(campaign.total_clicks, campaign.total_impressions),
            conversion_rate: rate(campaign.total_conversions, campaign.total_clicks),
        },
        meta: ResponseMeta::new(req_id.0),
    }))
}

/// GET /api/v1/campaigns/:public_id/metrics/hourly
pub(super) async fn list_hourly_rollups(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(public_id): Path<String>,
    Query(query): Query<RollupQuery>,
) -> Result<Json<ApiResponse<Vec<RollupItem>>>, ApiError> {
    list_rollups(state, req_id, public_id, "hourly", query.limit).await
}

/// GET /api/v1/campaigns/:public_id/metrics/daily
pub(super) async fn list_daily_rollups(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(public_id): Path<String>,
    Query(query): Query<RollupQuery>,
) -> Result<Json<ApiResponse<Vec<RollupItem>>>, ApiError> {
    list_rollups(state, req_id, public_id, "daily", query.limit).await
}

async fn list_rollups(
    state: AppState,
    req_id: RequestId,
    public_id: String,
    granularity: &str,
    limit: Option<i64>,
) -> Result<Json<ApiResponse<Vec<RollupItem>>>, ApiError> {
    let rid = &req_id.0;
    let campaign = resolve_campaign(&state.pool, &public_id, rid).await?;

    let rows = promopilot_db::list_rollups(
        &state.pool,
        campaign.id,
        granularity,
        normalize_limit(limit),
    )
    .await
    .map_err(|e| map_db_error(rid.clone(), &e))?;

    Ok(Json(ApiResponse {
        data: rows.into_iter().map(RollupItem::from).collect(),
        meta: ResponseMeta::new(req_id.0),
    }))
}
