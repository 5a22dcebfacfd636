//! Forecast read endpoint.

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
pub(super) struct PredictionQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub(super) struct PredictionItem {
    pub id: i64,
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
}

impl From<promopilot_db::PredictionRow> for PredictionItem {
    fn from(row: promopilot_db::PredictionRow) -> Self {
        Self {
            id: row.id,
            generated_at: row.generated_at,
            horizon_days: row.horizon_days,
            sample_days: row.sample_days,
            predicted_clicks: row.predicted_clicks,
            predicted_impressions: row.predicted_impressions,
            predicted_conversions: row.predicted_conversions,
            predicted_sales_amount: row.predicted_sales_amount,
            confidence: row.confidence,
            actual_clicks: row.actual_clicks,
            actual_impressions: row.actual_impressions,
            actual_conversions: row.actual_conversions,
            actual_sales_amount: row.actual_sales_amount,
            accuracy: row.accuracy,
            reconciled_at: row.reconciled_at,
        }
    }
}

/// GET /api/v1/campaigns/:public_id/predictions — newest forecasts first,
/// reconciled ones carrying their accuracy.
pub(super) async fn list_predictions(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(public_id): Path<String>,
    Query(query): Query<PredictionQuery>,
) -> Result<Json<ApiResponse<Vec<PredictionItem>>>, ApiError> {
    let rid = &req_id.0;
    let campaign = resolve_campaign(&state.pool, &public_id, rid).await?;

    let rows = promopilot_db::list_predictions_for_campaign(
        &state.pool,
        campaign.id,
        normalize_limit(query.limit),
    )
    .await
    .map_err(|e| map_db_error(rid.clone(), &e))?;

    Ok(Json(ApiResponse {
        data: rows.into_iter().map(PredictionItem::from).collect(),
        meta: ResponseMeta::new(req_id.0),
    }))
}
