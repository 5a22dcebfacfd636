//! Suggestion listing, on-demand refresh, and apply-to-campaign.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use promopilot_core::validate::{self, CampaignDraft};
use promopilot_engine::{run_worker, TriggerSource, Worker};

use crate::middleware::RequestId;

use super::campaigns::CampaignItem;
use super::workers::WorkerTriggerResponse;
use super::{map_db_error, map_engine_error, ApiError, ApiResponse, AppState, ResponseMeta};

// ---------------------------------------------------------------------------
// Request bodies
// ---------------------------------------------------------------------------

// `campaign_name` defaults to the suggested item's title.
#[derive(Debug, Deserialize)]
pub(super) struct ApplySuggestionRequest {
    pub campaign_name: Option<String>,
    pub discount_percentage: Decimal,
    pub timezone: String,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Response bodies
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub(super) struct SuggestionItem {
    pub id: i64,
    pub item_id: String,
    pub title: String,
    pub image_url: Option<String>,
    pub current_price: Decimal,
    pub available_stock: i64,
    pub recent_clicks: i64,
    pub recent_sold: i64,
    pub potential_score: f64,
    pub engagement_trend: String,
    pub scoring_policy_version: String,
    pub generated_at: DateTime<Utc>,
}

impl From<promopilot_db::SuggestionRow> for SuggestionItem {
    fn from(row: promopilot_db::SuggestionRow) -> Self {
        Self {
            id: row.id,
            item_id: row.item_id,
            title: row.title,
            image_url: row.image_url,
            current_price: row.current_price,
            available_stock: row.available_stock,
            recent_clicks: row.recent_clicks,
            recent_sold: row.recent_sold,
            potential_score: row.potential_score,
            engagement_trend: row.engagement_trend,
            scoring_policy_version: row.scoring_policy_version,
            generated_at: row.generated_at,
        }
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// GET /api/v1/suggestions — the newest scored batch, best first.
pub(super) async fn list_suggestions(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> Result<Json<ApiResponse<Vec<SuggestionItem>>>, ApiError> {
    let rid = &req_id.0;

    let rows = promopilot_db::latest_suggestions(&state.pool, state.engine.policy.seller_id)
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?;

    Ok(Json(ApiResponse {
        data: rows.into_iter().map(SuggestionItem::from).collect(),
        meta: ResponseMeta::new(req_id.0),
    }))
}

/// POST /api/v1/suggestions/refresh — re-score the catalog now instead of
/// waiting for the nightly run.
pub(super) async fn refresh_suggestions(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> Result<Json<ApiResponse<WorkerTriggerResponse>>, ApiError> {
    let report = run_worker(&state.engine, Worker::Suggest, TriggerSource::Api)
        .await
        .map_err(|e| map_engine_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse {
        data: WorkerTriggerResponse::new(Worker::Suggest, &report),
        meta: ResponseMeta::new(req_id.0),
    }))
}

/// POST /api/v1/suggestions/:id/apply — turn a suggestion into a draft
/// campaign for its item.
pub(super) async fn apply_suggestion(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(id): Path<i64>,
    Json(body): Json<ApplySuggestionRequest>,
) -> Result<(StatusCode, Json<ApiResponse<CampaignItem>>), ApiError> {
    let rid = &req_id.0;

    let suggestion = match promopilot_db::get_suggestion(&state.pool, id).await {
        Ok(row) => row,
        Err(promopilot_db::DbError::NotFound) => {
            return Err(ApiError::new(
                rid,
                "not_found",
                format!("suggestion {id} not found"),
            ));
        }
        Err(e) => return Err(map_db_error(rid.clone(), &e)),
    };

    let campaign_name = body.campaign_name.unwrap_or_else(|| suggestion.title.clone());
    let draft = CampaignDraft {
        campaign_name: &campaign_name,
        item_id: &suggestion.item_id,
        discount_percentage: body.discount_percentage,
        timezone: &body.timezone,
        start_date: body.start_date,
        end_date: body.end_date,
    };
    validate::validate_campaign(&draft)
        .map_err(|e| ApiError::new(rid, "validation_error", e.to_string()))?;

    let row = promopilot_db::create_campaign(
        &state.pool,
        &promopilot_db::NewCampaign {
            seller_id: state.engine.policy.seller_id,
            item_id: &suggestion.item_id,
            campaign_name: campaign_name.trim(),
            discount_percentage: body.discount_percentage,
            timezone: &body.timezone,
            start_date: body.start_date,
            end_date: body.end_date,
        },
    )
    .await
    .map_err(|e| map_db_error(rid.clone(), &e))?;

    tracing::info!(
        suggestion_id = id,
        campaign_id = row.id,
        item_id = %row.item_id,
        "suggestion applied as draft campaign"
    );

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse {
            data: CampaignItem::from(row),
            meta: ResponseMeta::new(req_id.0),
        }),
    ))
}
