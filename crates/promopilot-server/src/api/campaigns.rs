//! Campaign CRUD plus the manual state override.
//!
//! The override calls the marketplace before touching the database, so a
//! refused upstream call leaves the stored state untouched.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use promopilot_core::campaign::{next_state, CampaignWindow};
use promopilot_core::validate::{self, CampaignDraft};
use promopilot_core::{CampaignState, ScheduleAction, StateEvent, StateSource};
use promopilot_engine::schedule::window::{first_window_start, WeeklyWindow};
use promopilot_market::types::ActivatePromotion;

use crate::middleware::RequestId;

use super::{
    map_db_error, map_market_error, normalize_limit, resolve_campaign, ApiError, ApiResponse,
    AppState, ResponseMeta,
};

// ---------------------------------------------------------------------------
// Request bodies
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub(super) struct CreateCampaignRequest {
    pub item_id: String,
    pub campaign_name: String,
    pub discount_percentage: Decimal,
    pub timezone: String,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
}

// Absent fields keep their stored value (PATCH semantics). Expired campaigns
// reject every edit at the database layer.
#[derive(Debug, Deserialize)]
pub(super) struct UpdateCampaignRequest {
    pub campaign_name: Option<String>,
    pub discount_percentage: Option<Decimal>,
    pub timezone: Option<String>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub(super) struct OverrideStateRequest {
    pub action: String,
}

#[derive(Debug, Deserialize)]
pub(super) struct CampaignQuery {
    pub state: Option<String>,
    pub limit: Option<i64>,
}

// ---------------------------------------------------------------------------
// Response bodies
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub(super) struct CampaignItem {
    pub public_id: Uuid,
    pub item_id: String,
    pub campaign_name: String,
    pub discount_percentage: Decimal,
    pub timezone: String,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub state: String,
    pub state_source: String,
    pub state_updated_at: DateTime<Utc>,
    pub total_clicks: i64,
    pub total_impressions: i64,
    pub total_conversions: i64,
    pub total_sales_amount: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<promopilot_db::CampaignRow> for CampaignItem {
    fn from(row: promopilot_db::CampaignRow) -> Self {
        Self {
            public_id: row.public_id,
            item_id: row.item_id,
            campaign_name: row.campaign_name,
            discount_percentage: row.discount_percentage,
            timezone: row.timezone,
            start_date: row.start_date,
            end_date: row.end_date,
            state: row.state,
            state_source: row.state_source,
            state_updated_at: row.state_updated_at,
            total_clicks: row.total_clicks,
            total_impressions: row.total_impressions,
            total_conversions: row.total_conversions,
            total_sales_amount: row.total_sales_amount,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

// ---------------------------------------------------------------------------
// Validation helpers
// ---------------------------------------------------------------------------

fn validate_draft(req_id: &str, draft: &CampaignDraft<'_>) -> Result<(), ApiError> {
    validate::validate_campaign(draft)
        .map(|_| ())
        .map_err(|e| ApiError::new(req_id, "validation_error", e.to_string()))
}

fn parse_state_filter(req_id: &str, raw: &str) -> Result<CampaignState, ApiError> {
    raw.parse::<CampaignState>()
        .map_err(|e| ApiError::new(req_id, "validation_error", e.to_string()))
}

/// The stored state string always round-trips; a failure here means the row
/// was written outside the state machine.
fn parse_stored_state(req_id: &str, row: &promopilot_db::CampaignRow) -> Result<CampaignState, ApiError> {
    row.state.parse::<CampaignState>().map_err(|e| {
        tracing::error!(campaign_id = row.id, state = %row.state, error = %e, "stored campaign state does not parse");
        ApiError::new(req_id, "internal_error", "campaign state is corrupt")
    })
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// POST /api/v1/campaigns — create a campaign in `draft`.
pub(super) async fn create_campaign(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Json(body): Json<CreateCampaignRequest>,
) -> Result<(StatusCode, Json<ApiResponse<CampaignItem>>), ApiError> {
    let rid = &req_id.0;

    let draft = CampaignDraft {
        campaign_name: &body.campaign_name,
        item_id: &body.item_id,
        discount_percentage: body.discount_percentage,
        timezone: &body.timezone,
        start_date: body.start_date,
        end_date: body.end_date,
    };
    validate_draft(rid, &draft)?;

    let row = promopilot_db::create_campaign(
        &state.pool,
        &promopilot_db::NewCampaign {
            seller_id: state.engine.policy.seller_id,
            item_id: body.item_id.trim(),
            campaign_name: body.campaign_name.trim(),
            discount_percentage: body.discount_percentage,
            timezone: &body.timezone,
            start_date: body.start_date,
            end_date: body.end_date,
        },
    )
    .await
    .map_err(|e| map_db_error(rid.clone(), &e))?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse {
            data: CampaignItem::from(row),
            meta: ResponseMeta::new(req_id.0),
        }),
    ))
}

/// GET /api/v1/campaigns — the seller's campaigns, newest first.
pub(super) async fn list_campaigns(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(query): Query<CampaignQuery>,
) -> Result<Json<ApiResponse<Vec<CampaignItem>>>, ApiError> {
    let rid = &req_id.0;

    let state_filter = match query.state.as_deref() {
        Some(raw) => Some(parse_state_filter(rid, raw)?),
        None => None,
    };

    let rows = promopilot_db::list_campaigns(
        &state.pool,
        state.engine.policy.seller_id,
        state_filter.map(CampaignState::as_str),
        normalize_limit(query.limit),
    )
    .await
    .map_err(|e| map_db_error(rid.clone(), &e))?;

    Ok(Json(ApiResponse {
        data: rows.into_iter().map(CampaignItem::from).collect(),
        meta: ResponseMeta::new(req_id.0),
    }))
}

/// GET /api/v1/campaigns/:public_id
pub(super) async fn get_campaign(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(public_id): Path<String>,
) -> Result<Json<ApiResponse<CampaignItem>>, ApiError> {
    let row = resolve_campaign(&state.pool, &public_id, &req_id.0).await?;

    Ok(Json(ApiResponse {
        data: CampaignItem::from(row),
        meta: ResponseMeta::new(req_id.0),
    }))
}

/// PATCH /api/v1/campaigns/:public_id — update editable fields (sparse).
pub(super) async fn update_campaign(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(public_id): Path<String>,
    Json(body): Json<UpdateCampaignRequest>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let rid = &req_id.0;
    let current = resolve_campaign(&state.pool, &public_id, rid).await?;

    let campaign_name = body
        .campaign_name
        .unwrap_or_else(|| current.campaign_name.clone());
    let discount_percentage = body
        .discount_percentage
        .unwrap_or(current.discount_percentage);
    let timezone = body.timezone.unwrap_or_else(|| current.timezone.clone());
    let start_date = body.start_date.unwrap_or(current.start_date);
    let end_date = body.end_date.unwrap_or(current.end_date);

    validate_draft(
        rid,
        &CampaignDraft {
            campaign_name: &campaign_name,
            item_id: &current.item_id,
            discount_percentage,
            timezone: &timezone,
            start_date,
            end_date,
        },
    )?;

    let updated = promopilot_db::update_campaign_config(
        &state.pool,
        current.id,
        campaign_name.trim(),
        discount_percentage,
        &timezone,
        start_date,
        end_date,
    )
    .await
    .map_err(|e| map_db_error(rid.clone(), &e))?;

    if !updated {
        return Err(ApiError::new(
            rid,
            "conflict",
            "campaign is expired and can no longer be edited",
        ));
    }

    // Schedule edges are UTC instants derived from the campaign timezone;
    // a zone change invalidates every stored edge.
    if timezone != current.timezone {
        reschedule_campaign_edges(&state, rid, current.id, &timezone).await?;
    }

    Ok(Json(ApiResponse {
        data: serde_json::json!({ "updated": true }),
        meta: ResponseMeta::new(req_id.0),
    }))
}

/// Recomputes `next_execution` for every rule of a campaign under the given
/// timezone. Replacing a rule restarts its execution bookkeeping, the same
/// as editing the rule directly: the old attempts applied to edges that no
/// longer exist.
async fn reschedule_campaign_edges(
    state: &AppState,
    req_id: &str,
    campaign_id: i64,
    timezone: &str,
) -> Result<(), ApiError> {
    let tz: Tz = timezone.parse().map_err(|_| {
        tracing::error!(campaign_id, timezone, "validated timezone does not parse");
        ApiError::new(req_id, "internal_error", "campaign timezone is corrupt")
    })?;
    let now = state.engine.clock.now();

    let schedules = promopilot_db::list_schedules_for_campaign(&state.pool, campaign_id)
        .await
        .map_err(|e| map_db_error(req_id.to_owned(), &e))?;

    for schedule in schedules {
        let weekday = validate::weekday_from_index(schedule.day_of_week)
            .map_err(|e| ApiError::new(req_id, "internal_error", e.to_string()))?;
        let window = WeeklyWindow {
            day_of_week: weekday,
            start_time: schedule.start_time,
            end_time: schedule.end_time,
        };
        promopilot_db::update_schedule(
            &state.pool,
            schedule.id,
            &promopilot_db::ScheduleSpec {
                day_of_week: schedule.day_of_week,
                start_time: schedule.start_time,
                end_time: schedule.end_time,
                action: &schedule.action,
                next_execution: first_window_start(&window, tz, now),
            },
        )
        .await
        .map_err(|e| map_db_error(req_id.to_owned(), &e))?;
    }
    Ok(())
}

/// DELETE /api/v1/campaigns/:public_id — delete the campaign and its schedules.
pub(super) async fn delete_campaign(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(public_id): Path<String>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let rid = &req_id.0;
    let row = resolve_campaign(&state.pool, &public_id, rid).await?;

    let deleted = promopilot_db::delete_campaign(&state.pool, row.id)
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?;

    if !deleted {
        return Err(ApiError::new(
            rid,
            "not_found",
            format!("campaign '{public_id}' not found"),
        ));
    }

    Ok(Json(ApiResponse {
        data: serde_json::json!({ "deleted": true }),
        meta: ResponseMeta::new(req_id.0),
    }))
}

/// PATCH /api/v1/campaigns/:public_id/state — operator override.
///
/// Wins arbitration against schedule edges that were due before it: the
/// tick loop compares its edge against `state_updated_at` and yields to a
/// newer manual write.
pub(super) async fn override_campaign_state(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(public_id): Path<String>,
    Json(body): Json<OverrideStateRequest>,
) -> Result<Json<ApiResponse<CampaignItem>>, ApiError> {
    let rid = &req_id.0;
    let row = resolve_campaign(&state.pool, &public_id, rid).await?;

    let action = body
        .action
        .parse::<ScheduleAction>()
        .map_err(|e| ApiError::new(rid, "validation_error", e.to_string()))?;
    let current = parse_stored_state(rid, &row)?;

    let now = state.engine.clock.now();
    let window = CampaignWindow {
        start_date: row.start_date,
        end_date: row.end_date,
    };
    let next = next_state(current, StateEvent::Manual(action), window, now)
        .map_err(|e| ApiError::new(rid, "conflict", e.to_string()))?;

    // Marketplace first: if the upstream call fails the stored state must
    // keep describing what the marketplace is actually doing.
    match action {
        ScheduleAction::Activate => {
            let Some(discount_percentage) = row.discount_percentage.to_f64() else {
                tracing::error!(campaign_id = row.id, discount = %row.discount_percentage, "discount does not convert for the wire");
                return Err(ApiError::new(
                    rid,
                    "internal_error",
                    "discount percentage not representable",
                ));
            };
            let request = ActivatePromotion {
                discount_percentage,
                campaign_ref: row.public_id.to_string(),
                end_date: row.end_date,
            };
            state
                .engine
                .market
                .activate_promotion(&row.item_id, &request)
                .await
                .map_err(|e| map_market_error(rid.clone(), &e))?;
        }
        ScheduleAction::Pause => {
            state
                .engine
                .market
                .pause_promotion(&row.item_id)
                .await
                .map_err(|e| map_market_error(rid.clone(), &e))?;
        }
    }

    let applied = promopilot_db::set_campaign_state(
        &state.pool,
        row.id,
        next.as_str(),
        StateSource::Manual.as_str(),
        current.as_str(),
        now,
    )
    .await
    .map_err(|e| map_db_error(rid.clone(), &e))?;

    if !applied {
        // The marketplace already acknowledged the action, so until the next
        // tick re-reads this campaign its live state can be ahead of the row.
        tracing::warn!(
            campaign_id = row.id,
            item_id = %row.item_id,
            action = action.as_str(),
            acknowledged = next.as_str(),
            "manual override lost a concurrent state write after the marketplace call"
        );
        return Err(ApiError::new(
            rid,
            "conflict",
            "campaign state changed concurrently; re-read and retry",
        ));
    }

    tracing::info!(
        campaign_id = row.id,
        action = action.as_str(),
        from = current.as_str(),
        to = next.as_str(),
        "manual state override applied"
    );

    let refreshed = promopilot_db::get_campaign(&state.pool, row.id)
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?;

    Ok(Json(ApiResponse {
        data: CampaignItem::from(refreshed),
        meta: ResponseMeta::new(req_id.0),
    }))
}
