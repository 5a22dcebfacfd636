//! Weekly schedule rule handlers.
//!
//! Creation and replacement both compute `next_execution` here, from the
//! campaign's timezone, so the tick loop only ever reads edges it can trust.
//! Attaching the first rule to a draft campaign promotes it to `scheduled`.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::{DateTime, NaiveTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use promopilot_core::campaign::{next_state, CampaignWindow};
use promopilot_core::validate::{
    parse_time_of_day, validate_schedule_window, weekday_from_index,
};
use promopilot_core::{CampaignState, ScheduleAction, StateEvent, StateSource};
use promopilot_engine::schedule::window::{first_window_start, WeeklyWindow};

use crate::middleware::RequestId;

use super::{map_db_error, resolve_campaign, ApiError, ApiResponse, AppState, ResponseMeta};

// ---------------------------------------------------------------------------
// Request bodies
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub(super) struct CreateScheduleRequest {
    pub day_of_week: i16,
    pub start_time: String,
    pub end_time: String,
    pub action: String,
}

// Absent fields keep their stored value. Any change restarts execution
// bookkeeping, so a sparse PATCH still recomputes the next edge.
#[derive(Debug, Deserialize)]
pub(super) struct UpdateScheduleRequest {
    pub day_of_week: Option<i16>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub action: Option<String>,
}

// ---------------------------------------------------------------------------
// Response bodies
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub(super) struct ScheduleItem {
    pub id: i64,
    pub day_of_week: i16,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub action: String,
    pub status: String,
    pub failure_count: i32,
    pub last_executed: Option<DateTime<Utc>>,
    pub next_execution: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<promopilot_db::ScheduleRow> for ScheduleItem {
    fn from(row: promopilot_db::ScheduleRow) -> Self {
        Self {
            id: row.id,
            day_of_week: row.day_of_week,
            start_time: row.start_time,
            end_time: row.end_time,
            action: row.action,
            status: row.status,
            failure_count: row.failure_count,
            last_executed: row.last_executed,
            next_execution: row.next_execution,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

// ---------------------------------------------------------------------------
// Validation helpers
// ---------------------------------------------------------------------------

struct ValidatedRule {
    day_of_week: i16,
    weekday: chrono::Weekday,
    start_time: NaiveTime,
    end_time: NaiveTime,
    action: ScheduleAction,
}

fn validate_rule(
    req_id: &str,
    day_of_week: i16,
    start_time: &str,
    end_time: &str,
    action: &str,
) -> Result<ValidatedRule, ApiError> {
    let weekday = weekday_from_index(day_of_week)
        .map_err(|e| ApiError::new(req_id, "validation_error", e.to_string()))?;
    let start = parse_time_of_day(start_time)
        .map_err(|e| ApiError::new(req_id, "validation_error", e.to_string()))?;
    let end = parse_time_of_day(end_time)
        .map_err(|e| ApiError::new(req_id, "validation_error", e.to_string()))?;
    validate_schedule_window(start, end)
        .map_err(|e| ApiError::new(req_id, "validation_error", e.to_string()))?;
    let action = action
        .parse::<ScheduleAction>()
        .map_err(|e| ApiError::new(req_id, "validation_error", e.to_string()))?;

    Ok(ValidatedRule {
        day_of_week,
        weekday,
        start_time: start,
        end_time: end,
        action,
    })
}

/// The stored timezone was validated at campaign creation; a parse failure
/// here means the row was edited outside the API.
fn campaign_timezone(req_id: &str, row: &promopilot_db::CampaignRow) -> Result<Tz, ApiError> {
    row.timezone.parse::<Tz>().map_err(|_| {
        tracing::error!(campaign_id = row.id, timezone = %row.timezone, "stored timezone does not parse");
        ApiError::new(req_id, "internal_error", "campaign timezone is corrupt")
    })
}

fn next_edge_for(rule: &ValidatedRule, tz: Tz, now: DateTime<Utc>) -> DateTime<Utc> {
    let window = WeeklyWindow {
        day_of_week: rule.weekday,
        start_time: rule.start_time,
        end_time: rule.end_time,
    };
    first_window_start(&window, tz, now)
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// POST /api/v1/campaigns/:public_id/schedules — attach a weekly rule.
pub(super) async fn create_schedule(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(public_id): Path<String>,
    Json(body): Json<CreateScheduleRequest>,
) -> Result<(StatusCode, Json<ApiResponse<ScheduleItem>>), ApiError> {
    let rid = &req_id.0;
    let campaign = resolve_campaign(&state.pool, &public_id, rid).await?;

    let rule = validate_rule(
        rid,
        body.day_of_week,
        &body.start_time,
        &body.end_time,
        &body.action,
    )?;
    let tz = campaign_timezone(rid, &campaign)?;
    let now = state.engine.clock.now();

    let row = promopilot_db::create_schedule(
        &state.pool,
        campaign.id,
        &promopilot_db::ScheduleSpec {
            day_of_week: rule.day_of_week,
            start_time: rule.start_time,
            end_time: rule.end_time,
            action: rule.action.as_str(),
            next_execution: next_edge_for(&rule, tz, now),
        },
    )
    .await
    .map_err(|e| map_db_error(rid.clone(), &e))?;

    // First rule on a draft promotes the campaign. The write is guarded on
    // `draft`, so losing a concurrent race is fine: the campaign already
    // moved on and the schedule stands either way.
    if campaign.state == CampaignState::Draft.as_str() {
        let window = CampaignWindow {
            start_date: campaign.start_date,
            end_date: campaign.end_date,
        };
        match next_state(CampaignState::Draft, StateEvent::ScheduleAttached, window, now) {
            Ok(next) => {
                let promoted = promopilot_db::set_campaign_state(
                    &state.pool,
                    campaign.id,
                    next.as_str(),
                    StateSource::System.as_str(),
                    CampaignState::Draft.as_str(),
                    now,
                )
                .await
                .map_err(|e| map_db_error(rid.clone(), &e))?;
                if !promoted {
                    tracing::info!(
                        campaign_id = campaign.id,
                        "campaign left draft concurrently; skipping promotion"
                    );
                }
            }
            Err(e) => {
                tracing::warn!(campaign_id = campaign.id, error = %e, "draft promotion refused");
            }
        }
    }

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse {
            data: ScheduleItem::from(row),
            meta: ResponseMeta::new(req_id.0),
        }),
    ))
}

/// GET /api/v1/campaigns/:public_id/schedules
pub(super) async fn list_schedules(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(public_id): Path<String>,
) -> Result<Json<ApiResponse<Vec<ScheduleItem>>>, ApiError> {
    let rid = &req_id.0;
    let campaign = resolve_campaign(&state.pool, &public_id, rid).await?;

    let rows = promopilot_db::list_schedules_for_campaign(&state.pool, campaign.id)
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?;

    Ok(Json(ApiResponse {
        data: rows.into_iter().map(ScheduleItem::from).collect(),
        meta: ResponseMeta::new(req_id.0),
    }))
}

/// PATCH /api/v1/schedules/:id — replace rule fields (sparse).
pub(super) async fn update_schedule(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(id): Path<i64>,
    Json(body): Json<UpdateScheduleRequest>,
) -> Result<Json<ApiResponse<ScheduleItem>>, ApiError> {
    let rid = &req_id.0;

    let current = match promopilot_db::get_schedule(&state.pool, id).await {
        Ok(row) => row,
        Err(promopilot_db::DbError::NotFound) => {
            return Err(ApiError::new(
                rid,
                "not_found",
                format!("schedule {id} not found"),
            ));
        }
        Err(e) => return Err(map_db_error(rid.clone(), &e)),
    };
    let campaign = promopilot_db::get_campaign(&state.pool, current.campaign_id)
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?;

    let start_time = body
        .start_time
        .unwrap_or_else(|| current.start_time.format("%H:%M:%S").to_string());
    let end_time = body
        .end_time
        .unwrap_or_else(|| current.end_time.format("%H:%M:%S").to_string());
    let rule = validate_rule(
        rid,
        body.day_of_week.unwrap_or(current.day_of_week),
        &start_time,
        &end_time,
        body.action.as_deref().unwrap_or(&current.action),
    )?;
    let tz = campaign_timezone(rid, &campaign)?;
    let now = state.engine.clock.now();

    let row = promopilot_db::update_schedule(
        &state.pool,
        id,
        &promopilot_db::ScheduleSpec {
            day_of_week: rule.day_of_week,
            start_time: rule.start_time,
            end_time: rule.end_time,
            action: rule.action.as_str(),
            next_execution: next_edge_for(&rule, tz, now),
        },
    )
    .await
    .map_err(|e| map_db_error(rid.clone(), &e))?;

    Ok(Json(ApiResponse {
        data: ScheduleItem::from(row),
        meta: ResponseMeta::new(req_id.0),
    }))
}

/// DELETE /api/v1/schedules/:id
pub(super) async fn delete_schedule(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let rid = &req_id.0;

    let deleted = promopilot_db::delete_schedule(&state.pool, id)
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?;

    if !deleted {
        return Err(ApiError::new(
            rid,
            "not_found",
            format!("schedule {id} not found"),
        ));
    }

    Ok(Json(ApiResponse {
        data: serde_json::json!({ "deleted": true }),
        meta: ResponseMeta::new(req_id.0),
    }))
}
