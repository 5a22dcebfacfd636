//! Manual worker triggers and the run audit listing.
//!
//! Each trigger runs the worker inline and answers with the batch outcome,
//! so a dashboard button gets the same report the cron loop logs. An
//! overlapping trigger is refused with a conflict, not queued.

use axum::{
    extract::{Query, State},
    Extension, Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use promopilot_engine::{run_worker, TriggerSource, Worker, WorkerReport};

use crate::middleware::RequestId;

use super::{map_db_error, map_engine_error, normalize_limit, ApiError, ApiResponse, AppState, ResponseMeta};

// ---------------------------------------------------------------------------
// Response bodies
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub(super) struct WorkerTriggerResponse {
    pub run_id: i64,
    pub worker: &'static str,
    pub items_processed: i32,
    pub items_failed: i32,
}

impl WorkerTriggerResponse {
    pub(super) fn new(worker: Worker, report: &WorkerReport) -> Self {
        Self {
            run_id: report.run_id,
            worker: worker.name(),
            items_processed: report.items_processed,
            items_failed: report.items_failed,
        }
    }
}

#[derive(Debug, Serialize)]
pub(super) struct WorkerRunItem {
    pub public_id: Uuid,
    pub worker: String,
    pub trigger_source: String,
    pub status: String,
    pub items_processed: Option<i32>,
    pub items_failed: Option<i32>,
    pub error: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<promopilot_db::WorkerRunRow> for WorkerRunItem {
    fn from(row: promopilot_db::WorkerRunRow) -> Self {
        Self {
            public_id: row.public_id,
            worker: row.worker,
            trigger_source: row.trigger_source,
            status: row.status,
            items_processed: row.items_processed,
            items_failed: row.items_failed,
            error: row.error,
            started_at: row.started_at,
            completed_at: row.completed_at,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct WorkerRunQuery {
    pub limit: Option<i64>,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn trigger(
    state: &AppState,
    req_id: String,
    worker: Worker,
) -> Result<Json<ApiResponse<WorkerTriggerResponse>>, ApiError> {
    let report = run_worker(&state.engine, worker, TriggerSource::Api)
        .await
        .map_err(|e| map_engine_error(req_id.clone(), &e))?;

    Ok(Json(ApiResponse {
        data: WorkerTriggerResponse::new(worker, &report),
        meta: ResponseMeta::new(req_id),
    }))
}

/// POST /api/v1/workers/schedule-tick
pub(super) async fn trigger_schedule_tick(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> Result<Json<ApiResponse<WorkerTriggerResponse>>, ApiError> {
    trigger(&state, req_id.0, Worker::ScheduleTick).await
}

/// POST /api/v1/workers/collect-metrics
pub(super) async fn trigger_collect_metrics(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> Result<Json<ApiResponse<WorkerTriggerResponse>>, ApiError> {
    trigger(&state, req_id.0, Worker::CollectMetrics).await
}

/// POST /api/v1/workers/predict
pub(super) async fn trigger_predict(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> Result<Json<ApiResponse<WorkerTriggerResponse>>, ApiError> {
    trigger(&state, req_id.0, Worker::Predict).await
}

/// GET /api/v1/worker-runs — recent runs, newest first.
pub(super) async fn list_worker_runs(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(query): Query<WorkerRunQuery>,
) -> Result<Json<ApiResponse<Vec<WorkerRunItem>>>, ApiError> {
    let rid = &req_id.0;

    let rows = promopilot_db::list_worker_runs(&state.pool, normalize_limit(query.limit))
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?;

    Ok(Json(ApiResponse {
        data: rows.into_iter().map(WorkerRunItem::from).collect(),
        meta: ResponseMeta::new(req_id.0),
    }))
}
