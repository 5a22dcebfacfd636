mod campaigns;
mod metrics;
mod predictions;
mod schedules;
mod suggestions;
mod workers;

use axum::{
    extract::State,
    http::{header, HeaderName, Method, StatusCode},
    response::IntoResponse,
    routing::{get, patch, post},
    Extension, Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use uuid::Uuid;

use promopilot_engine::{EngineContext, EngineError};

use crate::middleware::{
    enforce_rate_limit, request_id, require_bearer_auth, AuthState, RateLimitState, RequestId,
};

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub engine: EngineContext,
}

#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub data: T,
    pub meta: ResponseMeta,
}

#[derive(Debug, Serialize)]
pub struct ResponseMeta {
    pub request_id: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: ErrorBody,
    pub meta: ResponseMeta,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
struct HealthData {
    status: &'static str,
    database: &'static str,
}

impl ResponseMeta {
    pub(super) fn new(request_id: String) -> Self {
        Self {
            request_id,
            timestamp: Utc::now(),
        }
    }
}

impl ApiError {
    pub fn new(
        request_id: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            error: ErrorBody {
                code: code.into(),
                message: message.into(),
            },
            meta: ResponseMeta::new(request_id.into()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = match self.error.code.as_str() {
            "not_found" => StatusCode::NOT_FOUND,
            "unauthorized" => StatusCode::UNAUTHORIZED,
            "bad_request" | "validation_error" => StatusCode::BAD_REQUEST,
            "conflict" => StatusCode::CONFLICT,
            "rate_limited" => StatusCode::TOO_MANY_REQUESTS,
            "upstream_error" => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(self)).into_response()
    }
}

pub(super) fn normalize_limit(limit: Option<i64>) -> i64 {
    limit.unwrap_or(50).clamp(1, 200)
}

pub(super) fn map_db_error(request_id: String, error: &promopilot_db::DbError) -> ApiError {
    if matches!(error, promopilot_db::DbError::NotFound) {
        return ApiError::new(request_id, "not_found", "no such row");
    }
    tracing::error!(error = %error, "database query failed");
    ApiError::new(request_id, "internal_error", "database query failed")
}

pub(super) fn map_market_error(request_id: String, error: &promopilot_market::MarketError) -> ApiError {
    tracing::error!(error = %error, "marketplace call failed");
    ApiError::new(
        request_id,
        "upstream_error",
        format!("marketplace call failed: {error}"),
    )
}

pub(super) fn map_engine_error(request_id: String, error: &EngineError) -> ApiError {
    match error {
        EngineError::AlreadyRunning(worker) => ApiError::new(
            request_id,
            "conflict",
            format!("worker '{worker}' is already running"),
        ),
        EngineError::Db(e) => map_db_error(request_id, e),
        EngineError::Market(e) => map_market_error(request_id, e),
    }
}

/// Resolve a campaign public id to its row, returning 404 when unknown and
/// 400 when the path segment is not a UUID at all.
pub(super) async fn resolve_campaign(
    pool: &PgPool,
    public_id: &str,
    request_id: &str,
) -> Result<promopilot_db::CampaignRow, ApiError> {
    let uuid = public_id.parse::<Uuid>().map_err(|_| {
        ApiError::new(
            request_id,
            "validation_error",
            format!("'{public_id}' is not a valid campaign id"),
        )
    })?;
    match promopilot_db::get_campaign_by_public_id(pool, uuid).await {
        Ok(row) => Ok(row),
        Err(promopilot_db::DbError::NotFound) => Err(ApiError::new(
            request_id,
            "not_found",
            format!("campaign '{public_id}' not found"),
        )),
        Err(e) => Err(map_db_error(request_id.to_owned(), &e)),
    }
}

fn build_cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
        ])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static("x-request-id"),
        ])
}

fn protected_router(auth: AuthState, rate_limit: RateLimitState) -> Router<AppState> {
    Router::new()
        .route(
            "/api/v1/campaigns",
            get(campaigns::list_campaigns).post(campaigns::create_campaign),
        )
        .route(
            "/api/v1/campaigns/{public_id}",
            get(campaigns::get_campaign)
                .patch(campaigns::update_campaign)
                .delete(campaigns::delete_campaign),
        )
        .route(
            "/api/v1/campaigns/{public_id}/state",
            patch(campaigns::override_campaign_state),
        )
        .route(
            "/api/v1/campaigns/{public_id}/schedules",
            get(schedules::list_schedules).post(schedules::create_schedule),
        )
        .route(
            "/api/v1/schedules/{id}",
            patch(schedules::update_schedule).delete(schedules::delete_schedule),
        )
        .route(
            "/api/v1/campaigns/{public_id}/metrics/summary",
            get(metrics::get_metrics_summary),
        )
        .route(
            "/api/v1/campaigns/{public_id}/metrics/hourly",
            get(metrics::list_hourly_rollups),
        )
        .route(
            "/api/v1/campaigns/{public_id}/metrics/daily",
            get(metrics::list_daily_rollups),
        )
        .route(
            "/api/v1/campaigns/{public_id}/predictions",
            get(predictions::list_predictions),
        )
        .route("/api/v1/suggestions", get(suggestions::list_suggestions))
        .route(
            "/api/v1/suggestions/refresh",
            post(suggestions::refresh_suggestions),
        )
        .route(
            "/api/v1/suggestions/{id}/apply",
            post(suggestions::apply_suggestion),
        )
        .route(
            "/api/v1/workers/schedule-tick",
            post(workers::trigger_schedule_tick),
        )
        .route(
            "/api/v1/workers/collect-metrics",
            post(workers::trigger_collect_metrics),
        )
        .route("/api/v1/workers/predict", post(workers::trigger_predict))
        .route("/api/v1/worker-runs", get(workers::list_worker_runs))
        .layer(
            ServiceBuilder::new()
                .layer(axum::middleware::from_fn_with_state(
                    rate_limit,
                    enforce_rate_limit,
                ))
                .layer(axum::middleware::from_fn_with_state(
                    auth,
                    require_bearer_auth,
                )),
        )
}

pub fn build_app(state: AppState, auth: AuthState, rate_limit: RateLimitState) -> Router {
    let public_routes = Router::new().route("/api/v1/health", get(health));

    Router::new()
        .merge(public_routes)
        .merge(protected_router(auth, rate_limit))
        .layer(
            ServiceBuilder::new()
                .layer(build_cors())
                .layer(axum::middleware::from_fn(request_id)),
        )
        .with_state(state)
}

async fn health(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> impl IntoResponse {
    let meta = ResponseMeta::new(req_id.0);

    match promopilot_db::health_check(&state.pool).await {
        Ok(()) => (
            StatusCode::OK,
            Json(ApiResponse {
                data: HealthData {
                    status: "ok",
                    database: "ok",
                },
                meta,
            }),
        ),
        Err(e) => {
            tracing::warn!(error = %e, "health check: database unavailable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ApiResponse {
                    data: HealthData {
                        status: "degraded",
                        database: "unavailable",
                    },
                    meta,
                }),
            )
        }
    }
}
