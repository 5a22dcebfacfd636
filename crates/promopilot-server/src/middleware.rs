//! HTTP boundary middleware: request-id propagation, bearer-token auth, and
//! a two-bucket fixed-window rate limit.
//!
//! Refusals reuse the handlers' error envelope (including the request id in
//! `meta`) so dashboard clients parse one shape everywhere.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tokio::sync::Mutex;
use uuid::Uuid;

use promopilot_core::{AppConfig, Environment};

use crate::api::ApiError;

const REQUEST_ID_HEADER: &str = "x-request-id";

/// Request id carried through extensions; handlers echo it in `meta`.
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

/// Bearer-token gate for the protected routes.
#[derive(Debug, Clone)]
pub struct AuthState {
    keys: Arc<HashSet<String>>,
    pub enabled: bool,
}

impl AuthState {
    /// Builds the gate from the validated application config
    /// (`PROMOPILOT_API_KEYS`, parsed at startup).
    ///
    /// # Errors
    ///
    /// Outside development, an empty key list refuses startup rather than
    /// serving an unauthenticated API.
    pub fn from_config(config: &AppConfig) -> anyhow::Result<Self> {
        Self::with_keys(
            config.api_keys.clone(),
            config.env == Environment::Development,
        )
    }

    /// Builds the gate from an explicit key list.
    ///
    /// # Errors
    ///
    /// See [`AuthState::from_config`]; development tolerates an empty list
    /// and runs with auth disabled.
    pub fn with_keys(keys: Vec<String>, is_development: bool) -> anyhow::Result<Self> {
        let keys: HashSet<String> = keys.into_iter().collect();

        if keys.is_empty() {
            if is_development {
                tracing::warn!("no API keys configured; bearer auth disabled for development");
                return Ok(Self {
                    keys: Arc::new(keys),
                    enabled: false,
                });
            }
            anyhow::bail!(
                "API keys are required outside development; set PROMOPILOT_API_KEYS"
            );
        }

        Ok(Self {
            keys: Arc::new(keys),
            enabled: true,
        })
    }

    fn allows(&self, token: &str) -> bool {
        self.keys.contains(token)
    }
}

/// Budgets for the fixed-window limiter. Worker triggers get their own,
/// much smaller bucket: each one launches a full engine batch against the
/// marketplace, so a burst of them is load in a way a burst of campaign
/// reads is not.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitPolicy {
    pub window: Duration,
    pub max_requests: usize,
    pub max_worker_triggers: usize,
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(60),
            max_requests: 120,
            max_worker_triggers: 6,
        }
    }
}

#[derive(Debug)]
struct FixedWindow {
    opened_at: Instant,
    admitted: usize,
}

impl FixedWindow {
    fn fresh() -> Self {
        Self {
            opened_at: Instant::now(),
            admitted: 0,
        }
    }

    fn admit(&mut self, window: Duration, budget: usize) -> bool {
        if self.opened_at.elapsed() >= window {
            self.opened_at = Instant::now();
            self.admitted = 0;
        }
        if self.admitted >= budget {
            return false;
        }
        self.admitted += 1;
        true
    }
}

/// Shared limiter state: one general bucket plus one for worker triggers.
#[derive(Debug, Clone)]
pub struct RateLimitState {
    policy: RateLimitPolicy,
    general: Arc<Mutex<FixedWindow>>,
    worker_triggers: Arc<Mutex<FixedWindow>>,
}

impl RateLimitState {
    #[must_use]
    pub fn new(policy: RateLimitPolicy) -> Self {
        Self {
            policy,
            general: Arc::new(Mutex::new(FixedWindow::fresh())),
            worker_triggers: Arc::new(Mutex::new(FixedWindow::fresh())),
        }
    }

    async fn admit(&self, path: &str) -> bool {
        if is_worker_trigger(path) {
            self.worker_triggers
                .lock()
                .await
                .admit(self.policy.window, self.policy.max_worker_triggers)
        } else {
            self.general
                .lock()
                .await
                .admit(self.policy.window, self.policy.max_requests)
        }
    }
}

/// Out-of-band worker triggers live under `/api/v1/workers/`. The run
/// listing at `/api/v1/worker-runs` is a plain read and stays in the
/// general bucket.
fn is_worker_trigger(path: &str) -> bool {
    path.starts_with("/api/v1/workers/")
}

/// Adopts the caller's `x-request-id` or mints a UUID, stores it as a
/// [`RequestId`] extension, and echoes it on the response.
pub async fn request_id(mut req: Request, next: Next) -> Response {
    let id = match req
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
    {
        Some(v) => v.to_owned(),
        None => Uuid::new_v4().to_string(),
    };
    req.extensions_mut().insert(RequestId(id.clone()));

    let mut res = next.run(req).await;
    if let Ok(value) = HeaderValue::from_str(&id) {
        res.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    res
}

/// Enforces bearer auth when the gate is enabled.
pub async fn require_bearer_auth(
    State(auth): State<AuthState>,
    req: Request,
    next: Next,
) -> Response {
    if !auth.enabled {
        return next.run(req).await;
    }

    match bearer_token(&req) {
        Some(token) if auth.allows(token) => next.run(req).await,
        _ => refuse(&req, "unauthorized", "missing or invalid bearer token"),
    }
}

/// Enforces the fixed-window limit, bucketed by route class.
pub async fn enforce_rate_limit(
    State(limiter): State<RateLimitState>,
    req: Request,
    next: Next,
) -> Response {
    if limiter.admit(req.uri().path()).await {
        return next.run(req).await;
    }
    refuse(&req, "rate_limited", "rate limit exceeded; retry later")
}

fn bearer_token(req: &Request) -> Option<&str> {
    req.headers()
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

fn refuse(req: &Request, code: &'static str, message: &'static str) -> Response {
    let request_id = req
        .extensions()
        .get::<RequestId>()
        .map_or_else(String::new, |id| id.0.clone());
    ApiError::new(request_id, code, message).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    fn keys(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn auth_disables_without_keys_in_development() {
        let auth = AuthState::with_keys(vec![], true).expect("dev tolerates no keys");
        assert!(!auth.enabled);
    }

    #[test]
    fn auth_refuses_to_start_unkeyed_outside_development() {
        assert!(AuthState::with_keys(vec![], false).is_err());
    }

    #[test]
    fn auth_accepts_only_configured_keys() {
        let auth = AuthState::with_keys(keys(&["alpha", "beta"]), false).expect("keyed auth");
        assert!(auth.enabled);
        assert!(auth.allows("alpha"));
        assert!(auth.allows("beta"));
        assert!(!auth.allows("gamma"));
    }

    #[test]
    fn bearer_token_requires_the_bearer_scheme() {
        let req = Request::builder()
            .header(AUTHORIZATION, "Bearer token-1")
            .body(Body::empty())
            .unwrap();
        assert_eq!(bearer_token(&req), Some("token-1"));

        let req = Request::builder()
            .header(AUTHORIZATION, "Basic abc123")
            .body(Body::empty())
            .unwrap();
        assert_eq!(bearer_token(&req), None);

        let req = Request::builder().body(Body::empty()).unwrap();
        assert_eq!(bearer_token(&req), None);
    }

    #[test]
    fn run_listing_is_not_a_worker_trigger() {
        assert!(is_worker_trigger("/api/v1/workers/schedule-tick"));
        assert!(is_worker_trigger("/api/v1/workers/collect-metrics"));
        assert!(!is_worker_trigger("/api/v1/worker-runs"));
        assert!(!is_worker_trigger("/api/v1/campaigns"));
    }

    #[tokio::test]
    async fn worker_triggers_draw_from_their_own_smaller_bucket() {
        let limiter = RateLimitState::new(RateLimitPolicy {
            window: Duration::from_secs(60),
            max_requests: 100,
            max_worker_triggers: 2,
        });
        assert!(limiter.admit("/api/v1/workers/schedule-tick").await);
        assert!(limiter.admit("/api/v1/workers/predict").await);
        assert!(!limiter.admit("/api/v1/workers/collect-metrics").await);

        // The worker spend leaves the general bucket untouched.
        assert!(limiter.admit("/api/v1/campaigns").await);
    }

    #[tokio::test]
    async fn general_bucket_refuses_past_its_budget() {
        let limiter = RateLimitState::new(RateLimitPolicy {
            window: Duration::from_secs(60),
            max_requests: 3,
            max_worker_triggers: 1,
        });
        for _ in 0..3 {
            assert!(limiter.admit("/api/v1/campaigns").await);
        }
        assert!(!limiter.admit("/api/v1/suggestions").await);
    }

    #[tokio::test]
    async fn window_rollover_restores_the_budget() {
        let limiter = RateLimitState::new(RateLimitPolicy {
            window: Duration::from_millis(20),
            max_requests: 1,
            max_worker_triggers: 1,
        });
        assert!(limiter.admit("/api/v1/campaigns").await);
        assert!(!limiter.admit("/api/v1/campaigns").await);

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(limiter.admit("/api/v1/campaigns").await);
    }
}
