//! HTTP client for the marketplace REST API.
//!
//! Wraps `reqwest` with bearer-token auth, typed response deserialization,
//! and bounded retry. Every call site gets the same error taxonomy: auth
//! failures surface immediately, transient failures (timeout, 5xx, 429) are
//! retried with back-off, and application errors carry the marketplace's
//! error envelope.

use std::time::Duration;

use reqwest::{Client, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::MarketError;
use crate::retry::retry_with_backoff;
use crate::types::{
    ActivatePromotion, CategoryPerformance, CategoryPerformancePage, CounterSnapshot, ItemDoc,
    ItemVisits, ItemsPage, PromotionAck,
};

const DEFAULT_BASE_URL: &str = "https://api.marketlink.example/v1/";

/// Items fetched per page when listing a seller's catalog.
const LIST_PAGE_SIZE: i64 = 50;
/// Hard cap on pages per listing scan, so a lying `paging.total` can't trap
/// the worker in an infinite loop.
const LIST_MAX_PAGES: usize = 40;

/// Client for the marketplace REST API.
///
/// Manages the HTTP client, bearer token, base URL, and retry policy. Use
/// [`MarketClient::new`] for production or [`MarketClient::with_base_url`]
/// to point at a mock server in tests.
pub struct MarketClient {
    client: Client,
    token: String,
    base_url: Url,
    max_retries: u32,
    backoff_base_ms: u64,
}

impl MarketClient {
    /// Creates a new client pointed at the production marketplace API.
    ///
    /// # Errors
    ///
    /// Returns [`MarketError::Http`] if the underlying `reqwest::Client`
    /// cannot be constructed.
    pub fn new(token: &str, timeout_secs: u64) -> Result<Self, MarketError> {
        Self::with_base_url(token, timeout_secs, DEFAULT_BASE_URL)
    }

    /// Creates a new client with a custom base URL (for testing with wiremock
    /// or for a staging marketplace).
    ///
    /// # Errors
    ///
    /// Returns [`MarketError::Http`] if the underlying `reqwest::Client`
    /// cannot be constructed, or [`MarketError::Api`] if `base_url` is not a
    /// valid URL.
    pub fn with_base_url(
        token: &str,
        timeout_secs: u64,
        base_url: &str,
    ) -> Result<Self, MarketError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .user_agent("promopilot/0.1 (campaign-scheduler)")
            .build()?;

        // Normalise: ensure the base URL ends with exactly one slash so that
        // Url::join appends path segments instead of replacing the last one.
        let normalised = format!("{}/", base_url.trim_end_matches('/'));
        let base_url = Url::parse(&normalised).map_err(|e| MarketError::Api {
            code: "invalid_base_url".to_owned(),
            message: format!("invalid base URL '{base_url}': {e}"),
        })?;

        Ok(Self {
            client,
            token: token.to_owned(),
            base_url,
            max_retries: 3,
            backoff_base_ms: 1_000,
        })
    }

    /// Overrides the default retry policy (3 retries, 1 s base back-off).
    #[must_use]
    pub fn with_retry_policy(mut self, max_retries: u32, backoff_base_ms: u64) -> Self {
        self.max_retries = max_retries;
        self.backoff_base_ms = backoff_base_ms;
        self
    }

    /// Fetches the seller's full item catalog, following pagination.
    ///
    /// # Errors
    ///
    /// Returns the first [`MarketError`] hit after retries are exhausted;
    /// a partial catalog is never returned.
    pub async fn list_items(&self, seller_id: i64) -> Result<Vec<ItemDoc>, MarketError> {
        let mut items: Vec<ItemDoc> = Vec::new();
        let mut offset: i64 = 0;

        for _ in 0..LIST_MAX_PAGES {
            let url = self.endpoint(
                &format!("sellers/{seller_id}/items"),
                &[
                    ("offset", &offset.to_string()),
                    ("limit", &LIST_PAGE_SIZE.to_string()),
                ],
            )?;
            let page: ItemsPage = self
                .get_json(&url, &format!("list_items(seller_id={seller_id}, offset={offset})"))
                .await?;

            let fetched = i64::try_from(page.results.len()).unwrap_or(0);
            items.extend(page.results);
            offset += fetched;

            if fetched == 0 || offset >= page.paging.total {
                return Ok(items);
            }
        }

        tracing::warn!(
            seller_id,
            fetched = items.len(),
            "catalog listing truncated at page cap"
        );
        Ok(items)
    }

    /// Fetches visit counts for one item over a trailing window of
    /// `window_days`, plus the window before it.
    ///
    /// # Errors
    ///
    /// Returns [`MarketError`] on auth, transport, or decode failure.
    pub async fn item_visits(
        &self,
        item_id: &str,
        window_days: u32,
    ) -> Result<ItemVisits, MarketError> {
        let url = self.endpoint(
            &format!("items/{item_id}/visits"),
            &[("window_days", &window_days.to_string())],
        )?;
        self.get_json(&url, &format!("item_visits(item_id={item_id})"))
            .await
    }

    /// Fetches per-category conversion rates across the seller's catalog.
    ///
    /// # Errors
    ///
    /// Returns [`MarketError`] on auth, transport, or decode failure.
    pub async fn category_performance(
        &self,
        seller_id: i64,
    ) -> Result<Vec<CategoryPerformance>, MarketError> {
        let url = self.endpoint(&format!("sellers/{seller_id}/categories/performance"), &[])?;
        let page: CategoryPerformancePage = self
            .get_json(&url, &format!("category_performance(seller_id={seller_id})"))
            .await?;
        Ok(page.results)
    }

    /// Activates a discount promotion on an item. The marketplace treats this
    /// as idempotent: re-activating an already-promoted item succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`MarketError`] on auth, transport, or decode failure, or the
    /// marketplace's error envelope for rejected promotions.
    pub async fn activate_promotion(
        &self,
        item_id: &str,
        request: &ActivatePromotion,
    ) -> Result<PromotionAck, MarketError> {
        let url = self.endpoint(&format!("promotions/items/{item_id}/activate"), &[])?;
        self.post_json(&url, request, &format!("activate_promotion(item_id={item_id})"))
            .await
    }

    /// Pauses the promotion on an item. Idempotent: pausing an item with no
    /// running promotion succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`MarketError`] on auth, transport, or decode failure.
    pub async fn pause_promotion(&self, item_id: &str) -> Result<PromotionAck, MarketError> {
        let url = self.endpoint(&format!("promotions/items/{item_id}/pause"), &[])?;
        self.post_json(&url, &serde_json::json!({}), &format!("pause_promotion(item_id={item_id})"))
            .await
    }

    /// Fetches the cumulative performance counters for one campaign.
    ///
    /// # Errors
    ///
    /// Returns [`MarketError`] on auth, transport, or decode failure.
    pub async fn campaign_counters(
        &self,
        campaign_ref: &str,
    ) -> Result<CounterSnapshot, MarketError> {
        let url = self.endpoint(&format!("promotions/campaigns/{campaign_ref}/counters"), &[])?;
        self.get_json(&url, &format!("campaign_counters(campaign_ref={campaign_ref})"))
            .await
    }

    /// Builds the full request URL with properly percent-encoded query
    /// parameters.
    fn endpoint(&self, path: &str, query: &[(&str, &str)]) -> Result<Url, MarketError> {
        let mut url = self.base_url.join(path).map_err(|e| MarketError::Api {
            code: "invalid_url".to_owned(),
            message: format!("cannot build endpoint '{path}': {e}"),
        })?;
        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (k, v) in query {
                pairs.append_pair(k, v);
            }
        }
        Ok(url)
    }

    /// GETs `url` with retry, asserts a 2xx status, and parses the body.
    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &Url,
        context: &str,
    ) -> Result<T, MarketError> {
        let body = retry_with_backoff(self.max_retries, self.backoff_base_ms, || async {
            let response = self
                .client
                .get(url.clone())
                .bearer_auth(&self.token)
                .send()
                .await?;
            Self::read_body(response).await
        })
        .await?;
        serde_json::from_str(&body).map_err(|e| MarketError::Deserialize {
            context: context.to_owned(),
            source: e,
        })
    }

    /// POSTs `payload` to `url` with retry. Safe to retry because the
    /// promotion endpoints are idempotent.
    async fn post_json<T: DeserializeOwned>(
        &self,
        url: &Url,
        payload: &impl Serialize,
        context: &str,
    ) -> Result<T, MarketError> {
        let body = retry_with_backoff(self.max_retries, self.backoff_base_ms, || async {
            let response = self
                .client
                .post(url.clone())
                .bearer_auth(&self.token)
                .json(payload)
                .send()
                .await?;
            Self::read_body(response).await
        })
        .await?;
        serde_json::from_str(&body).map_err(|e| MarketError::Deserialize {
            context: context.to_owned(),
            source: e,
        })
    }

    /// Classifies a response by status and returns the body of successful
    /// ones.
    async fn read_body(response: reqwest::Response) -> Result<String, MarketError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response.text().await?);
        }

        let body = response.text().await.unwrap_or_default();
        let message = extract_error_message(&body, status);

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(MarketError::Auth {
                status: status.as_u16(),
                message,
            });
        }
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(MarketError::RateLimited(message));
        }
        if status.is_server_error() {
            return Err(MarketError::Upstream {
                status: status.as_u16(),
                message,
            });
        }

        Err(MarketError::Api {
            code: extract_error_code(&body, status),
            message,
        })
    }
}

/// Pulls `error.message` from the marketplace error envelope, falling back
/// to the HTTP status line when the body is not an envelope.
fn extract_error_message(body: &str, status: StatusCode) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .as_ref()
        .and_then(|v| v.get("error"))
        .and_then(|e| e.get("message"))
        .and_then(serde_json::Value::as_str)
        .map_or_else(
            || status.canonical_reason().unwrap_or("unknown error").to_owned(),
            std::borrow::ToOwned::to_owned,
        )
}

fn extract_error_code(body: &str, status: StatusCode) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .as_ref()
        .and_then(|v| v.get("error"))
        .and_then(|e| e.get("code"))
        .and_then(serde_json::Value::as_str)
        .map_or_else(|| format!("http_{}", status.as_u16()), std::borrow::ToOwned::to_owned)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_client(base_url: &str) -> MarketClient {
        MarketClient::with_base_url("test-token", 30, base_url)
            .expect("client construction should not fail")
    }

    #[test]
    fn endpoint_appends_path_and_query() {
        let client = test_client("https://api.marketlink.example/v1");
        let url = client
            .endpoint("sellers/42/items", &[("offset", "0"), ("limit", "50")])
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.marketlink.example/v1/sellers/42/items?offset=0&limit=50"
        );
    }

    #[test]
    fn endpoint_strips_duplicate_trailing_slash() {
        let client = test_client("https://api.marketlink.example/v1///");
        let url = client.endpoint("items/MLA1/visits", &[]).unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.marketlink.example/v1/items/MLA1/visits"
        );
    }

    #[test]
    fn invalid_base_url_is_rejected() {
        let result = MarketClient::with_base_url("t", 30, "not a url");
        assert!(matches!(result, Err(MarketError::Api { ref code, .. }) if code == "invalid_base_url"));
    }

    #[test]
    fn error_message_extraction_prefers_envelope() {
        let body = r#"{"error": {"code": "item_not_found", "message": "no such item"}}"#;
        assert_eq!(
            extract_error_message(body, StatusCode::NOT_FOUND),
            "no such item"
        );
        assert_eq!(
            extract_error_code(body, StatusCode::NOT_FOUND),
            "item_not_found"
        );
    }

    #[test]
    fn error_message_extraction_falls_back_to_status() {
        assert_eq!(
            extract_error_message("plain text", StatusCode::NOT_FOUND),
            "Not Found"
        );
        assert_eq!(
            extract_error_code("plain text", StatusCode::NOT_FOUND),
            "http_404"
        );
    }
}
