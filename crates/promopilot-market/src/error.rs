use thiserror::Error;

/// Errors returned by the marketplace API client.
#[derive(Debug, Error)]
pub enum MarketError {
    /// Network or TLS failure from the underlying HTTP client.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The marketplace rejected the bearer credential (401/403). Never
    /// retried here — token refresh is owned by the auth layer.
    #[error("marketplace rejected credentials ({status}): {message}")]
    Auth { status: u16, message: String },

    /// HTTP 429. Retriable after back-off.
    #[error("marketplace rate limit hit: {0}")]
    RateLimited(String),

    /// HTTP 5xx from the marketplace. Retriable.
    #[error("marketplace upstream error ({status}): {message}")]
    Upstream { status: u16, message: String },

    /// A 4xx with the marketplace's `{"error": {code, message}}` envelope.
    /// Application-level; retrying won't fix it.
    #[error("marketplace API error [{code}]: {message}")]
    Api { code: String, message: String },

    /// The response body could not be deserialized into the expected type.
    #[error("JSON deserialization error for {context}: {source}")]
    Deserialize {
        context: String,
        #[source]
        source: serde_json::Error,
    },
}
