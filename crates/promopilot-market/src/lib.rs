//! HTTP client for the marketplace catalog, visits, and promotion APIs.
//!
//! Everything the engine knows about the outside marketplace goes through
//! [`MarketClient`]. The client owns bearer-token auth, bounded retry with
//! back-off for transient failures, and typed deserialization of the wire
//! formats in [`types`].

mod client;
mod error;
mod retry;
pub mod types;

pub use client::MarketClient;
pub use error::MarketError;
