//! # Adapter Boundary
//!
//! The seam between the dispatch core and a vendor-specific client (spec.md
//! §6). Grounded on the teacher's `Provider` trait: an `async_trait`, `Send +
//! Sync`, one fallible entry point. Vendor wire formats are explicitly out of
//! scope here — `normalized_request`/`normalized_response` are opaque JSON
//! values the handler layer is responsible for shaping.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

/// The error shape crossing the adapter boundary. The dispatch loop
/// classifies this into a `CoreError` — adapters never construct a
/// `CoreError` directly, keeping the core's taxonomy closed.
#[derive(Error, Debug, Clone)]
#[error("adapter error: {kind:?} (status={status_code:?}, retryable={retryable})")]
pub struct AdapterError {
    pub kind: AdapterErrorKind,
    pub retryable: bool,
    pub status_code: Option<u16>,
    pub retry_after_secs: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterErrorKind {
    Timeout,
    ServerError,
    RateLimited,
    ContentPolicy,
    InvalidRequest,
    Network,
    Unknown,
}

impl AdapterError {
    pub fn timeout() -> Self {
        Self { kind: AdapterErrorKind::Timeout, retryable: true, status_code: None, retry_after_secs: None }
    }

    pub fn server_error(status_code: u16) -> Self {
        Self { kind: AdapterErrorKind::ServerError, retryable: true, status_code: Some(status_code), retry_after_secs: None }
    }

    pub fn rate_limited(retry_after_secs: Option<u64>) -> Self {
        Self { kind: AdapterErrorKind::RateLimited, retryable: true, status_code: Some(429), retry_after_secs }
    }

    pub fn content_policy() -> Self {
        Self { kind: AdapterErrorKind::ContentPolicy, retryable: false, status_code: Some(400), retry_after_secs: None }
    }

    pub fn invalid_request(status_code: u16) -> Self {
        Self { kind: AdapterErrorKind::InvalidRequest, retryable: false, status_code: Some(status_code), retry_after_secs: None }
    }

    pub fn network() -> Self {
        Self { kind: AdapterErrorKind::Network, retryable: true, status_code: None, retry_after_secs: None }
    }
}

/// Outcome of a successful adapter invocation.
#[derive(Debug, Clone)]
pub struct AdapterResponse {
    pub body: Value,
    pub tokens: u64,
    pub size_bytes: u64,
}

/// A vendor-specific client the dispatch loop invokes through a sub-provider.
/// One implementation per vendor; the core never matches on vendor identity.
#[async_trait]
pub trait Adapter: Send + Sync {
    fn name(&self) -> &str;

    /// Invoke the upstream for `endpoint` with an already-normalized request
    /// body. The adapter itself is responsible for honoring `deadline` if it
    /// can do so more precisely than the dispatch loop's outer timeout (e.g.
    /// passing it through to an HTTP client's own request timeout); the
    /// dispatch loop always wraps the call in `tokio::time::timeout` as a
    /// backstop regardless.
    async fn invoke(
        &self,
        endpoint: &str,
        normalized_request: Value,
        deadline: std::time::Duration,
    ) -> Result<AdapterResponse, AdapterError>;
}
