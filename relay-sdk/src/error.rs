//! # Core Error Taxonomy
//!
//! The dispatch core speaks in tagged error *kinds*, not exception classes:
//! every failure the gate, load balancer, dispatch loop or accounting
//! finalizer can produce is one variant of [`CoreError`]. The dispatch loop's
//! retry decision is a pure function of the variant ([`CoreError::is_retryable`]);
//! nothing downstream needs to inspect a wrapped vendor error to decide
//! whether to rotate providers.

use thiserror::Error;

/// Errors produced by the dispatch core.
///
/// Every variant maps to exactly one HTTP status at the gateway boundary
/// (see `relay_gateway::gateway_error`); this enum itself carries no HTTP
/// knowledge.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoreError {
    /// Malformed request body or parameters.
    #[error("validation failed: {message}")]
    Validation { message: String },

    /// The request could not be parsed at all.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Caller could not be authenticated (bad or missing API key).
    #[error("authentication failed: {message}")]
    Authentication { message: String },

    /// Caller is authenticated but not authorized for this operation.
    #[error("authorization denied: {reason}")]
    Authorization { reason: AuthorizationDenial },

    /// The user's credit balance is insufficient for the estimated cost.
    #[error("insufficient credits")]
    InsufficientCredits,

    /// Referenced entity (user, provider, request) does not exist.
    #[error("not found: {what}")]
    NotFound { what: String },

    /// An adapter call exceeded its deadline.
    #[error("upstream timeout")]
    UpstreamTimeout,

    /// An adapter reported a 5xx-equivalent failure.
    #[error("upstream server error: {status_code}")]
    Upstream5xx { status_code: u16 },

    /// An adapter reported rate limiting, optionally with a retry hint.
    #[error("upstream rate limited")]
    UpstreamRateLimited { retry_after_secs: Option<u64> },

    /// An adapter rejected the request on content-policy grounds.
    #[error("upstream content policy rejection")]
    UpstreamContentPolicy,

    /// No provider/sub-provider pair could be selected for this request.
    #[error("no providers available")]
    NoProvidersAvailable,

    /// Every admissible sub-provider was at capacity.
    #[error("capacity exhausted")]
    CapacityExhausted,

    /// Anything else — logged with full context, surfaced generically.
    #[error("internal error: {message}")]
    Internal { message: String },
}

/// Why the authorization gate denied a request (spec.md §4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthorizationDenial {
    Disabled,
    PlanExpired,
    ModelNotAllowed,
    IpBlocked,
}

impl std::fmt::Display for AuthorizationDenial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AuthorizationDenial::Disabled => "disabled",
            AuthorizationDenial::PlanExpired => "plan_expired",
            AuthorizationDenial::ModelNotAllowed => "model_not_allowed",
            AuthorizationDenial::IpBlocked => "ip_blocked",
        };
        f.write_str(s)
    }
}

impl CoreError {
    /// Retry policy per spec.md §7: only these four kinds are retryable, and
    /// retrying means rotating providers, never a same-provider backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CoreError::UpstreamTimeout
                | CoreError::Upstream5xx { .. }
                | CoreError::UpstreamRateLimited { .. }
                | CoreError::CapacityExhausted
        )
    }
}
