//! # Gateway Error → HTTP Mapping
//!
//! Wraps the core's `CoreError` plus a handful of gateway-local variants and
//! implements axum's `IntoResponse`, mapping each to the status code spec.md
//! §6/§7 specifies. §6's table only names seven codes (400/401/402/403/404/
//! 408/500); §7 says upstream errors default to 500 "unless the classifier
//! maps them", naming `upstream_rate_limited → 503` with a `Retry-After` as
//! the one explicit example. This is the only place in the codebase that
//! translates a `CoreError` variant into an HTTP status.

use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use relay_sdk::error::{AuthorizationDenial, CoreError};

#[derive(Error, Debug, Clone)]
pub enum GatewayError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("authentication failed: {message}")]
    Auth { message: String },

    #[error("invalid configuration: {message}")]
    Config { message: String },

    #[error("request body could not be parsed: {message}")]
    InvalidRequest { message: String },
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let (status, error_type) = self.http_mapping();
        let body = Json(json!({
            "error": {
                "message": self.to_string(),
                "type": error_type,
                "code": status.as_u16(),
            }
        }));
        let mut response = (status, body).into_response();
        if let GatewayError::Core(CoreError::UpstreamRateLimited { retry_after_secs: Some(secs) }) = &self {
            if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
                response.headers_mut().insert(HeaderName::from_static("retry-after"), value);
            }
        }
        response
    }
}

impl GatewayError {
    fn http_mapping(&self) -> (StatusCode, &'static str) {
        match self {
            GatewayError::Auth { .. } => (StatusCode::UNAUTHORIZED, "authentication_error"),
            GatewayError::Config { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "config_error"),
            GatewayError::InvalidRequest { .. } => (StatusCode::BAD_REQUEST, "invalid_request_error"),
            GatewayError::Core(core) => match core {
                CoreError::Validation { .. } | CoreError::Parse { .. } => (StatusCode::BAD_REQUEST, "invalid_request_error"),
                CoreError::Authentication { .. } => (StatusCode::UNAUTHORIZED, "authentication_error"),
                CoreError::Authorization { reason } => match reason {
                    AuthorizationDenial::Disabled | AuthorizationDenial::PlanExpired | AuthorizationDenial::IpBlocked => {
                        (StatusCode::FORBIDDEN, "permission_error")
                    }
                    AuthorizationDenial::ModelNotAllowed => (StatusCode::FORBIDDEN, "permission_error"),
                },
                CoreError::InsufficientCredits => (StatusCode::PAYMENT_REQUIRED, "insufficient_credits"),
                CoreError::NotFound { .. } => (StatusCode::NOT_FOUND, "not_found_error"),
                CoreError::UpstreamTimeout => (StatusCode::REQUEST_TIMEOUT, "timeout_error"),
                // The one explicit remap §7 names: upstream rate limiting
                // surfaces to the client as 503 with Retry-After, not 429 —
                // the client didn't exceed its own quota, the vendor did.
                CoreError::UpstreamRateLimited { .. } => (StatusCode::SERVICE_UNAVAILABLE, "upstream_error"),
                // Everything else upstream-shaped falls through to the §7
                // default rather than inventing additional status codes
                // §6's table doesn't name.
                CoreError::UpstreamContentPolicy
                | CoreError::Upstream5xx { .. }
                | CoreError::NoProvidersAvailable
                | CoreError::CapacityExhausted
                | CoreError::Internal { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insufficient_credits_maps_to_payment_required() {
        let err = GatewayError::Core(CoreError::InsufficientCredits);
        assert_eq!(err.http_mapping().0, StatusCode::PAYMENT_REQUIRED);
    }

    #[test]
    fn rate_limited_maps_to_503() {
        let err = GatewayError::Core(CoreError::UpstreamRateLimited { retry_after_secs: Some(1) });
        assert_eq!(err.http_mapping().0, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn rate_limited_response_carries_retry_after_header() {
        let err = GatewayError::Core(CoreError::UpstreamRateLimited { retry_after_secs: Some(7) });
        let response = err.into_response();
        assert_eq!(response.headers().get("retry-after").unwrap(), "7");
    }

    #[test]
    fn no_providers_available_maps_to_internal_server_error() {
        let err = GatewayError::Core(CoreError::NoProvidersAvailable);
        assert_eq!(err.http_mapping().0, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn upstream_timeout_maps_to_request_timeout() {
        let err = GatewayError::Core(CoreError::UpstreamTimeout);
        assert_eq!(err.http_mapping().0, StatusCode::REQUEST_TIMEOUT);
    }
}
