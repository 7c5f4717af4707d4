//! # Authentication
//!
//! `Authorization: Bearer <api-key>` compared by one-way hash — the hash
//! function and salt are configured once at startup, there is no per-key
//! rotation endpoint (spec.md §6). Client IP is read from `CF-Connecting-IP`
//! with an `"unknown"` fallback, matching the teacher's `auth.rs` extraction
//! style.

use axum::http::HeaderMap;
use sha2::{Digest, Sha256};

use crate::gateway_error::GatewayError;

/// One-way, salted hash of an API key. Salt is fixed per deployment (an env
/// var or config value), never rotated at request time.
pub fn hash_api_key(key: &str, salt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(key.as_bytes());
    hex::encode(hasher.finalize())
}

/// Extracts and hashes the bearer token from `Authorization`. Returns the
/// hash, never the plaintext key, so callers never need to handle it again.
pub fn extract_api_key_hash(headers: &HeaderMap, salt: &str) -> Result<String, GatewayError> {
    let header = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| GatewayError::Auth { message: "missing Authorization header".into() })?;

    let key = header
        .strip_prefix("Bearer ")
        .ok_or_else(|| GatewayError::Auth { message: "Authorization header must use the Bearer scheme".into() })?;

    if key.is_empty() {
        return Err(GatewayError::Auth { message: "empty bearer token".into() });
    }

    Ok(hash_api_key(key, salt))
}

/// Reads `CF-Connecting-IP`, falling back to `"unknown"` when absent — the
/// gateway is assumed to sit behind a proxy that always sets it in
/// production, but never panics when it doesn't (spec.md §6).
pub fn client_ip(headers: &HeaderMap) -> String {
    headers
        .get("CF-Connecting-IP")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn hashing_is_deterministic_and_salted() {
        let a = hash_api_key("sk-test", "salt1");
        let b = hash_api_key("sk-test", "salt1");
        let c = hash_api_key("sk-test", "salt2");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn missing_authorization_header_is_rejected() {
        let headers = HeaderMap::new();
        assert!(extract_api_key_hash(&headers, "salt").is_err());
    }

    #[test]
    fn non_bearer_scheme_is_rejected() {
        let mut headers = HeaderMap::new();
        headers.insert(axum::http::header::AUTHORIZATION, HeaderValue::from_static("Basic abc123"));
        assert!(extract_api_key_hash(&headers, "salt").is_err());
    }

    #[test]
    fn client_ip_falls_back_to_unknown() {
        let headers = HeaderMap::new();
        assert_eq!(client_ip(&headers), "unknown");
    }

    #[test]
    fn client_ip_reads_cf_connecting_ip() {
        let mut headers = HeaderMap::new();
        headers.insert("CF-Connecting-IP", HeaderValue::from_static("203.0.113.5"));
        assert_eq!(client_ip(&headers), "203.0.113.5");
    }
}
