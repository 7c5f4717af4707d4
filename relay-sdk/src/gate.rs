//! # Quota & Authorization Gate
//!
//! The admission check that runs before a request ever reaches the load
//! balancer (spec.md §4.1): is the caller enabled, on an unexpired plan,
//! allowed to use the requested model, not IP-blocked, and carrying enough
//! credits for the estimated cost.

use tracing::debug;

use crate::entities::User;
use crate::error::{AuthorizationDenial, CoreError};

/// Per-model, per-token pricing the estimator consults. A flat per-request
/// floor plus a per-1k-token rate, matching spec.md §4.1's "estimate before
/// debit" requirement without needing a live upstream quote.
#[derive(Debug, Clone, Copy)]
pub struct ModelPricing {
    pub base_credits: u64,
    pub credits_per_1k_tokens: u64,
}

impl Default for ModelPricing {
    fn default() -> Self {
        Self { base_credits: 1, credits_per_1k_tokens: 1 }
    }
}

/// `estimateCredits` — a conservative upper bound, never an exact charge
/// (spec.md §4.1). The accounting finalizer reconciles against actual usage.
pub fn estimate_credits(pricing: ModelPricing, estimated_tokens: u64) -> u64 {
    pricing.base_credits + (estimated_tokens * pricing.credits_per_1k_tokens).div_ceil(1000)
}

/// Derives a token estimate from a request body's shape alone, with no
/// tokenizer in the loop (spec.md §4.1): roughly one token per four
/// characters of text, ten tokens per non-text item (an image, an audio
/// clip, any content part that isn't a plain string). Walks the whole JSON
/// body so it works across `messages`, `input`, `prompt`, and similar shapes
/// without the gate needing per-endpoint knowledge of the request schema.
pub fn estimate_tokens_from_request(body: &serde_json::Value) -> u64 {
    let mut text_chars: u64 = 0;
    let mut non_text_items: u64 = 0;
    walk(body, &mut text_chars, &mut non_text_items);
    text_chars.div_ceil(4) + non_text_items * 10
}

fn walk(value: &serde_json::Value, text_chars: &mut u64, non_text_items: &mut u64) {
    match value {
        serde_json::Value::String(s) => *text_chars += s.chars().count() as u64,
        serde_json::Value::Array(items) => {
            for item in items {
                walk(item, text_chars, non_text_items);
            }
        }
        serde_json::Value::Object(map) => {
            if is_non_text_content_part(map) {
                *non_text_items += 1;
                return;
            }
            for value in map.values() {
                walk(value, text_chars, non_text_items);
            }
        }
        _ => {}
    }
}

/// A content-part object is non-text when it declares a `type` other than
/// `"text"` (the OpenAI content-part convention: `image_url`, `input_audio`,
/// `input_image`, …) — its string fields (URLs, base64 payloads) are not
/// prose and shouldn't be charged per character.
fn is_non_text_content_part(map: &serde_json::Map<String, serde_json::Value>) -> bool {
    match map.get("type").and_then(|t| t.as_str()) {
        Some("text") => false,
        Some(_) => true,
        None => false,
    }
}

/// `authorizeModel` — is `user` allowed to call `model` at all, independent of
/// credits.
pub fn authorize_model(user: &User, model: &str, allowed_models: &[String], client_ip: &str) -> Result<(), CoreError> {
    if !user.enabled {
        return Err(CoreError::Authorization { reason: AuthorizationDenial::Disabled });
    }
    if let Some(expires_at) = user.plan_expires_at {
        if chrono::Utc::now() > expires_at {
            return Err(CoreError::Authorization { reason: AuthorizationDenial::PlanExpired });
        }
    }
    if !user.ip_whitelist.is_empty() && !user.ip_whitelist.iter().any(|ip| ip == client_ip) {
        return Err(CoreError::Authorization { reason: AuthorizationDenial::IpBlocked });
    }
    if !allowed_models.is_empty() && !allowed_models.iter().any(|m| m == model) {
        return Err(CoreError::Authorization { reason: AuthorizationDenial::ModelNotAllowed });
    }
    debug!(user_id = %user.id, model, "model authorization granted");
    Ok(())
}

/// `authorizeCredits` — does `user` have at least `estimated_credits`
/// available right now. Read-only: the actual debit happens in the
/// accounting finalizer after a successful dispatch, per spec.md §4.6.
pub fn authorize_credits(user: &User, estimated_credits: u64) -> Result<(), CoreError> {
    if user.credits < estimated_credits as i64 {
        return Err(CoreError::InsufficientCredits);
    }
    Ok(())
}
