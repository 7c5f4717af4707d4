//! The shared authenticate → authorize → dispatch → account pipeline every
//! endpoint handler runs.

use std::sync::Arc;

use axum::http::HeaderMap;
use axum::Json;
use serde_json::Value;

use relay_sdk::entities::ApiRequest;
use relay_sdk::error::CoreError;
use relay_sdk::{accounting, dispatch, gate};

use crate::auth::{client_ip, extract_api_key_hash, hash_api_key};
use crate::gateway_error::GatewayError;
use crate::moderation::ModerationVerdict;
use crate::server::AppState;

/// Runs the full pipeline for one request body against `endpoint`.
///
/// The token estimate used for the credit pre-check is derived from the
/// request body's own shape (character count, non-text content parts — see
/// `gate::estimate_tokens_from_request`); the accounting finalizer bills the
/// actual token count the adapter reports. `moderate` gates whether the
/// moderation predicate runs before dispatch — only endpoints that carry
/// free-form content need it.
pub async fn handle(
    state: Arc<AppState>,
    headers: HeaderMap,
    endpoint: &str,
    body: Value,
    moderate: bool,
) -> Result<Json<Value>, GatewayError> {
    let ip = client_ip(&headers);
    let key_hash = extract_api_key_hash(&headers, &state.auth_salt)?;

    let mut user = state
        .repository
        .find_user_by_api_key_hash(&key_hash)
        .await
        .map_err(|e| GatewayError::Auth { message: e.to_string() })?
        .ok_or_else(|| GatewayError::Auth { message: "unknown api key".into() })?;

    let model = body
        .get("model")
        .and_then(|v| v.as_str())
        .ok_or_else(|| GatewayError::InvalidRequest { message: "request body must include a \"model\" field".into() })?
        .to_string();

    let plan_allowance = state
        .config
        .plans
        .get(plan_key(user.plan))
        .map(|p| p.credit_allowance)
        .unwrap_or(user.credits);
    user.maybe_reset_credits(chrono::Utc::now(), plan_allowance);
    state
        .repository
        .save_user(user.clone())
        .await
        .map_err(|e| GatewayError::Core(CoreError::Internal { message: e.to_string() }))?;

    let allowed_models = state
        .config
        .auth
        .api_keys
        .iter()
        .find(|k| user.api_key_hashes.contains(&hash_api_key(&k.key, &state.auth_salt)))
        .map(|k| k.allowed_models.clone())
        .unwrap_or_default();

    gate::authorize_model(&user, &model, &allowed_models, &ip).map_err(GatewayError::Core)?;

    if moderate {
        let content = extract_moderatable_content(&body);
        if state.moderation.check(&user.id, &model, &content).await == ModerationVerdict::Flagged {
            state.metrics.record_moderation_flag();
            let mut flagged_request = ApiRequest::create(user.id.clone(), endpoint.to_string(), "POST".into(), model.clone());
            flagged_request.fail(400, 0, 0);
            let _ = state.repository.record_request(flagged_request.clone()).await;
            state.notifier.notify_flagged(&user.id, &model, &flagged_request.id).await;
            return Err(GatewayError::InvalidRequest { message: "content rejected by moderation policy".into() });
        }
    }

    let estimated_tokens = gate::estimate_tokens_from_request(&body);
    let estimated_credits = gate::estimate_credits(state.pricing, estimated_tokens);
    gate::authorize_credits(&user, estimated_credits).map_err(GatewayError::Core)?;

    let mut request = ApiRequest::create(user.id.clone(), endpoint.to_string(), "POST".into(), model.clone());
    state
        .repository
        .record_request(request.clone())
        .await
        .map_err(|e| GatewayError::Core(CoreError::Internal { message: e.to_string() }))?;

    let dispatch_result = dispatch::dispatch(
        &state.registry,
        state.adapter.as_ref(),
        &mut request,
        endpoint,
        body,
        estimated_tokens,
        state.config.server.request_timeout,
    )
    .await;

    let (outcome, actual_credits) = match dispatch_result {
        Ok(outcome) => {
            let credits = gate::estimate_credits(state.pricing, outcome.response.tokens);
            request.complete(
                outcome.response.tokens,
                credits,
                outcome.latency_ms,
                outcome.response.size_bytes,
                200,
                Some(outcome.provider_id.clone()),
                Some(outcome.sub_provider_id.clone()),
            );
            (Ok(outcome.response.body), credits)
        }
        Err(core_err) => {
            match &core_err {
                CoreError::UpstreamTimeout => request.timeout(state.config.server.request_timeout.as_millis() as u64),
                other => request.fail(status_hint(other), 0, request.retry_count),
            }
            (Err(core_err), 0)
        }
    };

    let finalize_result = accounting::finalize(state.repository.as_ref(), request.clone(), &user.id, actual_credits)
        .await
        .map_err(GatewayError::Core)?;
    if finalize_result.overrun {
        state.metrics.record_billing_overrun();
    }

    outcome.map(Json).map_err(GatewayError::Core)
}

fn plan_key(plan: relay_sdk::entities::Plan) -> &'static str {
    match plan {
        relay_sdk::entities::Plan::Daily => "daily",
        relay_sdk::entities::Plan::Weekly => "weekly",
        relay_sdk::entities::Plan::Monthly => "monthly",
    }
}

/// Mirrors `gateway_error::http_mapping` so the persisted `ApiRequest`'s
/// `status_code` matches what the client actually received, except
/// `Upstream5xx` keeps the vendor's own reported code for audit purposes.
fn status_hint(err: &CoreError) -> u16 {
    match err {
        CoreError::Upstream5xx { status_code } => *status_code,
        CoreError::UpstreamRateLimited { .. } => 503,
        _ => 500,
    }
}

fn extract_moderatable_content(body: &Value) -> String {
    if let Some(input) = body.get("input").and_then(|v| v.as_str()) {
        return input.to_string();
    }
    if let Some(messages) = body.get("messages").and_then(|v| v.as_array()) {
        return messages
            .iter()
            .filter_map(|m| m.get("content").and_then(|c| c.as_str()))
            .collect::<Vec<_>>()
            .join("\n");
    }
    String::new()
}
