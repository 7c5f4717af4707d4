//! # Dispatch Loop
//!
//! Drives a single `ApiRequest` from `Processing` to a terminal state: select
//! a provider/sub-provider pair, reserve capacity, invoke the adapter under a
//! deadline, record the outcome, release capacity, and — on a retryable
//! failure — exclude the provider and try again, up to `MAX_ATTEMPTS` (spec.md
//! §4.5). Exclusion is provider-level only: a different sub-provider under
//! the same excluded provider is never retried in the same request.

use std::time::{Duration, Instant};

use tracing::{error, info, warn};

use crate::adapter::{Adapter, AdapterErrorKind, AdapterResponse};
use crate::capacity::ReservationDenial;
use crate::entities::ApiRequest;
use crate::error::CoreError;
use crate::health;
use crate::registry::Registry;
use crate::routing::{self, SelectionError};

/// Hard ceiling on dispatch attempts for a single request (spec.md §4.5).
pub const MAX_ATTEMPTS: u32 = 10;

pub struct DispatchOutcome {
    pub response: AdapterResponse,
    pub provider_id: String,
    pub sub_provider_id: String,
    pub latency_ms: u64,
    pub attempts: u32,
}

/// Runs the full retry-with-exclusion loop for one request.
///
/// `deadline` bounds each individual adapter call, not the loop as a whole —
/// spec.md §4.5 specifies per-attempt deadlines, with `MAX_ATTEMPTS` as the
/// only bound on total loop duration.
pub async fn dispatch(
    registry: &Registry,
    adapter: &dyn Adapter,
    request: &mut ApiRequest,
    endpoint: &str,
    normalized_request: serde_json::Value,
    estimated_tokens: u64,
    deadline: Duration,
) -> Result<DispatchOutcome, CoreError> {
    request.start_processing();

    let mut excluded_providers: Vec<String> = Vec::new();
    let mut last_error = CoreError::NoProvidersAvailable;

    for attempt in 1..=MAX_ATTEMPTS {
        request.retry_count = attempt - 1;

        let selection = match routing::select_provider_and_sub_provider(registry, &request.model, &excluded_providers).await {
            Ok(s) => s,
            Err(SelectionError::NoProvidersAvailable) => {
                warn!(request_id = %request.id, user_id = %request.user_id, model = %request.model, attempt, "no providers available");
                last_error = CoreError::NoProvidersAvailable;
                break;
            }
        };

        let Some(sub_entry) = registry.sub_provider_entry(&selection.sub_provider_id) else {
            excluded_providers.push(selection.provider_id);
            continue;
        };

        if !sub_entry.breaker.is_available().await {
            warn!(request_id = %request.id, provider_id = %selection.provider_id, sub_provider_id = %selection.sub_provider_id, attempt, "circuit open, excluding provider");
            excluded_providers.push(selection.provider_id);
            continue;
        }

        let reservation = match sub_entry.capacity.reserve(&selection.sub_provider_id, estimated_tokens as u32).await {
            Ok(r) => r,
            Err(ReservationDenial::RequestsPerMinuteExceeded)
            | Err(ReservationDenial::TokensPerMinuteExceeded)
            | Err(ReservationDenial::ConcurrencyExceeded) => {
                warn!(request_id = %request.id, provider_id = %selection.provider_id, sub_provider_id = %selection.sub_provider_id, attempt, "capacity exhausted, excluding provider");
                last_error = CoreError::CapacityExhausted;
                excluded_providers.push(selection.provider_id);
                continue;
            }
        };
        sub_entry.breaker.record_attempt_started().await;

        let started = Instant::now();
        let call = adapter.invoke(endpoint, normalized_request.clone(), deadline);
        let outcome = tokio::time::timeout(deadline, call).await;
        let latency_ms = started.elapsed().as_millis() as u64;

        // Record the outcome before releasing capacity (spec.md §5): a
        // concurrent selector must never observe freed capacity on a
        // sub-provider whose health/breaker state hasn't caught up yet.
        match outcome {
            Err(_elapsed) => {
                error!(request_id = %request.id, user_id = %request.user_id, model = %request.model, attempt, provider_id = %selection.provider_id, "adapter call timed out");
                sub_entry.breaker.record_error().await;
                record_provider_failure(registry, &selection.provider_id).await;
                sub_entry.capacity.release(reservation).await;
                last_error = CoreError::UpstreamTimeout;
                excluded_providers.push(selection.provider_id);
            }
            Ok(Err(adapter_err)) => {
                error!(request_id = %request.id, user_id = %request.user_id, model = %request.model, attempt, provider_id = %selection.provider_id, kind = ?adapter_err.kind, "adapter call failed");
                sub_entry.breaker.record_error().await;
                record_provider_failure(registry, &selection.provider_id).await;
                sub_entry.capacity.release(reservation).await;
                last_error = classify(&adapter_err);
                if !adapter_err.retryable {
                    return Err(last_error);
                }
                excluded_providers.push(selection.provider_id);
            }
            Ok(Ok(response)) => {
                sub_entry.breaker.record_success().await;
                record_provider_success(registry, &selection.provider_id, latency_ms).await;
                touch_last_used(registry, &selection.sub_provider_id).await;
                sub_entry.capacity.release(reservation).await;
                info!(request_id = %request.id, user_id = %request.user_id, model = %request.model, attempt, provider_id = %selection.provider_id, sub_provider_id = %selection.sub_provider_id, latency_ms, "dispatch succeeded");
                return Ok(DispatchOutcome {
                    response,
                    provider_id: selection.provider_id,
                    sub_provider_id: selection.sub_provider_id,
                    latency_ms,
                    attempts: attempt,
                });
            }
        }
    }

    request.retry_count = MAX_ATTEMPTS;
    Err(last_error)
}

fn classify(err: &crate::adapter::AdapterError) -> CoreError {
    match err.kind {
        AdapterErrorKind::Timeout => CoreError::UpstreamTimeout,
        AdapterErrorKind::ServerError => CoreError::Upstream5xx { status_code: err.status_code.unwrap_or(502) },
        AdapterErrorKind::RateLimited => CoreError::UpstreamRateLimited { retry_after_secs: err.retry_after_secs },
        AdapterErrorKind::ContentPolicy => CoreError::UpstreamContentPolicy,
        AdapterErrorKind::InvalidRequest => CoreError::Validation { message: "adapter rejected request".into() },
        AdapterErrorKind::Network => CoreError::UpstreamTimeout,
        AdapterErrorKind::Unknown => CoreError::Internal { message: "adapter returned an unclassified error".into() },
    }
}

async fn record_provider_success(registry: &Registry, provider_id: &str, latency_ms: u64) {
    if let Some(lock) = registry.provider_lock(provider_id) {
        let mut provider = lock.write().await;
        health::record_success(&mut provider, latency_ms);
    }
}

async fn record_provider_failure(registry: &Registry, provider_id: &str) {
    if let Some(lock) = registry.provider_lock(provider_id) {
        let mut provider = lock.write().await;
        health::record_error(&mut provider);
    }
}

async fn touch_last_used(registry: &Registry, sub_provider_id: &str) {
    if let Some(entry) = registry.sub_provider_entry(sub_provider_id) {
        let mut sub = entry.sub_provider.write().await;
        sub.last_used_at = Some(chrono::Utc::now());
    }
}
