use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

use crate::server::AppState;

/// `GET /health` — liveness probe, no dependencies checked.
pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// `GET /admin/providers` — read-only provider/sub-provider health and
/// metrics snapshot. This is JSON introspection only; the admin *UI* remains
/// out of scope.
pub async fn providers(State(state): State<Arc<AppState>>) -> Json<Value> {
    let mut entries = Vec::new();
    for provider_id in state.registry.providers() {
        let Some(provider) = state.registry.provider_snapshot(&provider_id).await else { continue };
        let sub_provider_ids = state.registry.sub_provider_ids_for(&provider_id);
        let mut sub_providers = Vec::new();
        for sub_id in sub_provider_ids {
            if let Some(sub) = state.registry.sub_provider_snapshot(&sub_id).await {
                sub_providers.push(json!({
                    "id": sub.id,
                    "enabled": sub.enabled,
                    "healthy": sub.is_healthy(),
                    "health_score": sub.metrics.health_score,
                    "circuit": format!("{:?}", sub.metrics.circuit),
                    "consecutive_errors": sub.metrics.consecutive_errors,
                }));
            }
        }
        entries.push(json!({
            "id": provider.id,
            "name": provider.name,
            "priority": provider.priority,
            "is_active": provider.is_active,
            "health": format!("{:?}", provider.health),
            "success_rate": provider.metrics.success_rate(),
            "avg_latency_ms": provider.metrics.avg_latency_ms,
            "sub_providers": sub_providers,
        }));
    }
    Json(json!({ "providers": entries, "metrics": state.metrics.snapshot() }))
}
