use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

use crate::server::AppState;

/// `GET /v1/models` — lists every model any active provider supports,
/// deduplicated. Read-only introspection, no dispatch involved.
pub async fn list_models(State(state): State<Arc<AppState>>) -> Json<Value> {
    let mut models: Vec<String> = Vec::new();
    for provider_id in state.registry.providers() {
        if let Some(provider) = state.registry.provider_snapshot(&provider_id).await {
            if provider.is_active {
                for model in provider.supported_models {
                    if !models.contains(&model) {
                        models.push(model);
                    }
                }
            }
        }
    }
    models.sort();

    Json(json!({
        "object": "list",
        "data": models.into_iter().map(|id| json!({ "id": id, "object": "model" })).collect::<Vec<_>>(),
    }))
}
