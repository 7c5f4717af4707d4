use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use serde_json::Value;

use crate::gateway_error::GatewayError;
use crate::handlers::pipeline;
use crate::server::AppState;

/// The moderation endpoint dispatches to a vendor moderation model like any
/// other endpoint — it does not additionally run the gateway's own
/// moderation predicate against itself.
pub async fn moderations(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Json<Value>, GatewayError> {
    pipeline::handle(state, headers, "/v1/moderations", body, false).await
}
