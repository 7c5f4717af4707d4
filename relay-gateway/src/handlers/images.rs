use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use serde_json::Value;

use crate::gateway_error::GatewayError;
use crate::handlers::pipeline;
use crate::server::AppState;

pub async fn generations(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Json<Value>, GatewayError> {
    pipeline::handle(state, headers, "/v1/images/generations", body, true).await
}

pub async fn edits(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Json<Value>, GatewayError> {
    pipeline::handle(state, headers, "/v1/images/edits", body, true).await
}
