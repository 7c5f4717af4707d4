use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use std::sync::Arc;

use crate::server::AppState;

/// Bumps the coarse request counters in `AppState::metrics` around every
/// request, independent of which handler ran.
pub async fn metrics_middleware(State(state): State<Arc<AppState>>, request: Request, next: Next) -> Response {
    state.metrics.record_request_started();
    let response = next.run(request).await;
    if response.status().is_success() {
        state.metrics.record_request_succeeded();
    } else {
        state.metrics.record_request_failed();
    }
    response
}
