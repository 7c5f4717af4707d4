use axum::extract::Request;
use axum::middleware::Next;
use axum::response::Response;
use std::time::Instant;
use tracing::info;
use uuid::Uuid;

/// Assigns each request a short-lived trace id and logs method, path, status
/// and latency once it completes — the access-log line every handler's own
/// `tracing` spans nest under.
pub async fn logging_middleware(request: Request, next: Next) -> Response {
    let trace_id = Uuid::new_v4().to_string();
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let started = Instant::now();

    let response = next.run(request).await;

    info!(
        trace_id = %trace_id,
        method = %method,
        path = %path,
        status = response.status().as_u16(),
        latency_ms = started.elapsed().as_millis() as u64,
        "handled request"
    );

    response
}
