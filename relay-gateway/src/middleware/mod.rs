//! Request-scoped middleware: structured access logging and metrics
//! bookkeeping, wired into the `tower::ServiceBuilder` stack in `server.rs`.

pub mod logging;
pub mod request_metrics;

pub use logging::logging_middleware;
pub use request_metrics::metrics_middleware;
