//! # Metrics
//!
//! Process-local counters surfaced at `GET /metrics` as JSON. Deliberately
//! not a full metrics backend (no Prometheus exporter, no histogram buckets)
//! — spec.md's Non-goals exclude a metrics *service*, but a request-dispatch
//! core still needs to count what it emits as `billing.overrun`, so this
//! stays in process and ambient, matching the teacher's own lightweight
//! in-process counters.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Default)]
pub struct Metrics {
    pub requests_total: AtomicU64,
    pub requests_succeeded: AtomicU64,
    pub requests_failed: AtomicU64,
    pub billing_overruns: AtomicU64,
    pub moderation_flags: AtomicU64,
}

#[derive(Serialize)]
pub struct MetricsSnapshot {
    pub requests_total: u64,
    pub requests_succeeded: u64,
    pub requests_failed: u64,
    pub billing_overruns: u64,
    pub moderation_flags: u64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_request_started(&self) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_request_succeeded(&self) {
        self.requests_succeeded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_request_failed(&self) {
        self.requests_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_billing_overrun(&self) {
        self.billing_overruns.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_moderation_flag(&self) {
        self.moderation_flags.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            requests_total: self.requests_total.load(Ordering::Relaxed),
            requests_succeeded: self.requests_succeeded.load(Ordering::Relaxed),
            requests_failed: self.requests_failed.load(Ordering::Relaxed),
            billing_overruns: self.billing_overruns.load(Ordering::Relaxed),
            moderation_flags: self.moderation_flags.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate_independently() {
        let metrics = Metrics::new();
        metrics.record_request_started();
        metrics.record_request_started();
        metrics.record_request_succeeded();
        metrics.record_billing_overrun();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.requests_total, 2);
        assert_eq!(snapshot.requests_succeeded, 1);
        assert_eq!(snapshot.billing_overruns, 1);
    }
}
