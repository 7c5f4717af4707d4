//! # Capacity Reservation
//!
//! Per-sub-provider sliding-window rate limiting and concurrency reservation
//! (spec.md §4.3). Buckets are keyed by `floor(now_ms / 60_000)` — a new
//! minute starts a fresh bucket, old buckets are dropped rather than decayed.
//!
//! Reservation is pessimistic compare-and-commit: `reserve` checks all three
//! limits (rpm, tpm, concurrency) and increments atomically under one lock, so
//! a caller never observes a reservation partially applied.

use tokio::sync::Mutex;
use tracing::warn;

use crate::common::now_millis;
use crate::entities::SubProviderLimits;

#[derive(Debug, Default, Clone, Copy)]
struct WindowBucket {
    minute: u64,
    requests: u32,
    tokens: u32,
}

#[derive(Debug, Default)]
struct State {
    bucket: WindowBucket,
    concurrent: u32,
}

/// Owns the mutable rate/concurrency state for one sub-provider. One instance
/// per sub-provider, held in the registry alongside its `CircuitBreaker`.
pub struct CapacityGate {
    limits: SubProviderLimits,
    state: Mutex<State>,
}

/// A held reservation; `release` must be called exactly once, win or lose.
#[derive(Debug, Clone, Copy)]
pub struct Reservation {
    pub estimated_tokens: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReservationDenial {
    RequestsPerMinuteExceeded,
    TokensPerMinuteExceeded,
    ConcurrencyExceeded,
}

impl CapacityGate {
    pub fn new(limits: SubProviderLimits) -> Self {
        Self { limits, state: Mutex::new(State::default()) }
    }

    fn current_minute() -> u64 {
        now_millis() / 60_000
    }

    /// Checks and commits all three limits in one critical section.
    pub async fn reserve(&self, sub_provider_id: &str, estimated_tokens: u32) -> Result<Reservation, ReservationDenial> {
        let mut state = self.state.lock().await;
        let minute = Self::current_minute();
        if state.bucket.minute != minute {
            state.bucket = WindowBucket { minute, requests: 0, tokens: 0 };
        }

        if state.bucket.requests >= self.limits.max_rpm {
            warn!(sub_provider_id, "reservation rejected: requests-per-minute exhausted");
            return Err(ReservationDenial::RequestsPerMinuteExceeded);
        }
        if state.bucket.tokens.saturating_add(estimated_tokens) > self.limits.max_tpm {
            warn!(sub_provider_id, "reservation rejected: tokens-per-minute exhausted");
            return Err(ReservationDenial::TokensPerMinuteExceeded);
        }
        if state.concurrent >= self.limits.max_concurrent {
            warn!(sub_provider_id, "reservation rejected: concurrency exhausted");
            return Err(ReservationDenial::ConcurrencyExceeded);
        }

        state.bucket.requests += 1;
        state.bucket.tokens += estimated_tokens;
        state.concurrent += 1;
        Ok(Reservation { estimated_tokens })
    }

    /// Releases the concurrency slot held by `reservation`. Idempotent against
    /// double-release is the caller's responsibility — each attempt owns
    /// exactly one reservation and releases it exactly once.
    pub async fn release(&self, _reservation: Reservation) {
        let mut state = self.state.lock().await;
        state.concurrent = state.concurrent.saturating_sub(1);
    }

    /// Current utilization as a fraction of `max_concurrent`, for health/admin
    /// reporting. Never returns a negative or unbounded value (spec.md §3:
    /// `0 ≤ utilization ≤ 100`).
    pub async fn utilization_percent(&self) -> u32 {
        let state = self.state.lock().await;
        if self.limits.max_concurrent == 0 {
            return 0;
        }
        ((state.concurrent as f64 / self.limits.max_concurrent as f64) * 100.0).clamp(0.0, 100.0) as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits() -> SubProviderLimits {
        SubProviderLimits { max_rpm: 2, max_tpm: 100, max_concurrent: 1 }
    }

    #[tokio::test]
    async fn reserve_respects_max_concurrent() {
        let gate = CapacityGate::new(limits());
        let r1 = gate.reserve("sp1", 10).await.unwrap();
        let denied = gate.reserve("sp1", 10).await;
        assert_eq!(denied, Err(ReservationDenial::ConcurrencyExceeded));
        gate.release(r1).await;
        assert!(gate.reserve("sp1", 10).await.is_ok());
    }

    #[tokio::test]
    async fn reserve_respects_requests_per_minute() {
        let gate = CapacityGate::new(SubProviderLimits { max_rpm: 1, max_tpm: 1000, max_concurrent: 100 });
        let r1 = gate.reserve("sp1", 1).await.unwrap();
        gate.release(r1).await;
        let denied = gate.reserve("sp1", 1).await;
        assert_eq!(denied, Err(ReservationDenial::RequestsPerMinuteExceeded));
    }

    #[tokio::test]
    async fn reserve_respects_tokens_per_minute() {
        let gate = CapacityGate::new(SubProviderLimits { max_rpm: 1000, max_tpm: 50, max_concurrent: 100 });
        let denied = gate.reserve("sp1", 51).await;
        assert_eq!(denied, Err(ReservationDenial::TokensPerMinuteExceeded));
    }

    #[tokio::test]
    async fn utilization_is_bounded_zero_to_hundred() {
        let gate = CapacityGate::new(SubProviderLimits { max_rpm: 100, max_tpm: 1000, max_concurrent: 0 });
        assert_eq!(gate.utilization_percent().await, 0);
    }
}
