//! # Circuit Breaker
//!
//! Tri-state breaker guarding a single sub-provider (spec.md §4.4). Unlike the
//! wrapping `call()`-style breaker this is adapted from, this one exposes
//! discrete `record_success`/`record_error`/`is_available` calls: the dispatch
//! loop already owns the deadline via `tokio::time::timeout` around the
//! adapter call, so the breaker only needs to observe outcomes, not wrap them.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::info;

use crate::common::{duration_serde, now_millis};
use crate::entities::CircuitState;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    #[serde(with = "duration_serde")]
    pub recovery_timeout: Duration,
    pub half_open_max_calls: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(60),
            // spec.md §8's recovery law is "exactly one probe is admitted"
            // once half-open; callers that want to widen the probe window
            // do so explicitly via config, not by relying on this default.
            half_open_max_calls: 1,
        }
    }
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    consecutive_failures: u32,
    opened_at_ms: Option<u64>,
    half_open_calls: u32,
}

/// One breaker per sub-provider, keyed externally by the registry.
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    name: String,
    inner: RwLock<Inner>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            name: name.into(),
            inner: RwLock::new(Inner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                opened_at_ms: None,
                half_open_calls: 0,
            }),
        }
    }

    /// Whether a new call may be attempted right now. Transitions Open →
    /// HalfOpen when `recovery_timeout` has elapsed (spec.md §4.4).
    pub async fn is_available(&self) -> bool {
        let mut inner = self.inner.write().await;
        match inner.state {
            CircuitState::Closed => true,
            CircuitState::HalfOpen => inner.half_open_calls < self.config.half_open_max_calls,
            CircuitState::Open => {
                let elapsed_ok = inner
                    .opened_at_ms
                    .map(|opened| now_millis().saturating_sub(opened) >= self.config.recovery_timeout.as_millis() as u64)
                    .unwrap_or(false);
                if elapsed_ok {
                    info!(sub_provider = %self.name, "circuit breaker entering half-open");
                    inner.state = CircuitState::HalfOpen;
                    inner.half_open_calls = 0;
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Call this once the availability check above admitted the request, so
    /// half-open concurrency is capped even across concurrent callers.
    pub async fn record_attempt_started(&self) {
        let mut inner = self.inner.write().await;
        if inner.state == CircuitState::HalfOpen {
            inner.half_open_calls += 1;
        }
    }

    pub async fn record_success(&self) {
        let mut inner = self.inner.write().await;
        inner.consecutive_failures = 0;
        if inner.state != CircuitState::Closed {
            info!(sub_provider = %self.name, "circuit breaker closing after recovery");
        }
        inner.state = CircuitState::Closed;
        inner.opened_at_ms = None;
        inner.half_open_calls = 0;
    }

    pub async fn record_error(&self) {
        let mut inner = self.inner.write().await;
        inner.consecutive_failures += 1;
        match inner.state {
            CircuitState::HalfOpen => {
                info!(sub_provider = %self.name, "circuit breaker re-opening, half-open probe failed");
                inner.state = CircuitState::Open;
                inner.opened_at_ms = Some(now_millis());
                inner.half_open_calls = 0;
            }
            CircuitState::Closed if inner.consecutive_failures >= self.config.failure_threshold => {
                info!(sub_provider = %self.name, threshold = self.config.failure_threshold, "circuit breaker opening");
                inner.state = CircuitState::Open;
                inner.opened_at_ms = Some(now_millis());
            }
            _ => {}
        }
    }

    pub async fn state(&self) -> CircuitState {
        self.inner.read().await.state
    }

    pub async fn force_open(&self) {
        let mut inner = self.inner.write().await;
        inner.state = CircuitState::Open;
        inner.opened_at_ms = Some(now_millis());
    }

    pub async fn force_closed(&self) {
        let mut inner = self.inner.write().await;
        inner.state = CircuitState::Closed;
        inner.consecutive_failures = 0;
        inner.opened_at_ms = None;
        inner.half_open_calls = 0;
    }
}
