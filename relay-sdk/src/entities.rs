//! # Entity Model
//!
//! In-memory value objects for `User`, `Provider`, `SubProvider` and
//! `ApiRequest`, each owning its own mutable counters (spec.md §3).
//!
//! `Provider` and `SubProvider` are meant to live behind a registry
//! (`crate::registry`) keyed by id; `SubProvider` holds its parent's id as a
//! plain `String`, never a reference, so the two can't form a pointer cycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};

/// A billed, authenticated caller of the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub name: String,
    pub api_key_hashes: HashSet<String>,
    pub plan: Plan,
    pub plan_expires_at: Option<DateTime<Utc>>,
    pub enabled: bool,
    pub credits: i64,
    pub credits_last_reset: DateTime<Utc>,
    pub permissions: HashSet<String>,
    pub ip_whitelist: Vec<String>,
    pub rate_limit: RateLimitAllowance,
    pub max_concurrent: u32,
    pub current_concurrent: u32,
    pub usage: UsageCounters,
    pub request_history: VecDeque<RequestHistoryEntry>,
}

/// Upper bound on `User::request_history` — a bounded ring, per spec.md §4.6.
pub const REQUEST_HISTORY_CAPACITY: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Plan {
    Daily,
    Weekly,
    Monthly,
}

impl Plan {
    /// The lazy credit-reset interval for this plan (spec.md §4.6).
    pub fn interval(&self) -> chrono::Duration {
        match self {
            Plan::Daily => chrono::Duration::days(1),
            Plan::Weekly => chrono::Duration::weeks(1),
            Plan::Monthly => chrono::Duration::days(30),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RateLimitAllowance {
    pub requests_per_window: u32,
    pub window_secs: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UsageCounters {
    pub total_requests: u64,
    pub total_tokens: u64,
    pub total_credits_spent: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestHistoryEntry {
    pub request_id: String,
    pub endpoint: String,
    pub tokens: u64,
    pub credits: u64,
    pub completed_at: DateTime<Utc>,
}

impl User {
    /// Debit `amount` credits, clamping at the current balance rather than
    /// going negative (spec.md §4.6: "negative-balance tolerance is zero").
    ///
    /// Returns `true` if the full amount was available, `false` if the debit
    /// was clamped — the caller treats a `false` return as a `billing.overrun`.
    pub fn debit_credits(&mut self, amount: u64) -> bool {
        let amount = amount as i64;
        if self.credits >= amount {
            self.credits -= amount;
            true
        } else {
            self.credits = 0;
            false
        }
    }

    /// Top up credits to the plan allowance if the reset interval has
    /// elapsed. Evaluated lazily on admission (spec.md §4.6).
    pub fn maybe_reset_credits(&mut self, now: DateTime<Utc>, plan_allowance: i64) {
        if now - self.credits_last_reset >= self.plan.interval() {
            self.credits = plan_allowance;
            self.credits_last_reset = now;
        }
    }

    pub fn record_completed_request(&mut self, entry: RequestHistoryEntry) {
        self.usage.total_requests += 1;
        self.usage.total_tokens += entry.tokens;
        self.usage.total_credits_spent += entry.credits;
        self.request_history.push_back(entry);
        while self.request_history.len() > REQUEST_HISTORY_CAPACITY {
            self.request_history.pop_front();
        }
    }
}

/// A logical upstream vendor with a pool of keyed sub-providers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Provider {
    pub id: String,
    pub name: String,
    pub priority: i32,
    pub is_active: bool,
    pub supported_models: HashSet<String>,
    pub needs_sub_providers: bool,
    pub metrics: ProviderMetrics,
    pub health: ProviderHealth,
}

impl Provider {
    pub fn supports_model(&self, model: &str) -> bool {
        self.supported_models.contains(model)
    }

    pub fn total_requests(&self) -> u64 {
        self.metrics.success_count + self.metrics.error_count
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProviderHealth {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Mutable performance counters for a `Provider` (spec.md §3, §4.4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderMetrics {
    pub success_count: u64,
    pub error_count: u64,
    pub consecutive_errors: u32,
    /// Running mean latency over successful requests only, milliseconds.
    pub avg_latency_ms: f64,
    /// Bounded ring: at most 1000 entries, at most 10 minutes old.
    pub latency_history: VecDeque<LatencySample>,
    pub last_percentiles: Option<LatencyPercentiles>,
    pub last_percentile_calc: Option<DateTime<Utc>>,
}

impl Default for ProviderMetrics {
    fn default() -> Self {
        Self {
            success_count: 0,
            error_count: 0,
            consecutive_errors: 0,
            avg_latency_ms: 0.0,
            latency_history: VecDeque::new(),
            last_percentiles: None,
            last_percentile_calc: None,
        }
    }
}

impl ProviderMetrics {
    pub fn success_rate(&self) -> f64 {
        let total = self.success_count + self.error_count;
        if total == 0 {
            1.0
        } else {
            self.success_count as f64 / total as f64
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LatencySample {
    pub millis: u64,
    pub recorded_at_ms: u64,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct LatencyPercentiles {
    pub p50: f64,
    pub p95: f64,
    pub p99: f64,
}

/// A concrete upstream account/region owned by a `Provider`.
///
/// `provider_id` is a weak back-reference by id only — never traverse a
/// pointer cycle between Provider and SubProvider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubProvider {
    pub id: String,
    pub provider_id: String,
    pub enabled: bool,
    pub priority: i32,
    pub weight: f32,
    pub limits: SubProviderLimits,
    pub metrics: SubProviderMetrics,
    pub last_used_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SubProviderLimits {
    pub max_rpm: u32,
    pub max_tpm: u32,
    pub max_concurrent: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubProviderMetrics {
    pub health_score: f64,
    pub circuit: CircuitState,
    pub consecutive_errors: u32,
    pub current_concurrent: u32,
    pub success_count: u64,
    pub error_count: u64,
}

impl Default for SubProviderMetrics {
    fn default() -> Self {
        Self {
            health_score: 1.0,
            circuit: CircuitState::Closed,
            consecutive_errors: 0,
            current_concurrent: 0,
            success_count: 0,
            error_count: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl SubProvider {
    /// Per spec.md §3: `healthy ⇔ healthScore>0.7 ∧ circuit=closed ∧ consecutiveErrors<5`.
    pub fn is_healthy(&self) -> bool {
        self.metrics.health_score > 0.7
            && self.metrics.circuit == CircuitState::Closed
            && self.metrics.consecutive_errors < 5
    }
}

/// A single gateway request, tracked from admission through a terminal state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiRequest {
    pub id: String,
    pub user_id: String,
    pub endpoint: String,
    pub method: String,
    pub model: String,
    pub provider_id: Option<String>,
    pub sub_provider_id: Option<String>,
    pub status: ApiRequestStatus,
    pub status_code: Option<u16>,
    pub retry_count: u32,
    pub tokens: u64,
    pub credits: u64,
    pub latency_ms: u64,
    pub size_bytes: u64,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApiRequestStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Timeout,
}

impl ApiRequest {
    pub fn create(user_id: String, endpoint: String, method: String, model: String) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id,
            endpoint,
            method,
            model,
            provider_id: None,
            sub_provider_id: None,
            status: ApiRequestStatus::Pending,
            status_code: None,
            retry_count: 0,
            tokens: 0,
            credits: 0,
            latency_ms: 0,
            size_bytes: 0,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    /// Required before any adapter call (spec.md §4.5).
    pub fn start_processing(&mut self) {
        debug_assert_eq!(self.status, ApiRequestStatus::Pending);
        self.status = ApiRequestStatus::Processing;
    }

    pub fn complete(
        &mut self,
        tokens: u64,
        credits: u64,
        latency_ms: u64,
        size_bytes: u64,
        status_code: u16,
        provider_id: Option<String>,
        sub_provider_id: Option<String>,
    ) {
        self.tokens = tokens;
        self.credits = credits;
        self.latency_ms = latency_ms;
        self.size_bytes = size_bytes;
        self.status_code = Some(status_code);
        self.provider_id = provider_id;
        self.sub_provider_id = sub_provider_id;
        self.status = ApiRequestStatus::Completed;
        self.completed_at = Some(Utc::now());
    }

    pub fn fail(&mut self, status_code: u16, latency_ms: u64, retries: u32) {
        self.status_code = Some(status_code);
        self.latency_ms = latency_ms;
        self.retry_count = retries;
        self.status = ApiRequestStatus::Failed;
        self.completed_at = Some(Utc::now());
    }

    /// A specialization of `fail` with code 408 (spec.md §4.5).
    pub fn timeout(&mut self, latency_ms: u64) {
        self.latency_ms = latency_ms;
        self.status_code = Some(408);
        self.status = ApiRequestStatus::Timeout;
        self.completed_at = Some(Utc::now());
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self.status,
            ApiRequestStatus::Completed | ApiRequestStatus::Failed | ApiRequestStatus::Timeout
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_user() -> User {
        User {
            id: "u1".into(),
            name: "test".into(),
            api_key_hashes: HashSet::new(),
            plan: Plan::Monthly,
            plan_expires_at: None,
            enabled: true,
            credits: 100,
            credits_last_reset: Utc::now(),
            permissions: HashSet::new(),
            ip_whitelist: vec![],
            rate_limit: RateLimitAllowance { requests_per_window: 100, window_secs: 60 },
            max_concurrent: 4,
            current_concurrent: 0,
            usage: UsageCounters::default(),
            request_history: VecDeque::new(),
        }
    }

    #[test]
    fn debit_clamps_at_zero_and_signals_overrun() {
        let mut user = sample_user();
        assert!(user.debit_credits(40));
        assert_eq!(user.credits, 60);

        assert!(!user.debit_credits(1000));
        assert_eq!(user.credits, 0);
    }

    #[test]
    fn request_history_ring_is_bounded() {
        let mut user = sample_user();
        for i in 0..(REQUEST_HISTORY_CAPACITY + 10) {
            user.record_completed_request(RequestHistoryEntry {
                request_id: format!("r{i}"),
                endpoint: "/v1/chat/completions".into(),
                tokens: 1,
                credits: 1,
                completed_at: Utc::now(),
            });
        }
        assert_eq!(user.request_history.len(), REQUEST_HISTORY_CAPACITY);
        assert_eq!(user.usage.total_requests, (REQUEST_HISTORY_CAPACITY + 10) as u64);
    }

    #[test]
    fn api_request_state_machine_rejects_skipping_processing() {
        let mut req = ApiRequest::create("u1".into(), "/v1/chat/completions".into(), "POST".into(), "gpt-4".into());
        assert_eq!(req.status, ApiRequestStatus::Pending);
        req.start_processing();
        assert_eq!(req.status, ApiRequestStatus::Processing);
        req.complete(10, 1, 50, 100, 200, Some("p1".into()), Some("sp1".into()));
        assert!(req.is_terminal());
        assert!(req.completed_at.unwrap() >= req.created_at);
    }

    #[test]
    fn sub_provider_health_requires_all_three_conditions() {
        let mut sp = SubProvider {
            id: "sp1".into(),
            provider_id: "p1".into(),
            enabled: true,
            priority: 0,
            weight: 1.0,
            limits: SubProviderLimits { max_rpm: 60, max_tpm: 10000, max_concurrent: 4 },
            metrics: SubProviderMetrics::default(),
            last_used_at: None,
        };
        assert!(sp.is_healthy());
        sp.metrics.circuit = CircuitState::Open;
        assert!(!sp.is_healthy());
        sp.metrics.circuit = CircuitState::Closed;
        sp.metrics.consecutive_errors = 5;
        assert!(!sp.is_healthy());
    }
}
