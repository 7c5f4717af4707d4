//! # Health Scoring
//!
//! Sub-provider health score and provider-level health classification
//! (spec.md §3, §4.4), plus the bounded latency ring each `Provider` keeps
//! for percentile reporting.

use chrono::Utc;

use crate::common::now_millis;
use crate::entities::{LatencyPercentiles, LatencySample, Provider, ProviderHealth, ProviderMetrics, SubProvider};

/// Upper bound on the latency ring, whichever limit is hit first.
const LATENCY_RING_MAX_ENTRIES: usize = 1000;
const LATENCY_RING_MAX_AGE_MS: u64 = 10 * 60 * 1000;

/// Don't recompute percentiles more than once per 5 seconds (spec.md §4.4).
const PERCENTILE_RECALC_INTERVAL_MS: i64 = 5000;

/// `healthScore = clamp(successRate - min(consecutiveErrors*0.1, 0.5) -
/// max(0, (avgLatency-1000)/10000), 0, 1)` (spec.md §4.4).
pub fn sub_provider_health_score(success_rate: f64, consecutive_errors: u32, avg_latency_ms: f64) -> f64 {
    let error_penalty = (consecutive_errors as f64 * 0.1).min(0.5);
    let latency_penalty = ((avg_latency_ms - 1000.0) / 10000.0).max(0.0);
    (success_rate - error_penalty - latency_penalty).clamp(0.0, 1.0)
}

pub fn recompute_sub_provider_health(sub: &mut SubProvider) {
    let total = sub.metrics.success_count + sub.metrics.error_count;
    let success_rate = if total == 0 { 1.0 } else { sub.metrics.success_count as f64 / total as f64 };
    // Sub-providers don't keep their own latency average in the entity model;
    // callers that track it pass it through `update_from_latency` instead.
    sub.metrics.health_score = sub_provider_health_score(success_rate, sub.metrics.consecutive_errors, 0.0);
}

/// Provider-level classification, thresholds per spec.md §4.4. Evaluated in
/// unhealthy → degraded → healthy order; none of the three conditions firing
/// leaves `current` unchanged — this is hysteresis, not a pure function of
/// the metrics snapshot alone.
pub fn classify_provider_health(current: ProviderHealth, metrics: &ProviderMetrics) -> ProviderHealth {
    let success_rate = metrics.success_rate();
    if metrics.consecutive_errors >= 10 || success_rate < 0.5 {
        ProviderHealth::Unhealthy
    } else if metrics.consecutive_errors >= 5 || success_rate < 0.8 || metrics.avg_latency_ms > 5000.0 {
        ProviderHealth::Degraded
    } else if metrics.consecutive_errors == 0 && success_rate >= 0.95 && metrics.avg_latency_ms <= 2000.0 {
        ProviderHealth::Healthy
    } else {
        current
    }
}

pub fn record_success(provider: &mut Provider, latency_ms: u64) {
    let m = &mut provider.metrics;
    m.success_count += 1;
    m.consecutive_errors = 0;
    let n = m.success_count as f64;
    m.avg_latency_ms += (latency_ms as f64 - m.avg_latency_ms) / n;
    push_latency_sample(provider, latency_ms);
    provider.health = classify_provider_health(provider.health, &provider.metrics);
}

pub fn record_error(provider: &mut Provider) {
    let m = &mut provider.metrics;
    m.error_count += 1;
    m.consecutive_errors += 1;
    provider.health = classify_provider_health(provider.health, &provider.metrics);
}

fn push_latency_sample(provider: &mut Provider, latency_ms: u64) {
    let now = now_millis();
    let ring = &mut provider.metrics.latency_history;
    ring.push_back(LatencySample { millis: latency_ms, recorded_at_ms: now });
    while ring.len() > LATENCY_RING_MAX_ENTRIES {
        ring.pop_front();
    }
    while ring.front().map(|s| now.saturating_sub(s.recorded_at_ms) > LATENCY_RING_MAX_AGE_MS).unwrap_or(false) {
        ring.pop_front();
    }
    maybe_recompute_percentiles(provider);
}

fn maybe_recompute_percentiles(provider: &mut Provider) {
    let now = Utc::now();
    let due = provider
        .metrics
        .last_percentile_calc
        .map(|last| (now - last).num_milliseconds() >= PERCENTILE_RECALC_INTERVAL_MS)
        .unwrap_or(true);
    if !due {
        return;
    }
    provider.metrics.last_percentile_calc = Some(now);
    let mut samples: Vec<u64> = provider.metrics.latency_history.iter().map(|s| s.millis).collect();
    if samples.is_empty() {
        return;
    }
    samples.sort_unstable();
    provider.metrics.last_percentiles = Some(LatencyPercentiles {
        p50: percentile(&samples, 0.50),
        p95: percentile(&samples, 0.95),
        p99: percentile(&samples, 0.99),
    });
}

/// Linear interpolation between the two nearest ranks, per spec.md §4.4.
fn percentile(sorted: &[u64], p: f64) -> f64 {
    if sorted.len() == 1 {
        return sorted[0] as f64;
    }
    let rank = p * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    if lower == upper {
        sorted[lower] as f64
    } else {
        let frac = rank - lower as f64;
        sorted[lower] as f64 + frac * (sorted[upper] as f64 - sorted[lower] as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    fn provider() -> Provider {
        Provider {
            id: "p1".into(),
            name: "test".into(),
            priority: 0,
            is_active: true,
            supported_models: Default::default(),
            needs_sub_providers: false,
            metrics: ProviderMetrics::default(),
            health: ProviderHealth::Healthy,
        }
    }

    /// A provider with a prior track record, so a handful of fresh errors
    /// doesn't immediately zero out its success rate — isolates the
    /// `consecutiveErrors` threshold from the `successRate` one.
    fn provider_with_history(successes: u64, errors: u64, health: ProviderHealth) -> Provider {
        let mut p = provider();
        p.metrics.success_count = successes;
        p.metrics.error_count = errors;
        p.health = health;
        p
    }

    #[test]
    fn health_score_clamps_to_unit_interval() {
        assert_eq!(sub_provider_health_score(1.0, 0, 0.0), 1.0);
        assert_eq!(sub_provider_health_score(0.0, 20, 50000.0), 0.0);
    }

    #[test]
    fn error_penalty_caps_at_half() {
        let score_at_5_errors = sub_provider_health_score(1.0, 5, 0.0);
        let score_at_50_errors = sub_provider_health_score(1.0, 50, 0.0);
        assert_eq!(score_at_5_errors, score_at_50_errors);
        assert_eq!(score_at_5_errors, 0.5);
    }

    #[test]
    fn provider_degrades_after_five_consecutive_errors() {
        let mut p = provider_with_history(100, 0, ProviderHealth::Healthy);
        for _ in 0..5 {
            record_error(&mut p);
        }
        // successRate is still ~0.95 here — it's consecutiveErrors>=5 alone
        // that trips the degraded threshold.
        assert_eq!(p.health, ProviderHealth::Degraded);
    }

    #[test]
    fn provider_becomes_unhealthy_after_ten_consecutive_errors() {
        let mut p = provider_with_history(100, 0, ProviderHealth::Healthy);
        for _ in 0..10 {
            record_error(&mut p);
        }
        assert_eq!(p.health, ProviderHealth::Unhealthy);
    }

    #[test]
    fn success_resets_consecutive_errors_and_reconfirms_healthy() {
        let mut p = provider_with_history(100, 0, ProviderHealth::Healthy);
        for _ in 0..4 {
            record_error(&mut p);
        }
        // 4 consecutive errors alone crossed no threshold, so health hasn't
        // moved off its prior Healthy yet (hysteresis).
        assert_eq!(p.health, ProviderHealth::Healthy);
        record_success(&mut p, 100);
        assert_eq!(p.metrics.consecutive_errors, 0);
        assert_eq!(p.health, ProviderHealth::Healthy);
    }

    #[test]
    fn health_is_unchanged_when_no_threshold_fires() {
        // successRate after this success lands at 9/11 ≈ 0.82 — above the
        // 0.8 degraded floor, below the 0.95 healthy floor. No condition
        // fires, so a single success doesn't heal a Degraded provider.
        let mut p = provider_with_history(8, 2, ProviderHealth::Degraded);
        record_success(&mut p, 10);
        assert_eq!(p.health, ProviderHealth::Degraded);
    }

    #[test]
    fn latency_ring_is_capped_at_max_entries() {
        let mut p = provider();
        for i in 0..(LATENCY_RING_MAX_ENTRIES + 50) {
            record_success(&mut p, (i % 100) as u64);
        }
        assert_eq!(p.metrics.latency_history.len(), LATENCY_RING_MAX_ENTRIES);
    }

    #[test]
    fn percentile_interpolates_linearly() {
        let sorted: Vec<u64> = (1..=10).collect();
        assert_eq!(percentile(&sorted, 0.0), 1.0);
        assert_eq!(percentile(&sorted, 1.0), 10.0);
        assert!((percentile(&sorted, 0.5) - 5.5).abs() < 1e-9);
    }

    #[test]
    fn percentiles_do_not_recompute_more_often_than_every_five_seconds() {
        let mut p = provider();
        record_success(&mut p, 10);
        let first = p.metrics.last_percentile_calc;
        record_success(&mut p, 20);
        assert_eq!(p.metrics.last_percentile_calc, first);
        let _ = VecDeque::<u64>::new();
    }
}
