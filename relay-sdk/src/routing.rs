//! # Two-Level Load Balancer
//!
//! Stage one picks a `Provider` (priority, then success rate, then lower
//! average latency), filtered to active/healthy and excluding ids the
//! dispatch loop has already tried. Stage two picks a `SubProvider` from that
//! provider by weighted-random draw, tie-broken by oldest `last_used_at`
//! (spec.md §4.2). Adapted from the teacher's `select_weighted_provider`, but
//! specialized to the provider/sub-provider two-level shape instead of a flat
//! provider list.

use rand::Rng;
use tracing::debug;

use crate::entities::{Provider, ProviderHealth, SubProvider};
use crate::registry::Registry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionError {
    NoProvidersAvailable,
}

pub struct Selection {
    pub provider_id: String,
    pub sub_provider_id: String,
}

/// Selects a provider then one of its sub-providers for `model`, excluding
/// any provider id in `excluded`.
pub async fn select_provider_and_sub_provider(
    registry: &Registry,
    model: &str,
    excluded: &[String],
) -> Result<Selection, SelectionError> {
    let provider = select_provider(registry, model, excluded).await?;
    let sub_provider_id = select_sub_provider(registry, &provider.id).await?;
    debug!(provider_id = %provider.id, sub_provider_id = %sub_provider_id, model, "selected provider/sub-provider pair");
    Ok(Selection { provider_id: provider.id, sub_provider_id })
}

async fn select_provider(registry: &Registry, model: &str, excluded: &[String]) -> Result<Provider, SelectionError> {
    let mut candidates = Vec::new();
    for id in registry.providers() {
        if excluded.contains(&id) {
            continue;
        }
        if let Some(provider) = registry.provider_snapshot(&id).await {
            if provider.is_active && provider.health != ProviderHealth::Unhealthy && provider.supports_model(model) {
                candidates.push(provider);
            }
        }
    }

    candidates.sort_by(|a, b| {
        b.priority
            .cmp(&a.priority)
            .then(health_rank(a.health).cmp(&health_rank(b.health)))
            .then(b.metrics.success_rate().partial_cmp(&a.metrics.success_rate()).unwrap_or(std::cmp::Ordering::Equal))
            .then(a.metrics.avg_latency_ms.partial_cmp(&b.metrics.avg_latency_ms).unwrap_or(std::cmp::Ordering::Equal))
    });

    candidates.into_iter().next().ok_or(SelectionError::NoProvidersAvailable)
}

/// Lower ranks sort first. `Unhealthy` is filtered out before this runs, so
/// only `Healthy`/`Degraded` are ever compared — a degraded provider never
/// outranks a healthy one at equal priority (spec.md §4.2 step 2).
fn health_rank(health: ProviderHealth) -> u8 {
    match health {
        ProviderHealth::Healthy => 0,
        ProviderHealth::Degraded => 1,
        ProviderHealth::Unhealthy => 2,
    }
}

async fn select_sub_provider(registry: &Registry, provider_id: &str) -> Result<String, SelectionError> {
    let mut candidates: Vec<SubProvider> = Vec::new();
    for id in registry.sub_provider_ids_for(provider_id) {
        if let Some(sub) = registry.sub_provider_snapshot(&id).await {
            if sub.enabled && sub.is_healthy() {
                candidates.push(sub);
            }
        }
    }
    if candidates.is_empty() {
        return Err(SelectionError::NoProvidersAvailable);
    }

    let total_weight: f32 = candidates.iter().map(|s| s.weight.max(0.0)).sum();
    if total_weight <= 0.0 {
        return Ok(oldest_last_used(&candidates).id.clone());
    }

    let mut roll = rand::thread_rng().gen_range(0.0..total_weight);
    for sub in &candidates {
        let w = sub.weight.max(0.0);
        if roll < w {
            return Ok(sub.id.clone());
        }
        roll -= w;
    }
    Ok(oldest_last_used(&candidates).id.clone())
}

/// Tie-break: the sub-provider least recently used, `None` (never used)
/// sorting before any `Some` timestamp.
fn oldest_last_used(candidates: &[SubProvider]) -> &SubProvider {
    candidates
        .iter()
        .min_by_key(|s| s.last_used_at.map(|t| t.timestamp_millis()).unwrap_or(i64::MIN))
        .expect("candidates is non-empty, checked by caller")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit_breaker::CircuitBreakerConfig;
    use crate::entities::{ProviderHealth, ProviderMetrics, SubProviderLimits, SubProviderMetrics};
    use std::collections::HashSet;

    fn provider(id: &str, priority: i32) -> Provider {
        let mut models = HashSet::new();
        models.insert("gpt-4".to_string());
        Provider {
            id: id.into(),
            name: id.into(),
            priority,
            is_active: true,
            supported_models: models,
            needs_sub_providers: true,
            metrics: ProviderMetrics::default(),
            health: ProviderHealth::Healthy,
        }
    }

    fn sub_provider(id: &str, provider_id: &str, weight: f32) -> SubProvider {
        SubProvider {
            id: id.into(),
            provider_id: provider_id.into(),
            enabled: true,
            priority: 0,
            weight,
            limits: SubProviderLimits { max_rpm: 60, max_tpm: 10_000, max_concurrent: 4 },
            metrics: SubProviderMetrics::default(),
            last_used_at: None,
        }
    }

    #[tokio::test]
    async fn higher_priority_provider_wins() {
        let reg = Registry::new();
        reg.insert_provider(provider("low", 1));
        reg.insert_provider(provider("high", 10));
        reg.insert_sub_provider(sub_provider("sp_low", "low", 1.0), CircuitBreakerConfig::default());
        reg.insert_sub_provider(sub_provider("sp_high", "high", 1.0), CircuitBreakerConfig::default());

        let selection = select_provider_and_sub_provider(&reg, "gpt-4", &[]).await.unwrap();
        assert_eq!(selection.provider_id, "high");
    }

    #[tokio::test]
    async fn excluded_provider_is_skipped() {
        let reg = Registry::new();
        reg.insert_provider(provider("only", 5));
        reg.insert_sub_provider(sub_provider("sp1", "only", 1.0), CircuitBreakerConfig::default());

        let result = select_provider_and_sub_provider(&reg, "gpt-4", &["only".to_string()]).await;
        assert_eq!(result.err(), Some(SelectionError::NoProvidersAvailable));
    }

    #[tokio::test]
    async fn unhealthy_sub_provider_is_never_selected() {
        let reg = Registry::new();
        reg.insert_provider(provider("p1", 1));
        let mut unhealthy = sub_provider("sp_bad", "p1", 100.0);
        unhealthy.metrics.consecutive_errors = 10;
        reg.insert_sub_provider(unhealthy, CircuitBreakerConfig::default());
        reg.insert_sub_provider(sub_provider("sp_good", "p1", 1.0), CircuitBreakerConfig::default());

        for _ in 0..20 {
            let selection = select_provider_and_sub_provider(&reg, "gpt-4", &[]).await.unwrap();
            assert_eq!(selection.sub_provider_id, "sp_good");
        }
    }

    #[tokio::test]
    async fn unhealthy_provider_is_filtered_out() {
        let reg = Registry::new();
        let mut unhealthy = provider("bad", 10);
        unhealthy.health = ProviderHealth::Unhealthy;
        reg.insert_provider(unhealthy);
        reg.insert_provider(provider("ok", 1));
        reg.insert_sub_provider(sub_provider("sp_bad", "bad", 1.0), CircuitBreakerConfig::default());
        reg.insert_sub_provider(sub_provider("sp_ok", "ok", 1.0), CircuitBreakerConfig::default());

        let selection = select_provider_and_sub_provider(&reg, "gpt-4", &[]).await.unwrap();
        assert_eq!(selection.provider_id, "ok");
    }

    #[tokio::test]
    async fn degraded_provider_is_demoted_below_healthy_at_equal_priority() {
        let reg = Registry::new();
        let mut degraded = provider("degraded", 5);
        degraded.health = ProviderHealth::Degraded;
        reg.insert_provider(degraded);
        reg.insert_provider(provider("healthy", 5));
        reg.insert_sub_provider(sub_provider("sp_degraded", "degraded", 1.0), CircuitBreakerConfig::default());
        reg.insert_sub_provider(sub_provider("sp_healthy", "healthy", 1.0), CircuitBreakerConfig::default());

        let selection = select_provider_and_sub_provider(&reg, "gpt-4", &[]).await.unwrap();
        assert_eq!(selection.provider_id, "healthy");
    }

    #[tokio::test]
    async fn model_not_supported_yields_no_providers() {
        let reg = Registry::new();
        reg.insert_provider(provider("p1", 1));
        reg.insert_sub_provider(sub_provider("sp1", "p1", 1.0), CircuitBreakerConfig::default());

        let result = select_provider_and_sub_provider(&reg, "claude-3", &[]).await;
        assert_eq!(result.err(), Some(SelectionError::NoProvidersAvailable));
    }
}
