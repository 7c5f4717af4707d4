//! # Provider Registry
//!
//! Owns every `Provider`/`SubProvider` plus the per-sub-provider
//! `CircuitBreaker` and `CapacityGate` that sit alongside them. Keyed by id in
//! `DashMap`s so reads (the common case, on every dispatch) never contend with
//! each other; writes to a single entity's own row do.

use dashmap::DashMap;
use std::sync::Arc;

use crate::capacity::CapacityGate;
use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
use crate::entities::{Provider, SubProvider};

pub struct SubProviderEntry {
    pub sub_provider: tokio::sync::RwLock<SubProvider>,
    pub breaker: CircuitBreaker,
    pub capacity: CapacityGate,
}

/// In-memory registry of every provider and sub-provider known to the
/// gateway. Built once at startup from configuration; entities themselves
/// mutate in place, the registry's own shape (which ids exist) does not
/// change at runtime.
#[derive(Default)]
pub struct Registry {
    providers: DashMap<String, tokio::sync::RwLock<Provider>>,
    sub_providers: DashMap<String, Arc<SubProviderEntry>>,
    /// provider_id -> sub_provider_ids, for the load balancer's second stage.
    sub_providers_by_provider: DashMap<String, Vec<String>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_provider(&self, provider: Provider) {
        self.sub_providers_by_provider.entry(provider.id.clone()).or_default();
        self.providers.insert(provider.id.clone(), tokio::sync::RwLock::new(provider));
    }

    pub fn insert_sub_provider(&self, sub_provider: SubProvider, breaker_config: CircuitBreakerConfig) {
        let provider_id = sub_provider.provider_id.clone();
        let id = sub_provider.id.clone();
        let capacity = CapacityGate::new(sub_provider.limits);
        let breaker = CircuitBreaker::new(id.clone(), breaker_config);
        let entry = Arc::new(SubProviderEntry {
            sub_provider: tokio::sync::RwLock::new(sub_provider),
            breaker,
            capacity,
        });
        self.sub_providers.insert(id.clone(), entry);
        self.sub_providers_by_provider.entry(provider_id).or_default().push(id);
    }

    pub fn providers(&self) -> Vec<String> {
        self.providers.iter().map(|e| e.key().clone()).collect()
    }

    pub async fn provider_snapshot(&self, id: &str) -> Option<Provider> {
        let entry = self.providers.get(id)?;
        Some(entry.read().await.clone())
    }

    pub fn provider_lock(&self, id: &str) -> Option<dashmap::mapref::one::Ref<'_, String, tokio::sync::RwLock<Provider>>> {
        self.providers.get(id)
    }

    pub fn sub_provider_ids_for(&self, provider_id: &str) -> Vec<String> {
        self.sub_providers_by_provider
            .get(provider_id)
            .map(|v| v.clone())
            .unwrap_or_default()
    }

    pub fn sub_provider_entry(&self, id: &str) -> Option<Arc<SubProviderEntry>> {
        self.sub_providers.get(id).map(|e| e.clone())
    }

    pub async fn sub_provider_snapshot(&self, id: &str) -> Option<SubProvider> {
        let entry = self.sub_providers.get(id)?;
        Some(entry.sub_provider.read().await.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{ProviderHealth, ProviderMetrics, SubProviderLimits, SubProviderMetrics};

    fn provider(id: &str) -> Provider {
        Provider {
            id: id.into(),
            name: id.into(),
            priority: 0,
            is_active: true,
            supported_models: Default::default(),
            needs_sub_providers: true,
            metrics: ProviderMetrics::default(),
            health: ProviderHealth::Healthy,
        }
    }

    fn sub_provider(id: &str, provider_id: &str) -> SubProvider {
        SubProvider {
            id: id.into(),
            provider_id: provider_id.into(),
            enabled: true,
            priority: 0,
            weight: 1.0,
            limits: SubProviderLimits { max_rpm: 60, max_tpm: 10_000, max_concurrent: 4 },
            metrics: SubProviderMetrics::default(),
            last_used_at: None,
        }
    }

    #[tokio::test]
    async fn registry_links_sub_providers_to_their_parent() {
        let reg = Registry::new();
        reg.insert_provider(provider("p1"));
        reg.insert_sub_provider(sub_provider("sp1", "p1"), CircuitBreakerConfig::default());
        reg.insert_sub_provider(sub_provider("sp2", "p1"), CircuitBreakerConfig::default());

        let ids = reg.sub_provider_ids_for("p1");
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&"sp1".to_string()));
        assert!(reg.provider_snapshot("p1").await.is_some());
    }
}
