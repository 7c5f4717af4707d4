//! # Server Assembly
//!
//! Builds the registry from configuration, wires up the repository,
//! moderation gate, notifier and metrics, and returns a fully routed axum
//! `Router` — the one function `main.rs` needs to call.

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use relay_sdk::adapter::Adapter;
use relay_sdk::entities::{Provider, ProviderHealth, ProviderMetrics, SubProvider, SubProviderMetrics};
use relay_sdk::gate::ModelPricing;
use relay_sdk::registry::Registry;
use relay_sdk::repository::Repository;

use crate::auth::hash_api_key;
use crate::config::Config;
use crate::echo_adapter::EchoAdapter;
use crate::handlers::{admin, audio, chat, completions, embeddings, images, models, moderations};
use crate::metrics::Metrics;
use crate::middleware::{logging_middleware, metrics_middleware};
use crate::moderation::{ModerationGate, PermissiveGate};
use crate::repository::InMemoryRepository;
use crate::webhook::DiscordNotifier;

pub struct AppState {
    pub config: Config,
    pub registry: Arc<Registry>,
    pub repository: Arc<dyn Repository>,
    pub adapter: Arc<dyn Adapter>,
    pub moderation: Arc<dyn ModerationGate>,
    pub notifier: Arc<DiscordNotifier>,
    pub metrics: Arc<Metrics>,
    pub auth_salt: String,
    pub pricing: ModelPricing,
}

/// The env var (or config value) used as the API-key hashing salt. Fixed for
/// the lifetime of a deployment — there is no rotation endpoint.
const DEFAULT_AUTH_SALT: &str = "relay-gateway-default-salt";

pub fn create_server(config: Config) -> anyhow::Result<Router> {
    let registry = Arc::new(build_registry(&config));
    let repository: Arc<dyn Repository> = Arc::new(build_repository(&config));
    let adapter: Arc<dyn Adapter> = Arc::new(EchoAdapter);
    let moderation: Arc<dyn ModerationGate> = Arc::new(PermissiveGate);
    let notifier = Arc::new(DiscordNotifier::new(config.webhook.discord_webhook_url.clone()));
    let metrics = Arc::new(Metrics::new());
    let auth_salt = std::env::var("AUTH_SALT").unwrap_or_else(|_| DEFAULT_AUTH_SALT.to_string());

    let state = Arc::new(AppState {
        config,
        registry,
        repository,
        adapter,
        moderation,
        notifier,
        metrics,
        auth_salt,
        pricing: ModelPricing::default(),
    });

    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    let router = Router::new()
        .route("/health", get(admin::health))
        .route("/v1/models", get(models::list_models))
        .route("/admin/providers", get(admin::providers))
        .route("/v1/chat/completions", post(chat::chat_completions))
        .route("/v1/completions", post(completions::completions))
        .route("/v1/embeddings", post(embeddings::embeddings))
        .route("/v1/moderations", post(moderations::moderations))
        .route("/v1/images/generations", post(images::generations))
        .route("/v1/images/edits", post(images::edits))
        .route("/v1/audio/transcriptions", post(audio::transcriptions))
        .route("/v1/audio/speech", post(audio::speech))
        .layer(
            ServiceBuilder::new()
                .layer(cors)
                .layer(axum::middleware::from_fn(logging_middleware))
                .layer(axum::middleware::from_fn_with_state(state.clone(), metrics_middleware))
                .layer(TraceLayer::new_for_http())
                .layer(TimeoutLayer::new(state.config.server.request_timeout)),
        )
        .with_state(state);

    Ok(router)
}

fn build_repository(config: &Config) -> InMemoryRepository {
    let repo = InMemoryRepository::new();
    let auth_salt = std::env::var("AUTH_SALT").unwrap_or_else(|_| DEFAULT_AUTH_SALT.to_string());
    for key in &config.auth.api_keys {
        if !key.enabled {
            continue;
        }
        let mut hashes = std::collections::HashSet::new();
        hashes.insert(hash_api_key(&key.key, &auth_salt));
        let allowance = config.plans.get(plan_key(key.plan)).map(|p| p.credit_allowance).unwrap_or(key.credits);
        repo.seed_user(relay_sdk::entities::User {
            id: key.user_id.clone(),
            name: key.name.clone(),
            api_key_hashes: hashes,
            plan: key.plan,
            plan_expires_at: None,
            enabled: true,
            credits: allowance,
            credits_last_reset: chrono::Utc::now(),
            permissions: Default::default(),
            ip_whitelist: key.ip_whitelist.clone(),
            rate_limit: relay_sdk::entities::RateLimitAllowance { requests_per_window: 120, window_secs: 60 },
            max_concurrent: 8,
            current_concurrent: 0,
            usage: Default::default(),
            request_history: Default::default(),
        });
    }
    repo
}

fn plan_key(plan: relay_sdk::entities::Plan) -> &'static str {
    match plan {
        relay_sdk::entities::Plan::Daily => "daily",
        relay_sdk::entities::Plan::Weekly => "weekly",
        relay_sdk::entities::Plan::Monthly => "monthly",
    }
}

fn build_registry(config: &Config) -> Registry {
    let registry = Registry::new();
    for (id, settings) in &config.providers {
        let mut supported_models = std::collections::HashSet::new();
        supported_models.extend(settings.supported_models.iter().cloned());

        registry.insert_provider(Provider {
            id: id.clone(),
            name: id.clone(),
            priority: settings.priority,
            is_active: settings.is_active,
            supported_models,
            needs_sub_providers: settings.needs_sub_providers,
            metrics: ProviderMetrics::default(),
            health: ProviderHealth::Healthy,
        });

        for sub in &settings.sub_providers {
            registry.insert_sub_provider(
                SubProvider {
                    id: sub.id.clone(),
                    provider_id: id.clone(),
                    enabled: true,
                    priority: 0,
                    weight: sub.weight,
                    limits: relay_sdk::entities::SubProviderLimits {
                        max_rpm: sub.max_rpm,
                        max_tpm: sub.max_tpm,
                        max_concurrent: sub.max_concurrent,
                    },
                    metrics: SubProviderMetrics::default(),
                    last_used_at: None,
                },
                sub.circuit_breaker,
            );
        }
    }
    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AuthConfig, LoggingConfig, ProviderSettings, ServerConfig, SubProviderSettings, WebhookConfig};
    use std::collections::HashMap;

    fn test_config() -> Config {
        let mut providers = HashMap::new();
        providers.insert(
            "echo-provider".to_string(),
            ProviderSettings {
                priority: 1,
                is_active: true,
                supported_models: vec!["gpt-4".to_string()],
                needs_sub_providers: true,
                sub_providers: vec![SubProviderSettings {
                    id: "echo-sub".to_string(),
                    weight: 1.0,
                    max_rpm: 1000,
                    max_tpm: 1_000_000,
                    max_concurrent: 10,
                    circuit_breaker: relay_sdk::circuit_breaker::CircuitBreakerConfig::default(),
                }],
            },
        );
        Config {
            server: ServerConfig::default(),
            providers,
            auth: AuthConfig { api_keys: vec![] },
            plans: HashMap::new(),
            logging: LoggingConfig::default(),
            webhook: WebhookConfig::default(),
            database_url: None,
        }
    }

    #[tokio::test]
    async fn create_server_builds_router_from_config() {
        let router = create_server(test_config()).unwrap();
        let _ = router;
    }
}
