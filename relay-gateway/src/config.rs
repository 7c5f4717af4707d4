//! # Configuration
//!
//! TOML-first configuration with environment overrides, following the
//! layout of the dispatch core's upstream teacher crate: a `config` crate
//! builder layering a file over environment variables, with a handful of
//! single-purpose env vars taking precedence over both for operational
//! overrides (`LOG_LEVEL`, `GATEWAY_HOST`, `GATEWAY_PORT`, `DATABASE_URL`,
//! `DISCORD_WEBHOOK_URL`).

use std::collections::HashMap;
use std::time::Duration;

use relay_sdk::circuit_breaker::CircuitBreakerConfig;
use relay_sdk::common::duration_serde;
use relay_sdk::entities::Plan;
use serde::{Deserialize, Serialize};

use crate::gateway_error::GatewayError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub providers: HashMap<String, ProviderSettings>,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub plans: HashMap<String, PlanSettings>,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub webhook: WebhookConfig,
    #[serde(default)]
    pub database_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    #[serde(with = "duration_serde")]
    pub request_timeout: Duration,
    pub max_body_size: usize,
    #[serde(default)]
    pub cors: CorsConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            request_timeout: Duration::from_secs(30),
            max_body_size: 10 * 1024 * 1024,
            cors: CorsConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSettings {
    pub priority: i32,
    #[serde(default = "default_true")]
    pub is_active: bool,
    pub supported_models: Vec<String>,
    #[serde(default)]
    pub needs_sub_providers: bool,
    pub sub_providers: Vec<SubProviderSettings>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubProviderSettings {
    pub id: String,
    #[serde(default = "default_weight")]
    pub weight: f32,
    pub max_rpm: u32,
    pub max_tpm: u32,
    pub max_concurrent: u32,
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerConfig,
}

fn default_weight() -> f32 {
    1.0
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub api_keys: Vec<ApiKeyConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKeyConfig {
    /// Plaintext key as configured; hashed once at startup, never compared
    /// in plaintext at request time (spec.md §6).
    pub key: String,
    pub user_id: String,
    pub name: String,
    pub plan: Plan,
    pub credits: i64,
    #[serde(default)]
    pub allowed_models: Vec<String>,
    #[serde(default)]
    pub ip_whitelist: Vec<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanSettings {
    pub credit_allowance: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string() }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WebhookConfig {
    pub discord_webhook_url: Option<String>,
}

impl Config {
    /// Loads `path` (if it exists) layered under environment overrides.
    /// `GATEWAY__SERVER__PORT`-style double-underscore env vars address
    /// nested fields; the four named single-purpose vars below take final
    /// precedence over both the file and the nested env layer.
    pub fn load(path: &str) -> Result<Self, GatewayError> {
        let builder = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(config::Environment::with_prefix("GATEWAY").separator("__"));

        let built = builder.build().map_err(|e| GatewayError::Config { message: e.to_string() })?;
        let mut cfg: Config = built.try_deserialize().map_err(|e| GatewayError::Config { message: e.to_string() })?;

        if let Ok(level) = std::env::var("LOG_LEVEL") {
            cfg.logging.level = level;
        }
        if let Ok(host) = std::env::var("GATEWAY_HOST") {
            cfg.server.host = host;
        }
        if let Ok(port) = std::env::var("GATEWAY_PORT") {
            cfg.server.port = port.parse().map_err(|_| GatewayError::Config { message: "GATEWAY_PORT must be a valid port number".into() })?;
        }
        if let Ok(url) = std::env::var("DATABASE_URL") {
            cfg.database_url = Some(url);
        }
        if let Ok(url) = std::env::var("DISCORD_WEBHOOK_URL") {
            cfg.webhook.discord_webhook_url = Some(url);
        }

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), GatewayError> {
        if self.server.port == 0 {
            return Err(GatewayError::Config { message: "server.port must be nonzero".into() });
        }
        for (name, provider) in &self.providers {
            if provider.needs_sub_providers && provider.sub_providers.is_empty() {
                return Err(GatewayError::Config {
                    message: format!("provider '{name}' declares needs_sub_providers but has no sub_providers configured"),
                });
            }
            for sub in &provider.sub_providers {
                if sub.weight < 0.0 {
                    return Err(GatewayError::Config { message: format!("sub-provider '{}' has a negative weight", sub.id) });
                }
            }
        }
        for key in &self.auth.api_keys {
            if key.key.is_empty() {
                return Err(GatewayError::Config { message: format!("api key entry for user '{}' has an empty key", key.user_id) });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_server_config_has_sane_bounds() {
        let server = ServerConfig::default();
        assert_eq!(server.port, 8080);
        assert!(server.max_body_size > 0);
    }

    #[test]
    fn validate_rejects_zero_port() {
        let mut cfg = Config {
            server: ServerConfig { port: 0, ..ServerConfig::default() },
            providers: HashMap::new(),
            auth: AuthConfig::default(),
            plans: HashMap::new(),
            logging: LoggingConfig::default(),
            webhook: WebhookConfig::default(),
            database_url: None,
        };
        assert!(cfg.validate().is_err());
        cfg.server.port = 8080;
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn validate_rejects_provider_missing_sub_providers_when_required() {
        let mut providers = HashMap::new();
        providers.insert(
            "openai".to_string(),
            ProviderSettings { priority: 1, is_active: true, supported_models: vec!["gpt-4".into()], needs_sub_providers: true, sub_providers: vec![] },
        );
        let cfg = Config {
            server: ServerConfig::default(),
            providers,
            auth: AuthConfig::default(),
            plans: HashMap::new(),
            logging: LoggingConfig::default(),
            webhook: WebhookConfig::default(),
            database_url: None,
        };
        assert!(cfg.validate().is_err());
    }
}
