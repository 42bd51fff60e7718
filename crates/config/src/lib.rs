//! Naya configuration structures to map the naya.toml configuration.

mod auth;
mod error;
mod http;
mod loader;
mod plans;
mod providers;
mod quota;
mod server;
mod users;

use std::path::Path;

pub use auth::AuthConfig;
pub use error::Error;
pub use http::HttpConfig;
pub use plans::{FALLBACK_PLAN, PlanConfig, PlanModelConfig, PlansConfig, ProviderAllowList, RequestLimit, ResolvedPlan};
pub use providers::{
    DEFAULT_AZURE_API_VERSION, DEFAULT_MAX_TOKENS, DEFAULT_TEMPERATURE, ProviderCategory, ProviderConfig,
    ProviderKind, ProvidersConfig,
};
pub use quota::{QuotaStorageConfig, RedisQuotaConfig};
pub use server::{ClientIpConfig, CorsConfig, IpRateLimit, IpRateLimitsConfig, ServerConfig, TlsServerConfig};
pub use users::{UserConfig, UsersConfig};

use serde::Deserialize;

/// Main configuration structure for the Naya gateway.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// HTTP server configuration settings.
    pub server: ServerConfig,
    /// Caller authentication and secrets.
    pub auth: AuthConfig,
    /// Timeout and retry policy for vendor calls.
    pub http: HttpConfig,
    /// Persistent daily quota storage.
    pub quota: QuotaStorageConfig,
    /// Subscription plans and their entitlements.
    pub plans: PlansConfig,
    /// Upstream vendors.
    pub providers: ProvidersConfig,
    /// Statically configured users.
    pub users: UsersConfig,
}

/// Model settings handed to a provider adapter when the caller does not override them.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelDefaults {
    /// Model identifier sent upstream.
    pub model: String,
    /// Completion budget.
    pub max_tokens: u32,
    /// Sampling temperature.
    pub temperature: f32,
}

impl Config {
    /// Load configuration from a TOML file, expanding `{{ env.VAR }}` references.
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Config> {
        loader::load(path)
    }

    /// Resolves the model defaults for a provider under a plan.
    ///
    /// Precedence is plan override, then provider configuration, then the vendor default.
    /// Returns `None` when the provider is disabled, so no plan can be configured for it.
    pub fn model_defaults(&self, plan_id: &str, provider: ProviderKind) -> Option<ModelDefaults> {
        if !self.providers.is_enabled(provider) {
            return None;
        }

        let plan = self.plans.resolve(plan_id).config.models.get(&provider);
        let vendor = self.providers.get(provider);

        let model = plan
            .and_then(|p| p.model.clone())
            .or_else(|| vendor.and_then(|v| v.model.clone()))
            .unwrap_or_else(|| provider.default_model().to_string());

        let max_tokens = plan
            .and_then(|p| p.max_tokens)
            .or_else(|| vendor.and_then(|v| v.max_tokens))
            .unwrap_or(DEFAULT_MAX_TOKENS);

        let temperature = plan
            .and_then(|p| p.temperature)
            .or_else(|| vendor.and_then(|v| v.temperature))
            .unwrap_or(DEFAULT_TEMPERATURE);

        Some(ModelDefaults {
            model,
            max_tokens,
            temperature,
        })
    }
}
