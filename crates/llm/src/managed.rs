//! The managed call path: one entry point that gates, dispatches and accounts a call.

use std::{str::FromStr, sync::Arc};

use config::{Config, ProviderKind};
use jiff::Timestamp;
use rate_limit::RateLimitService;
use store::{AnalyticsSink, UsageEvent, UsageSource};

use crate::{
    error::LlmError,
    keys::KeyResolver,
    messages::{CallOptions, ManagedApiResponse, ProviderReply},
    policy::CallPolicy,
    registry::ProviderRegistry,
};

/// A successful managed call.
#[derive(Debug, Clone, PartialEq)]
pub struct ManagedCall {
    pub reply: ProviderReply,
    pub tokens_used: u64,
}

/// Orchestrates managed-key calls.
///
/// Gates run in a fixed order and the first refusal ends the call: provider existence,
/// rate limit, plan entitlement, plan configuration and key availability. Only then is
/// the vendor contacted, and a successful answer is recorded as usage.
pub struct ManagedApiService {
    registry: Arc<ProviderRegistry>,
    rate_limits: Arc<RateLimitService>,
    config: Arc<Config>,
    keys: KeyResolver,
    analytics: Arc<dyn AnalyticsSink>,
    policy: CallPolicy,
}

impl ManagedApiService {
    pub fn new(
        registry: Arc<ProviderRegistry>,
        rate_limits: Arc<RateLimitService>,
        config: Arc<Config>,
        keys: KeyResolver,
        analytics: Arc<dyn AnalyticsSink>,
    ) -> Self {
        let policy = CallPolicy::new(config.http);

        Self {
            registry,
            rate_limits,
            config,
            keys,
            analytics,
            policy,
        }
    }

    /// Runs a call and folds the outcome into the uniform response shape.
    pub async fn make_api_call(&self, options: &CallOptions) -> ManagedApiResponse {
        match self.call(options).await {
            Ok(call) => ManagedApiResponse::success(call.reply, call.tokens_used),
            Err(e) => {
                log::debug!("Managed call to {} failed: {e}", options.provider);
                ManagedApiResponse::failure(e.client_message())
            }
        }
    }

    /// Whether the plan's allow-list includes the provider.
    pub fn can_use_api(&self, provider: &str, plan_id: &str) -> bool {
        self.config.plans.can_use_provider(plan_id, provider)
    }

    /// Runs a call, keeping the typed error.
    pub async fn call(&self, options: &CallOptions) -> crate::Result<ManagedCall> {
        let provider = options.provider.as_str();
        let plan_id = options.plan_id.as_str();

        let Some(adapter) = self.registry.get(provider) else {
            return Err(LlmError::UnsupportedProvider(provider.to_string()));
        };

        let decision = self.rate_limits.check_rate_limit(&options.user_id, plan_id).await?;

        if !decision.allowed {
            let wait_ms = decision.reset_time.saturating_sub(self.rate_limits.now_ms());

            return Err(LlmError::RateLimited {
                wait_minutes: wait_ms.div_ceil(60_000).max(1),
                remaining_day: decision.remaining_day,
            });
        }

        if !self.can_use_api(provider, plan_id) {
            return Err(LlmError::NotEntitled {
                provider: provider.to_string(),
                plan: plan_id.to_string(),
                allowed: self.config.plans.resolve(plan_id).config.providers.names(),
            });
        }

        let not_configured = || LlmError::NotConfiguredForPlan {
            provider: provider.to_string(),
            plan: plan_id.to_string(),
        };

        let kind = ProviderKind::from_str(provider).map_err(|_| not_configured())?;
        let defaults = self.config.model_defaults(plan_id, kind).ok_or_else(not_configured)?;

        let Some(api_key) = self.keys.api_key(kind, plan_id, false).await? else {
            return Err(LlmError::MissingApiKey(kind.display_name().to_string()));
        };

        let reply = self
            .policy
            .run(adapter.name(), || adapter.call(&api_key, options, &defaults))
            .await?;

        let tokens_used = reply.tokens_used(&options.input);

        let event = UsageEvent {
            user_id: options.user_id.clone(),
            provider: kind.name().to_string(),
            model: options
                .model
                .clone()
                .filter(|model| !model.is_empty())
                .unwrap_or(defaults.model),
            tokens_used,
            source: UsageSource::Managed,
            timestamp: Timestamp::now(),
        };

        if let Err(e) = self.analytics.record(event).await {
            log::warn!("Failed to record usage of {provider} for user {}: {e}", options.user_id);
        }

        Ok(ManagedCall { reply, tokens_used })
    }
}
