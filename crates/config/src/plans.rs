//! Subscription plans: the one table every entitlement decision reads.

use std::{borrow::Cow, collections::BTreeMap, str::FromStr, sync::LazyLock};

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer};

use crate::ProviderKind;

/// Plan used for users without a subscription and for unknown plan ids.
pub const FALLBACK_PLAN: &str = "free";

static FALLBACK: LazyLock<PlanConfig> = LazyLock::new(|| PlanConfig {
    providers: ProviderAllowList::Only(vec![ProviderKind::Gemini]),
    requests_per_day: RequestLimit::Limited(5),
    requests_per_minute: 3,
    managed_key_providers: ProviderAllowList::default(),
    models: BTreeMap::new(),
});

/// Daily request allowance. `-1` in configuration means unlimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestLimit {
    Unlimited,
    Limited(u32),
}

impl RequestLimit {
    pub fn limit(self) -> Option<u32> {
        match self {
            RequestLimit::Unlimited => None,
            RequestLimit::Limited(limit) => Some(limit),
        }
    }

    /// Remaining allowance after `used` requests, `None` when unlimited.
    pub fn remaining(self, used: u32) -> Option<u32> {
        self.limit().map(|limit| limit.saturating_sub(used))
    }

    pub fn is_exhausted(self, used: u32) -> bool {
        self.limit().is_some_and(|limit| used >= limit)
    }
}

impl<'de> Deserialize<'de> for RequestLimit {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = i64::deserialize(deserializer)?;

        match value {
            -1 => Ok(RequestLimit::Unlimited),
            0.. => u32::try_from(value)
                .map(RequestLimit::Limited)
                .map_err(|_| serde::de::Error::custom(format!("request limit {value} is too large"))),
            _ => Err(serde::de::Error::custom(format!(
                "request limit must be -1 (unlimited) or a positive number, got {value}"
            ))),
        }
    }
}

/// Providers a plan may use. `["all"]` grants every provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderAllowList {
    All,
    Only(Vec<ProviderKind>),
}

impl Default for ProviderAllowList {
    fn default() -> Self {
        ProviderAllowList::Only(Vec::new())
    }
}

impl ProviderAllowList {
    pub fn allows(&self, provider: ProviderKind) -> bool {
        match self {
            ProviderAllowList::All => true,
            ProviderAllowList::Only(providers) => providers.contains(&provider),
        }
    }

    /// The list as shown to clients, e.g. `["gemini"]` or `["all"]`.
    pub fn names(&self) -> Vec<&'static str> {
        match self {
            ProviderAllowList::All => vec!["all"],
            ProviderAllowList::Only(providers) => providers.iter().map(|provider| provider.name()).collect(),
        }
    }
}

impl<'de> Deserialize<'de> for ProviderAllowList {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let values = Vec::<Cow<'de, str>>::deserialize(deserializer)?;

        if values.iter().any(|value| value.eq_ignore_ascii_case("all")) {
            return Ok(ProviderAllowList::All);
        }

        let providers = values
            .iter()
            .map(|value| {
                ProviderKind::from_str(value).map_err(|_| serde::de::Error::custom(format!("unknown provider '{value}'")))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(ProviderAllowList::Only(providers))
    }
}

/// Per-plan model defaults for one provider.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PlanModelConfig {
    pub model: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PlanConfig {
    /// Providers this plan may call.
    pub providers: ProviderAllowList,
    /// Persistent daily allowance.
    pub requests_per_day: RequestLimit,
    /// Fixed one-minute window allowance.
    pub requests_per_minute: u32,
    /// Providers for which platform-held keys are handed out.
    #[serde(default)]
    pub managed_key_providers: ProviderAllowList,
    /// Model defaults per provider for this plan.
    #[serde(default)]
    pub models: BTreeMap<ProviderKind, PlanModelConfig>,
}

/// A plan looked up by id, with unknown ids already mapped to the fallback plan.
#[derive(Debug, Clone, Copy)]
pub struct ResolvedPlan<'a> {
    pub id: &'a str,
    pub config: &'a PlanConfig,
}

/// All subscription plans.
///
/// Configured plans replace the built-in plan of the same id; built-in plans that are
/// not mentioned in configuration stay available.
#[derive(Debug, Clone)]
pub struct PlansConfig {
    plans: IndexMap<String, PlanConfig>,
}

impl Default for PlansConfig {
    fn default() -> Self {
        let all_managed = [
            ProviderKind::OpenAi,
            ProviderKind::Gemini,
            ProviderKind::Mistral,
            ProviderKind::Claude,
        ];

        let mut plans = IndexMap::new();

        plans.insert(FALLBACK_PLAN.to_string(), FALLBACK.clone());

        plans.insert(
            "starter".to_string(),
            PlanConfig {
                providers: ProviderAllowList::Only(vec![ProviderKind::Gemini, ProviderKind::Mistral]),
                requests_per_day: RequestLimit::Limited(100),
                requests_per_minute: 10,
                managed_key_providers: ProviderAllowList::default(),
                models: BTreeMap::new(),
            },
        );

        plans.insert(
            "pro".to_string(),
            PlanConfig {
                providers: ProviderAllowList::All,
                requests_per_day: RequestLimit::Unlimited,
                requests_per_minute: 30,
                managed_key_providers: ProviderAllowList::Only(all_managed.to_vec()),
                models: BTreeMap::new(),
            },
        );

        plans.insert(
            "enterprise".to_string(),
            PlanConfig {
                providers: ProviderAllowList::All,
                requests_per_day: RequestLimit::Unlimited,
                requests_per_minute: 100,
                managed_key_providers: ProviderAllowList::All,
                models: BTreeMap::new(),
            },
        );

        Self { plans }
    }
}

impl<'de> Deserialize<'de> for PlansConfig {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let overrides = IndexMap::<String, PlanConfig>::deserialize(deserializer)?;
        let mut config = PlansConfig::default();

        for (id, plan) in overrides {
            config.plans.insert(id.to_ascii_lowercase(), plan);
        }

        Ok(config)
    }
}

impl PlansConfig {
    /// Looks up a plan case-insensitively, mapping unknown ids to the `free` plan.
    pub fn resolve(&self, plan_id: &str) -> ResolvedPlan<'_> {
        if let Some((id, config)) = self.plans.get_key_value(plan_id.to_ascii_lowercase().as_str()) {
            return ResolvedPlan { id, config };
        }

        let config = self.plans.get(FALLBACK_PLAN).unwrap_or(&FALLBACK);

        ResolvedPlan {
            id: FALLBACK_PLAN,
            config,
        }
    }

    /// Whether the plan's allow-list includes the provider. Unknown provider names are
    /// only allowed by the `all` wildcard.
    pub fn can_use_provider(&self, plan_id: &str, provider: &str) -> bool {
        let plan = self.resolve(plan_id).config;

        match ProviderKind::from_str(provider) {
            Ok(kind) => plan.providers.allows(kind),
            Err(_) => plan.providers == ProviderAllowList::All,
        }
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.plans.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use super::{PlansConfig, ProviderAllowList, RequestLimit};
    use crate::ProviderKind;

    #[derive(serde::Deserialize)]
    struct Wrapper {
        plans: PlansConfig,
    }

    #[test]
    fn builtin_entitlements() {
        let plans = PlansConfig::default();

        assert!(plans.can_use_provider("free", "gemini"));
        assert!(!plans.can_use_provider("free", "claude"));
        assert!(plans.can_use_provider("starter", "mistral"));
        assert!(plans.can_use_provider("pro", "claude"));
        assert!(plans.can_use_provider("enterprise", "deepseek"));
    }

    #[test]
    fn unknown_plan_is_free() {
        let plans = PlansConfig::default();
        let resolved = plans.resolve("platinum");

        assert_eq!(resolved.id, "free");
        assert_eq!(resolved.config.requests_per_day, RequestLimit::Limited(5));
        assert!(!plans.can_use_provider("platinum", "openai"));
    }

    #[test]
    fn plan_ids_ignore_case() {
        let config = indoc! {r#"
            [plans.Team]
            providers = ["all"]
            requests_per_day = -1
            requests_per_minute = 50
        "#};

        let Wrapper { plans } = toml::from_str(config).unwrap();

        let team = plans.resolve("Team");
        assert_eq!(team.id, "team");
        assert_eq!(team.config.requests_per_day, RequestLimit::Unlimited);
        assert_eq!(plans.resolve("TEAM").id, "team");

        let pro = plans.resolve("PRO");
        assert_eq!(pro.id, "pro");
        assert_eq!(pro.config.requests_per_day, RequestLimit::Unlimited);
        assert!(plans.can_use_provider("Pro", "claude"));
        assert!(!plans.can_use_provider("Free", "claude"));
    }

    #[test]
    fn configured_plan_replaces_builtin() {
        let config = indoc! {r#"
            [plans.free]
            providers = ["gemini", "groq"]
            requests_per_day = 10
            requests_per_minute = 2

            [plans.free.models.groq]
            model = "llama3-8b-8192"

            [plans.team]
            providers = ["all"]
            requests_per_day = -1
            requests_per_minute = 50
            managed_key_providers = ["openai"]
        "#};

        let Wrapper { plans } = toml::from_str(config).unwrap();

        let free = plans.resolve("free").config;
        assert_eq!(free.requests_per_day, RequestLimit::Limited(10));
        assert!(free.providers.allows(ProviderKind::Groq));
        assert_eq!(
            free.models[&ProviderKind::Groq].model.as_deref(),
            Some("llama3-8b-8192")
        );

        let team = plans.resolve("team").config;
        assert_eq!(team.requests_per_day, RequestLimit::Unlimited);
        assert_eq!(team.providers, ProviderAllowList::All);

        let ids: Vec<_> = plans.ids().collect();
        insta::assert_debug_snapshot!(ids, @r#"
        [
            "free",
            "starter",
            "pro",
            "enterprise",
            "team",
        ]
        "#);
    }

    #[test]
    fn rejects_unknown_provider() {
        let config = indoc! {r#"
            [plans.free]
            providers = ["gemini", "skynet"]
            requests_per_day = 5
            requests_per_minute = 3
        "#};

        let error = toml::from_str::<Wrapper>(config).err().unwrap();

        assert!(error.to_string().contains("unknown provider 'skynet'"));
    }

    #[test]
    fn rejects_negative_limit() {
        let config = indoc! {r#"
            [plans.free]
            providers = ["gemini"]
            requests_per_day = -5
            requests_per_minute = 3
        "#};

        let error = toml::from_str::<Wrapper>(config).err().unwrap();

        assert!(error.to_string().contains("must be -1 (unlimited)"));
    }

    #[test]
    fn request_limit_arithmetic() {
        assert_eq!(RequestLimit::Limited(5).remaining(7), Some(0));
        assert_eq!(RequestLimit::Unlimited.remaining(7), None);
        assert!(RequestLimit::Limited(0).is_exhausted(0));
        assert!(!RequestLimit::Unlimited.is_exhausted(u32::MAX));
    }

    #[test]
    fn allow_list_names() {
        let plans = PlansConfig::default();

        assert_eq!(plans.resolve("starter").config.providers.names(), ["gemini", "mistral"]);
        assert_eq!(plans.resolve("pro").config.providers.names(), ["all"]);
    }
}
