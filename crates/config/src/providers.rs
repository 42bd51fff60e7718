//! Upstream LLM vendor configuration.

use std::collections::BTreeMap;

use secrecy::SecretString;
use serde::Deserialize;
use url::Url;

/// Default completion budget when neither the caller nor the configuration sets one.
pub const DEFAULT_MAX_TOKENS: u32 = 2048;

/// Default sampling temperature when neither the caller nor the configuration sets one.
pub const DEFAULT_TEMPERATURE: f32 = 0.7;

/// Default `api-version` query parameter for Azure OpenAI deployments.
pub const DEFAULT_AZURE_API_VERSION: &str = "2024-02-15-preview";

/// The closed set of vendors the gateway knows how to talk to.
///
/// Declaration order is significant: it is the order in which user-owned keys are
/// scanned and in which providers are registered.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
    strum::IntoStaticStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ProviderKind {
    OpenAi,
    Gemini,
    Mistral,
    Claude,
    Cohere,
    Perplexity,
    Together,
    Groq,
    Fireworks,
    AzureOpenAi,
    OpenRouter,
    DeepInfra,
    XAi,
    DeepSeek,
}

/// Billing/UI grouping of a vendor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, serde::Serialize)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ProviderCategory {
    Classic,
    Premium,
}

impl ProviderKind {
    /// Lowercase registry name, e.g. `"openai"`.
    pub fn name(self) -> &'static str {
        self.into()
    }

    /// Vendor name used in human-readable messages.
    pub fn display_name(self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "OpenAI",
            ProviderKind::Gemini => "Gemini",
            ProviderKind::Mistral => "Mistral",
            ProviderKind::Claude => "Claude",
            ProviderKind::Cohere => "Cohere",
            ProviderKind::Perplexity => "Perplexity",
            ProviderKind::Together => "Together AI",
            ProviderKind::Groq => "Groq",
            ProviderKind::Fireworks => "Fireworks AI",
            ProviderKind::AzureOpenAi => "Azure OpenAI",
            ProviderKind::OpenRouter => "OpenRouter",
            ProviderKind::DeepInfra => "DeepInfra",
            ProviderKind::XAi => "xAI",
            ProviderKind::DeepSeek => "DeepSeek",
        }
    }

    /// Public API base URL. Azure has none, every deployment lives on its own resource host.
    pub fn default_api_url(self) -> Option<&'static str> {
        let url = match self {
            ProviderKind::OpenAi => "https://api.openai.com/v1",
            ProviderKind::Gemini => "https://generativelanguage.googleapis.com/v1beta",
            ProviderKind::Mistral => "https://api.mistral.ai/v1",
            ProviderKind::Claude => "https://api.anthropic.com/v1",
            ProviderKind::Cohere => "https://api.cohere.ai/v1",
            ProviderKind::Perplexity => "https://api.perplexity.ai",
            ProviderKind::Together => "https://api.together.xyz/v1",
            ProviderKind::Groq => "https://api.groq.com/openai/v1",
            ProviderKind::Fireworks => "https://api.fireworks.ai/inference/v1",
            ProviderKind::AzureOpenAi => return None,
            ProviderKind::OpenRouter => "https://openrouter.ai/api/v1",
            ProviderKind::DeepInfra => "https://api.deepinfra.com/v1/openai",
            ProviderKind::XAi => "https://api.x.ai/v1",
            ProviderKind::DeepSeek => "https://api.deepseek.com/v1",
        };

        Some(url)
    }

    /// Model used when neither the plan nor the provider configuration names one.
    pub fn default_model(self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "gpt-4-turbo-preview",
            ProviderKind::Gemini => "gemini-pro",
            ProviderKind::Mistral => "mistral-medium",
            ProviderKind::Claude => "claude-3-sonnet-20240229",
            ProviderKind::Cohere => "command",
            ProviderKind::Perplexity => "sonar",
            ProviderKind::Together => "meta-llama/Llama-3-70b-chat-hf",
            ProviderKind::Groq => "llama3-70b-8192",
            ProviderKind::Fireworks => "accounts/fireworks/models/llama-v3-70b-instruct",
            ProviderKind::AzureOpenAi => "gpt-4",
            ProviderKind::OpenRouter => "openai/gpt-3.5-turbo",
            ProviderKind::DeepInfra => "meta-llama/Meta-Llama-3-70B-Instruct",
            ProviderKind::XAi => "grok-beta",
            ProviderKind::DeepSeek => "deepseek-chat",
        }
    }

    /// Environment variable holding the server-side key for this vendor.
    pub fn api_key_env(self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "OPENAI_API_KEY",
            ProviderKind::Gemini => "GEMINI_API_KEY",
            ProviderKind::Mistral => "MISTRAL_API_KEY",
            ProviderKind::Claude => "CLAUDE_API_KEY",
            ProviderKind::Cohere => "COHERE_API_KEY",
            ProviderKind::Perplexity => "PERPLEXITY_API_KEY",
            ProviderKind::Together => "TOGETHER_API_KEY",
            ProviderKind::Groq => "GROQ_API_KEY",
            ProviderKind::Fireworks => "FIREWORKS_API_KEY",
            ProviderKind::AzureOpenAi => "AZURE_OPENAI_API_KEY",
            ProviderKind::OpenRouter => "OPENROUTER_API_KEY",
            ProviderKind::DeepInfra => "DEEPINFRA_API_KEY",
            ProviderKind::XAi => "XAI_API_KEY",
            ProviderKind::DeepSeek => "DEEPSEEK_API_KEY",
        }
    }

    pub fn category(self) -> ProviderCategory {
        match self {
            ProviderKind::AzureOpenAi
            | ProviderKind::OpenRouter
            | ProviderKind::DeepInfra
            | ProviderKind::XAi
            | ProviderKind::DeepSeek => ProviderCategory::Premium,
            _ => ProviderCategory::Classic,
        }
    }

    /// Path segment of the legacy passthrough route, e.g. `openaiProxy`.
    pub fn legacy_proxy_route(self) -> String {
        format!("/{}Proxy", self.name())
    }
}

/// Configuration for a single vendor.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProviderConfig {
    /// Whether the vendor is registered at startup.
    pub enabled: bool,
    /// Server-held key. Falls back to the vendor's conventional environment variable.
    pub api_key: Option<SecretString>,
    /// Overrides the vendor base URL. Required for Azure OpenAI.
    pub base_url: Option<Url>,
    /// Default model for this vendor.
    pub model: Option<String>,
    /// Default completion budget for this vendor.
    pub max_tokens: Option<u32>,
    /// Default sampling temperature for this vendor.
    pub temperature: Option<f32>,
    /// Azure OpenAI deployment name.
    pub deployment: Option<String>,
    /// Azure OpenAI `api-version` query parameter.
    pub api_version: Option<String>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api_key: None,
            base_url: None,
            model: None,
            max_tokens: None,
            temperature: None,
            deployment: None,
            api_version: None,
        }
    }
}

/// All vendor configurations keyed by provider.
///
/// A vendor that is absent from the map is enabled with default settings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct ProvidersConfig {
    providers: BTreeMap<ProviderKind, ProviderConfig>,
}

impl ProvidersConfig {
    pub fn get(&self, kind: ProviderKind) -> Option<&ProviderConfig> {
        self.providers.get(&kind)
    }

    pub fn is_enabled(&self, kind: ProviderKind) -> bool {
        self.get(kind).is_none_or(|config| config.enabled)
    }

    pub fn api_key(&self, kind: ProviderKind) -> Option<&SecretString> {
        self.get(kind).and_then(|config| config.api_key.as_ref())
    }

    pub(crate) fn entry(&mut self, kind: ProviderKind) -> &mut ProviderConfig {
        self.providers.entry(kind).or_default()
    }
}
