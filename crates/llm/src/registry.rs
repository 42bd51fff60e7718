use std::{collections::BTreeMap, sync::Arc};

use config::{Config, DEFAULT_AZURE_API_VERSION, ProviderKind};
use strum::IntoEnumIterator;

use crate::provider::{
    AzureOpenAiProvider, ClaudeProvider, CohereProvider, GeminiProvider, OpenAiCompatibleProvider, ProviderAdapter,
};

/// Name-keyed table of provider adapters.
///
/// Keys are lowercase; lookups ignore case. A missing provider is an ordinary outcome,
/// callers check before dispatching.
#[derive(Default, Clone)]
pub struct ProviderRegistry {
    adapters: BTreeMap<String, Arc<dyn ProviderAdapter>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers every enabled vendor of the configuration.
    pub fn from_config(config: &Config) -> crate::Result<Self> {
        let mut registry = Self::new();

        for kind in ProviderKind::iter() {
            if !config.providers.is_enabled(kind) {
                log::debug!("Provider {kind} is disabled, not registering it");
                continue;
            }

            registry.register(build_adapter(config, kind)?);
        }

        log::debug!("Registered {} providers", registry.adapters.len());

        Ok(registry)
    }

    /// Inserts the adapter under its lowercased name, replacing any previous one.
    pub fn register(&mut self, adapter: Arc<dyn ProviderAdapter>) {
        let name = adapter.name().to_ascii_lowercase();

        if self.adapters.insert(name.clone(), adapter).is_some() {
            log::debug!("Provider {name} re-registered");
        }
    }

    pub fn unregister(&mut self, name: &str) -> Option<Arc<dyn ProviderAdapter>> {
        self.adapters.remove(&name.to_ascii_lowercase())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ProviderAdapter>> {
        self.adapters.get(&name.to_ascii_lowercase()).cloned()
    }

    pub fn is_supported(&self, name: &str) -> bool {
        self.adapters.contains_key(&name.to_ascii_lowercase())
    }

    pub fn list_names(&self) -> Vec<String> {
        self.adapters.keys().cloned().collect()
    }

    pub fn list_all(&self) -> Vec<Arc<dyn ProviderAdapter>> {
        self.adapters.values().cloned().collect()
    }
}

fn build_adapter(config: &Config, kind: ProviderKind) -> crate::Result<Arc<dyn ProviderAdapter>> {
    let settings = config.providers.get(kind);

    let base_url = settings
        .and_then(|settings| settings.base_url.as_ref())
        .map(|url| url.as_str().trim_end_matches('/').to_string())
        .or_else(|| kind.default_api_url().map(str::to_string))
        .unwrap_or_default();

    let adapter: Arc<dyn ProviderAdapter> = match kind {
        ProviderKind::OpenAi
        | ProviderKind::Mistral
        | ProviderKind::Perplexity
        | ProviderKind::Together
        | ProviderKind::Groq
        | ProviderKind::Fireworks
        | ProviderKind::OpenRouter
        | ProviderKind::DeepInfra
        | ProviderKind::XAi
        | ProviderKind::DeepSeek => Arc::new(OpenAiCompatibleProvider::new(kind, base_url)?),
        ProviderKind::Gemini => {
            let model = settings
                .and_then(|settings| settings.model.clone())
                .unwrap_or_else(|| kind.default_model().to_string());

            Arc::new(GeminiProvider::new(base_url, model)?)
        }
        ProviderKind::Claude => Arc::new(ClaudeProvider::new(base_url)?),
        ProviderKind::Cohere => Arc::new(CohereProvider::new(base_url)?),
        ProviderKind::AzureOpenAi => {
            let endpoint = settings.and_then(|settings| settings.base_url.as_ref()).map(|url| url.to_string());
            let deployment = settings.and_then(|settings| settings.deployment.clone());

            let api_version = settings
                .and_then(|settings| settings.api_version.clone())
                .unwrap_or_else(|| DEFAULT_AZURE_API_VERSION.to_string());

            Arc::new(AzureOpenAiProvider::new(endpoint, deployment, api_version)?)
        }
    };

    Ok(adapter)
}
