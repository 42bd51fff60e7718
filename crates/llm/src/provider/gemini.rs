mod input;
mod output;

use async_trait::async_trait;
use config::{ModelDefaults, ProviderCategory, ProviderKind};
use reqwest::{Client, header::HeaderMap};
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;

use self::{input::GenerateContentRequest, output::GenerateContentResponse};
use crate::{
    error::LlmError,
    messages::{CallOptions, ProviderReply},
    provider::{ProviderAdapter, Settings, endpoint, http_client::default_http_client_builder, send},
};

const API_KEY_HEADER: &str = "x-goog-api-key";

pub struct GeminiProvider {
    client: Client,
    base_url: String,
    default_model: String,
}

impl GeminiProvider {
    /// `default_model` is used by [`ProviderAdapter::forward`] when the body names none.
    pub fn new(base_url: impl Into<String>, default_model: impl Into<String>) -> crate::Result<Self> {
        let client = default_http_client_builder(HeaderMap::new()).build().map_err(|e| {
            log::error!("Failed to create HTTP client for Gemini provider: {e}");
            LlmError::InternalError(None)
        })?;

        Ok(Self {
            client,
            base_url: base_url.into(),
            default_model: default_model.into(),
        })
    }

    fn generate_url(&self, model: &str) -> String {
        endpoint(&self.base_url, &format!("models/{model}:generateContent"))
    }
}

#[async_trait]
impl ProviderAdapter for GeminiProvider {
    fn name(&self) -> &str {
        ProviderKind::Gemini.name()
    }

    fn display_name(&self) -> &str {
        ProviderKind::Gemini.display_name()
    }

    fn api_url(&self) -> &str {
        &self.base_url
    }

    fn category(&self) -> ProviderCategory {
        ProviderKind::Gemini.category()
    }

    async fn call(
        &self,
        api_key: &SecretString,
        options: &CallOptions,
        defaults: &ModelDefaults,
    ) -> crate::Result<ProviderReply> {
        let settings = Settings::resolve(options, defaults);
        let body = GenerateContentRequest::new(options.input.messages(), &settings);

        log::debug!("Gemini generateContent with model {}", settings.model);

        let request = self
            .client
            .post(self.generate_url(&settings.model))
            .header(API_KEY_HEADER, api_key.expose_secret())
            .json(&body);

        let response: GenerateContentResponse = send(self.display_name(), request).await?;

        response.into_reply()
    }

    async fn forward(&self, api_key: &SecretString, mut body: Value) -> crate::Result<Value> {
        // The model is part of the path, not the body.
        let model = body
            .as_object_mut()
            .and_then(|object| object.remove("model"))
            .and_then(|model| model.as_str().map(str::to_string))
            .unwrap_or_else(|| self.default_model.clone());

        let request = self
            .client
            .post(self.generate_url(&model))
            .header(API_KEY_HEADER, api_key.expose_secret())
            .json(&body);

        send(self.display_name(), request).await
    }
}
