use async_trait::async_trait;
use config::{ModelDefaults, ProviderCategory, ProviderKind};
use reqwest::{Client, header::HeaderMap};
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;

use super::openai::{input::OpenAiRequest, output::OpenAiResponse};
use crate::{
    error::LlmError,
    messages::{CallOptions, ProviderReply},
    provider::{ProviderAdapter, Settings, http_client::default_http_client_builder, send},
};

/// Azure OpenAI deployment. The model is fixed by the deployment, not by the request.
pub struct AzureOpenAiProvider {
    client: Client,
    endpoint: Option<String>,
    deployment: Option<String>,
    api_version: String,
}

impl AzureOpenAiProvider {
    pub fn new(endpoint: Option<String>, deployment: Option<String>, api_version: impl Into<String>) -> crate::Result<Self> {
        let client = default_http_client_builder(HeaderMap::new()).build().map_err(|e| {
            log::error!("Failed to create HTTP client for Azure OpenAI provider: {e}");
            LlmError::InternalError(None)
        })?;

        Ok(Self {
            client,
            endpoint: endpoint.map(|endpoint| endpoint.trim_end_matches('/').to_string()),
            deployment,
            api_version: api_version.into(),
        })
    }

    fn completions_url(&self) -> crate::Result<String> {
        let (Some(endpoint), Some(deployment)) = (&self.endpoint, &self.deployment) else {
            return Err(LlmError::Configuration(
                "Azure OpenAI needs an endpoint and a deployment name".to_string(),
            ));
        };

        Ok(format!(
            "{endpoint}/openai/deployments/{deployment}/chat/completions?api-version={}",
            self.api_version
        ))
    }
}

#[async_trait]
impl ProviderAdapter for AzureOpenAiProvider {
    fn name(&self) -> &str {
        ProviderKind::AzureOpenAi.name()
    }

    fn display_name(&self) -> &str {
        ProviderKind::AzureOpenAi.display_name()
    }

    fn api_url(&self) -> &str {
        self.endpoint.as_deref().unwrap_or_default()
    }

    fn category(&self) -> ProviderCategory {
        ProviderKind::AzureOpenAi.category()
    }

    async fn call(
        &self,
        api_key: &SecretString,
        options: &CallOptions,
        defaults: &ModelDefaults,
    ) -> crate::Result<ProviderReply> {
        let url = self.completions_url()?;
        let settings = Settings::resolve(options, defaults);
        let body = OpenAiRequest::new(options.input.messages(), &settings).without_model();

        let request = self
            .client
            .post(url)
            .header("api-key", api_key.expose_secret())
            .json(&body);

        let response: OpenAiResponse = send(self.display_name(), request).await?;

        response.into_reply(self.display_name())
    }

    async fn forward(&self, api_key: &SecretString, body: Value) -> crate::Result<Value> {
        let request = self
            .client
            .post(self.completions_url()?)
            .header("api-key", api_key.expose_secret())
            .json(&body);

        send(self.display_name(), request).await
    }
}
