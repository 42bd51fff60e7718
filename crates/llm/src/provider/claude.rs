mod input;
mod output;

use async_trait::async_trait;
use config::{ModelDefaults, ProviderCategory, ProviderKind};
use reqwest::{
    Client,
    header::{HeaderMap, HeaderValue},
};
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;

use self::{input::MessagesRequest, output::MessagesResponse};
use crate::{
    error::LlmError,
    messages::{CallOptions, ProviderReply},
    provider::{ProviderAdapter, Settings, endpoint, http_client::default_http_client_builder, send},
};

const ANTHROPIC_VERSION: &str = "2023-06-01";

pub struct ClaudeProvider {
    client: Client,
    base_url: String,
}

impl ClaudeProvider {
    pub fn new(base_url: impl Into<String>) -> crate::Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert("anthropic-version", HeaderValue::from_static(ANTHROPIC_VERSION));

        let client = default_http_client_builder(headers).build().map_err(|e| {
            log::error!("Failed to create HTTP client for Claude provider: {e}");
            LlmError::InternalError(None)
        })?;

        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    fn messages_url(&self) -> String {
        endpoint(&self.base_url, "messages")
    }
}

#[async_trait]
impl ProviderAdapter for ClaudeProvider {
    fn name(&self) -> &str {
        ProviderKind::Claude.name()
    }

    fn display_name(&self) -> &str {
        ProviderKind::Claude.display_name()
    }

    fn api_url(&self) -> &str {
        &self.base_url
    }

    fn category(&self) -> ProviderCategory {
        ProviderKind::Claude.category()
    }

    async fn call(
        &self,
        api_key: &SecretString,
        options: &CallOptions,
        defaults: &ModelDefaults,
    ) -> crate::Result<ProviderReply> {
        let settings = Settings::resolve(options, defaults);
        let body = MessagesRequest::new(options.input.messages(), &settings);

        if body.messages.is_empty() {
            return Err(LlmError::InvalidRequest(
                "Claude needs at least one user or assistant message".to_string(),
            ));
        }

        log::debug!("Claude messages request with model {}", settings.model);

        let request = self
            .client
            .post(self.messages_url())
            .header("x-api-key", api_key.expose_secret())
            .json(&body);

        let response: MessagesResponse = send(self.display_name(), request).await?;

        Ok(ProviderReply::from(response))
    }

    async fn forward(&self, api_key: &SecretString, body: Value) -> crate::Result<Value> {
        let request = self
            .client
            .post(self.messages_url())
            .header("x-api-key", api_key.expose_secret())
            .json(&body);

        send(self.display_name(), request).await
    }
}
