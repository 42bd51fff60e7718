pub(crate) mod input;
pub(crate) mod output;

use async_trait::async_trait;
use config::{ModelDefaults, ProviderCategory, ProviderKind};
use reqwest::{
    Client,
    header::{HeaderMap, HeaderValue},
};
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;

use self::{input::OpenAiRequest, output::OpenAiResponse};
use crate::{
    error::LlmError,
    messages::{CallOptions, ProviderReply},
    provider::{ProviderAdapter, Settings, endpoint, http_client::default_http_client_builder, send},
};

const OPENROUTER_REFERER: &str = "https://github.com/naya-app/naya";
const OPENROUTER_TITLE: &str = "Naya";

/// Adapter for every vendor speaking the OpenAI chat completion protocol with a bearer key.
pub struct OpenAiCompatibleProvider {
    kind: ProviderKind,
    client: Client,
    base_url: String,
}

impl OpenAiCompatibleProvider {
    pub fn new(kind: ProviderKind, base_url: impl Into<String>) -> crate::Result<Self> {
        let mut headers = HeaderMap::new();

        // OpenRouter attributes traffic to the calling application.
        if kind == ProviderKind::OpenRouter {
            headers.insert("HTTP-Referer", HeaderValue::from_static(OPENROUTER_REFERER));
            headers.insert("X-Title", HeaderValue::from_static(OPENROUTER_TITLE));
        }

        let client = default_http_client_builder(headers).build().map_err(|e| {
            log::error!("Failed to create HTTP client for {} provider: {e}", kind.display_name());
            LlmError::InternalError(None)
        })?;

        Ok(Self {
            kind,
            client,
            base_url: base_url.into(),
        })
    }

    fn completions_url(&self) -> String {
        endpoint(&self.base_url, "chat/completions")
    }
}

#[async_trait]
impl ProviderAdapter for OpenAiCompatibleProvider {
    fn name(&self) -> &str {
        self.kind.name()
    }

    fn display_name(&self) -> &str {
        self.kind.display_name()
    }

    fn api_url(&self) -> &str {
        &self.base_url
    }

    fn category(&self) -> ProviderCategory {
        self.kind.category()
    }

    async fn call(
        &self,
        api_key: &SecretString,
        options: &CallOptions,
        defaults: &ModelDefaults,
    ) -> crate::Result<ProviderReply> {
        let settings = Settings::resolve(options, defaults);
        let body = OpenAiRequest::new(options.input.messages(), &settings);

        log::debug!("{} chat completion with model {}", self.display_name(), settings.model);

        let request = self
            .client
            .post(self.completions_url())
            .bearer_auth(api_key.expose_secret())
            .json(&body);

        let response: OpenAiResponse = send(self.display_name(), request).await?;

        response.into_reply(self.display_name())
    }

    async fn forward(&self, api_key: &SecretString, body: Value) -> crate::Result<Value> {
        let request = self
            .client
            .post(self.completions_url())
            .bearer_auth(api_key.expose_secret())
            .json(&body);

        send(self.display_name(), request).await
    }
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use config::{ModelDefaults, ProviderKind};
    use secrecy::SecretString;
    use serde_json::json;

    use super::OpenAiCompatibleProvider;
    use crate::{
        error::LlmError,
        messages::{CallOptions, ChatMessage, Prompt, Role},
        provider::ProviderAdapter,
        test_support::mock_vendor,
    };

    fn options() -> CallOptions {
        CallOptions {
            provider: "groq".to_string(),
            model: None,
            input: Prompt::Messages(vec![
                ChatMessage::new(Role::System, "Be brief."),
                ChatMessage::user("Hello"),
            ]),
            max_tokens: Some(0),
            temperature: Some(0.0),
            user_id: "u1".to_string(),
            plan_id: "pro".to_string(),
        }
    }

    fn defaults() -> ModelDefaults {
        ModelDefaults {
            model: "llama3-70b-8192".to_string(),
            max_tokens: 2048,
            temperature: 0.7,
        }
    }

    fn key() -> SecretString {
        SecretString::from("sk-test".to_string())
    }

    #[tokio::test]
    async fn sends_chat_completion_and_normalizes() {
        let vendor = mock_vendor(
            StatusCode::OK,
            json!({
                "choices": [{ "message": { "role": "assistant", "content": "Hi!" } }],
                "usage": { "prompt_tokens": 12, "completion_tokens": 3, "total_tokens": 15 }
            }),
        )
        .await;

        let provider = OpenAiCompatibleProvider::new(ProviderKind::Groq, vendor.base_url()).unwrap();
        let reply = provider.call(&key(), &options(), &defaults()).await.unwrap();

        assert_eq!(reply.content, "Hi!");
        assert_eq!(reply.usage.total_tokens, Some(15));

        let request = vendor.single_request();

        assert_eq!(request.path, "/chat/completions");
        assert_eq!(request.headers["authorization"], "Bearer sk-test");

        assert_eq!(
            request.body,
            json!({
                "model": "llama3-70b-8192",
                "messages": [
                    { "role": "system", "content": "Be brief." },
                    { "role": "user", "content": "Hello" }
                ],
                "max_tokens": 2048,
                "temperature": 0.0
            })
        );
    }

    #[tokio::test]
    async fn vendor_errors_carry_status_and_message() {
        let vendor = mock_vendor(
            StatusCode::UNAUTHORIZED,
            json!({ "error": { "message": "Incorrect API key provided" } }),
        )
        .await;

        let provider = OpenAiCompatibleProvider::new(ProviderKind::DeepSeek, vendor.base_url()).unwrap();
        let error = provider.call(&key(), &options(), &defaults()).await.unwrap_err();

        insta::assert_snapshot!(error, @"DeepSeek API error (401): Incorrect API key provided");
    }

    #[tokio::test]
    async fn unreachable_vendor_is_a_connection_error() {
        let provider = OpenAiCompatibleProvider::new(ProviderKind::OpenAi, "http://127.0.0.1:1").unwrap();
        let error = provider.call(&key(), &options(), &defaults()).await.unwrap_err();

        assert!(matches!(error, LlmError::ConnectionError(_)));
        assert!(error.is_transient());
    }

    #[tokio::test]
    async fn openrouter_identifies_the_application() {
        let vendor = mock_vendor(StatusCode::OK, json!({ "choices": [{ "message": { "content": "ok" } }] })).await;

        let provider = OpenAiCompatibleProvider::new(ProviderKind::OpenRouter, vendor.base_url()).unwrap();
        provider.call(&key(), &options(), &defaults()).await.unwrap();

        let request = vendor.single_request();

        assert_eq!(request.headers["x-title"], "Naya");
        assert!(request.headers.contains_key("http-referer"));
    }

    #[tokio::test]
    async fn forward_passes_the_body_through() {
        let vendor = mock_vendor(StatusCode::OK, json!({ "id": "cmpl-1", "choices": [] })).await;

        let provider = OpenAiCompatibleProvider::new(ProviderKind::Mistral, vendor.base_url()).unwrap();
        let body = json!({ "model": "mistral-tiny", "messages": [], "safe_prompt": true });

        let response = provider.forward(&key(), body.clone()).await.unwrap();

        assert_eq!(response["id"], "cmpl-1");
        assert_eq!(vendor.single_request().body, body);
    }
}
