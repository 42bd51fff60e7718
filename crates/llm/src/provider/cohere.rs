use async_trait::async_trait;
use config::{ModelDefaults, ProviderCategory, ProviderKind};
use reqwest::{Client, header::HeaderMap};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    error::LlmError,
    messages::{CallOptions, ChatMessage, ProviderReply, Role, Usage},
    provider::{ProviderAdapter, Settings, endpoint, http_client::default_http_client_builder, send},
};

/// Body of Cohere's chat endpoint: the last turn plus the history before it.
#[derive(Debug, Serialize)]
struct CohereChatRequest<'a> {
    model: &'a str,
    message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    chat_history: Vec<CohereTurn>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct CohereTurn {
    role: &'static str,
    message: String,
}

#[derive(Debug, Deserialize)]
struct CohereChatResponse {
    #[serde(default)]
    text: String,
}

impl<'a> CohereChatRequest<'a> {
    fn new(mut messages: Vec<ChatMessage>, settings: &'a Settings) -> Self {
        let message = messages.pop().map(|last| last.content).unwrap_or_default();

        let chat_history = messages
            .into_iter()
            .map(|turn| CohereTurn {
                role: match turn.role {
                    Role::System => "SYSTEM",
                    Role::User => "USER",
                    Role::Assistant => "CHATBOT",
                },
                message: turn.content,
            })
            .collect();

        Self {
            model: &settings.model,
            message,
            chat_history,
            max_tokens: settings.max_tokens,
            temperature: settings.temperature,
        }
    }
}

/// Cohere does not report usage in a form we track, so replies carry an estimate.
pub struct CohereProvider {
    client: Client,
    base_url: String,
}

impl CohereProvider {
    pub fn new(base_url: impl Into<String>) -> crate::Result<Self> {
        let client = default_http_client_builder(HeaderMap::new()).build().map_err(|e| {
            log::error!("Failed to create HTTP client for Cohere provider: {e}");
            LlmError::InternalError(None)
        })?;

        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    fn chat_url(&self) -> String {
        endpoint(&self.base_url, "chat")
    }
}

#[async_trait]
impl ProviderAdapter for CohereProvider {
    fn name(&self) -> &str {
        ProviderKind::Cohere.name()
    }

    fn display_name(&self) -> &str {
        ProviderKind::Cohere.display_name()
    }

    fn api_url(&self) -> &str {
        &self.base_url
    }

    fn category(&self) -> ProviderCategory {
        ProviderKind::Cohere.category()
    }

    async fn call(
        &self,
        api_key: &SecretString,
        options: &CallOptions,
        defaults: &ModelDefaults,
    ) -> crate::Result<ProviderReply> {
        let settings = Settings::resolve(options, defaults);
        let body = CohereChatRequest::new(options.input.messages(), &settings);

        let request = self
            .client
            .post(self.chat_url())
            .bearer_auth(api_key.expose_secret())
            .json(&body);

        let response: CohereChatResponse = send(self.display_name(), request).await?;
        let usage = Usage::estimated(&options.input.text(), &response.text);

        Ok(ProviderReply {
            content: response.text,
            usage,
        })
    }

    async fn forward(&self, api_key: &SecretString, body: Value) -> crate::Result<Value> {
        let request = self
            .client
            .post(self.chat_url())
            .bearer_auth(api_key.expose_secret())
            .json(&body);

        send(self.display_name(), request).await
    }
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use config::ModelDefaults;
    use secrecy::SecretString;
    use serde_json::json;

    use super::CohereProvider;
    use crate::{
        messages::{CallOptions, ChatMessage, Prompt, Role},
        provider::ProviderAdapter,
        test_support::mock_vendor,
    };

    #[tokio::test]
    async fn splits_history_and_estimates_usage() {
        let vendor = mock_vendor(StatusCode::OK, json!({ "text": "a".repeat(30), "generation_id": "g1" })).await;
        let provider = CohereProvider::new(vendor.base_url()).unwrap();

        let options = CallOptions {
            provider: "cohere".to_string(),
            model: None,
            input: Prompt::Messages(vec![
                ChatMessage::new(Role::Assistant, "Hi"),
                ChatMessage::user("p".repeat(7)),
            ]),
            max_tokens: None,
            temperature: Some(1.0),
            user_id: "u1".to_string(),
            plan_id: "pro".to_string(),
        };

        let defaults = ModelDefaults {
            model: "command".to_string(),
            max_tokens: 2048,
            temperature: 0.7,
        };

        let reply = provider
            .call(&SecretString::from("co-key".to_string()), &options, &defaults)
            .await
            .unwrap();

        // "Hi\nppppppp" is 10 characters, the answer 30.
        assert_eq!(reply.usage.total_tokens, Some(10));
        assert!(reply.usage.estimated);

        let request = vendor.single_request();

        assert_eq!(request.path, "/chat");
        assert_eq!(
            request.body,
            json!({
                "model": "command",
                "message": "ppppppp",
                "chat_history": [{ "role": "CHATBOT", "message": "Hi" }],
                "max_tokens": 2048,
                "temperature": 1.0
            })
        );
    }
}
