//! Normalized request and response shapes shared by every adapter.

use serde::{Deserialize, Serialize};

use crate::token_counter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }
}

/// What the caller wants answered: a flat prompt or a conversation.
#[derive(Debug, Clone, PartialEq)]
pub enum Prompt {
    Text(String),
    Messages(Vec<ChatMessage>),
}

impl Prompt {
    /// The conversation view. A flat prompt becomes a single user message.
    pub fn messages(&self) -> Vec<ChatMessage> {
        match self {
            Prompt::Text(text) => vec![ChatMessage::user(text.clone())],
            Prompt::Messages(messages) => messages.clone(),
        }
    }

    /// The prompt as one string, used for token estimation.
    pub fn text(&self) -> String {
        match self {
            Prompt::Text(text) => text.clone(),
            Prompt::Messages(messages) => messages
                .iter()
                .map(|message| message.content.as_str())
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Prompt::Text(text) => text.is_empty(),
            Prompt::Messages(messages) => messages.is_empty(),
        }
    }
}

/// One call request as seen by the orchestrator and the adapters.
///
/// Optional fields override the provider defaults. `user_id` and `plan_id` always come
/// from the authenticated caller.
#[derive(Debug, Clone, PartialEq)]
pub struct CallOptions {
    pub provider: String,
    pub model: Option<String>,
    pub input: Prompt,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub user_id: String,
    pub plan_id: String,
}

/// Token accounting in OpenAI shape.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Usage {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt_tokens: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completion_tokens: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_tokens: Option<u64>,
    /// Set when the vendor reported nothing and the total is a character-based estimate.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub estimated: bool,
}

impl Usage {
    pub fn reported(prompt_tokens: Option<u64>, completion_tokens: Option<u64>, total_tokens: Option<u64>) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens,
            estimated: false,
        }
    }

    pub fn estimated(prompt: &str, response: &str) -> Self {
        Self {
            total_tokens: Some(token_counter::estimate_tokens(prompt, response)),
            estimated: true,
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.prompt_tokens.is_none() && self.completion_tokens.is_none() && self.total_tokens.is_none()
    }

    /// Total tokens as reported, or the sum of both halves when only those are known.
    pub fn total(&self) -> Option<u64> {
        self.total_tokens.or(match (self.prompt_tokens, self.completion_tokens) {
            (None, None) => None,
            (prompt, completion) => Some(prompt.unwrap_or(0) + completion.unwrap_or(0)),
        })
    }
}

/// A normalized vendor answer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderReply {
    pub content: String,
    pub usage: Usage,
}

impl ProviderReply {
    /// Tokens to account for, estimating from the prompt when the vendor reported none.
    pub fn tokens_used(&self, prompt: &Prompt) -> u64 {
        self.usage
            .total()
            .unwrap_or_else(|| token_counter::estimate_tokens(&prompt.text(), &self.content))
    }
}

/// The uniform result returned by the managed call path, whatever the provider.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ManagedApiResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<ProviderReply>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tokens_used: Option<u64>,
}

impl ManagedApiResponse {
    pub fn success(data: ProviderReply, tokens_used: u64) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            tokens_used: Some(tokens_used),
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
            tokens_used: None,
        }
    }
}
