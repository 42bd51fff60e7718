use serde::Serialize;

use crate::{
    messages::{ChatMessage, Role},
    provider::Settings,
};

/// Body of the Messages API.
#[derive(Debug, Serialize)]
pub(crate) struct MessagesRequest {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    /// System prompt. Claude rejects `system` turns inside `messages`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    pub messages: Vec<ClaudeMessage>,
}

#[derive(Debug, Serialize)]
pub(crate) struct ClaudeMessage {
    pub role: &'static str,
    pub content: String,
}

impl MessagesRequest {
    pub fn new(messages: Vec<ChatMessage>, settings: &Settings) -> Self {
        let mut system = Vec::new();
        let mut turns = Vec::with_capacity(messages.len());

        for message in messages {
            match message.role {
                Role::System => system.push(message.content),
                Role::User => turns.push(ClaudeMessage {
                    role: "user",
                    content: message.content,
                }),
                Role::Assistant => turns.push(ClaudeMessage {
                    role: "assistant",
                    content: message.content,
                }),
            }
        }

        Self {
            model: settings.model.clone(),
            max_tokens: settings.max_tokens,
            temperature: settings.temperature,
            system: (!system.is_empty()).then(|| system.join("\n\n")),
            messages: turns,
        }
    }
}
