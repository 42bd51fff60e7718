use serde::Serialize;

use crate::{
    messages::{ChatMessage, Role},
    provider::Settings,
};

/// Body of `models/{model}:generateContent`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GenerateContentRequest {
    pub contents: Vec<Content>,
    pub generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
pub(crate) struct Content {
    pub role: &'static str,
    pub parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
pub(crate) struct Part {
    pub text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GenerationConfig {
    pub temperature: f32,
    pub max_output_tokens: u32,
}

impl GenerateContentRequest {
    pub fn new(messages: Vec<ChatMessage>, settings: &Settings) -> Self {
        let contents = messages
            .into_iter()
            .map(|message| Content {
                // Gemini only knows `user` and `model` turns.
                role: match message.role {
                    Role::Assistant => "model",
                    Role::User | Role::System => "user",
                },
                parts: vec![Part { text: message.content }],
            })
            .collect();

        Self {
            contents,
            generation_config: GenerationConfig {
                temperature: settings.temperature,
                max_output_tokens: settings.max_tokens,
            },
        }
    }
}
