use serde::Serialize;

use crate::{messages::ChatMessage, provider::Settings};

/// Chat completion request understood by OpenAI and every vendor cloning its API.
#[derive(Debug, Serialize)]
pub(crate) struct OpenAiRequest<'a> {
    /// Omitted for Azure, where the deployment selects the model.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<&'a str>,
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl<'a> OpenAiRequest<'a> {
    pub fn new(messages: Vec<ChatMessage>, settings: &'a Settings) -> Self {
        Self {
            model: Some(&settings.model),
            messages,
            max_tokens: settings.max_tokens,
            temperature: settings.temperature,
        }
    }

    pub fn without_model(mut self) -> Self {
        self.model = None;
        self
    }
}
