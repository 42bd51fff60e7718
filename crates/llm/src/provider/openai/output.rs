use serde::Deserialize;

use crate::{
    error::LlmError,
    messages::{ProviderReply, Usage},
};

#[derive(Debug, Deserialize)]
pub(crate) struct OpenAiResponse {
    #[serde(default)]
    pub choices: Vec<Choice>,
    pub usage: Option<OpenAiUsage>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Choice {
    pub message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChoiceMessage {
    /// Null when the model answered with tool calls only.
    pub content: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct OpenAiUsage {
    pub prompt_tokens: Option<u64>,
    pub completion_tokens: Option<u64>,
    pub total_tokens: Option<u64>,
}

impl OpenAiResponse {
    pub fn into_reply(self, vendor: &str) -> crate::Result<ProviderReply> {
        let Some(choice) = self.choices.into_iter().next() else {
            log::error!("{vendor} returned no choices");
            return Err(LlmError::InvalidResponse(format!("{vendor} returned no choices")));
        };

        let usage = self
            .usage
            .map(|usage| Usage::reported(usage.prompt_tokens, usage.completion_tokens, usage.total_tokens))
            .unwrap_or_default();

        Ok(ProviderReply {
            content: choice.message.content.unwrap_or_default(),
            usage,
        })
    }
}
