use serde::Deserialize;

use crate::messages::{ProviderReply, Usage};

/// Kind of a content block in a Messages API response.
#[derive(Debug, Deserialize, PartialEq)]
pub enum ContentType {
    #[serde(rename = "text")]
    Text,
    /// Any block type we do not read, e.g. `tool_use` or `thinking`.
    #[serde(untagged)]
    Other(String),
}

#[derive(Debug, Deserialize)]
pub(crate) struct MessagesResponse {
    #[serde(default)]
    pub content: Vec<ContentBlock>,
    pub usage: Option<ClaudeUsage>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ContentBlock {
    pub r#type: ContentType,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ClaudeUsage {
    pub input_tokens: Option<u64>,
    pub output_tokens: Option<u64>,
}

impl From<MessagesResponse> for ProviderReply {
    fn from(response: MessagesResponse) -> Self {
        let content = response
            .content
            .into_iter()
            .filter(|block| block.r#type == ContentType::Text)
            .filter_map(|block| block.text)
            .collect();

        let usage = response
            .usage
            .map(|usage| {
                let total = match (usage.input_tokens, usage.output_tokens) {
                    (None, None) => None,
                    (input, output) => Some(input.unwrap_or(0) + output.unwrap_or(0)),
                };

                Usage::reported(usage.input_tokens, usage.output_tokens, total)
            })
            .unwrap_or_default();

        ProviderReply { content, usage }
    }
}
