use serde::Deserialize;

use crate::{
    error::LlmError,
    messages::{ProviderReply, Usage},
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    pub usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Candidate {
    /// Missing when the candidate was blocked by safety filters.
    pub content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CandidateContent {
    #[serde(default)]
    pub parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ResponsePart {
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct UsageMetadata {
    pub prompt_token_count: Option<u64>,
    pub candidates_token_count: Option<u64>,
    pub total_token_count: Option<u64>,
}

impl GenerateContentResponse {
    pub fn into_reply(self) -> crate::Result<ProviderReply> {
        let Some(content) = self.candidates.into_iter().next().and_then(|candidate| candidate.content) else {
            log::error!("Gemini returned no candidate content");
            return Err(LlmError::InvalidResponse("Gemini returned no candidates".to_string()));
        };

        let content = content.parts.into_iter().filter_map(|part| part.text).collect();

        let usage = self
            .usage_metadata
            .map(|usage| {
                Usage::reported(
                    usage.prompt_token_count,
                    usage.candidates_token_count,
                    usage.total_token_count,
                )
            })
            .unwrap_or_default();

        Ok(ProviderReply { content, usage })
    }
}
