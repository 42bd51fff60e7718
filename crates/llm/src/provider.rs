//! Vendor adapters.
//!
//! Every adapter turns [`CallOptions`] into one vendor request and the vendor answer into
//! a [`ProviderReply`]. Adapters never retry; the call policy decides that.

mod azure;
mod claude;
mod cohere;
mod gemini;
pub(crate) mod http_client;
mod openai;

use async_trait::async_trait;
use config::{ModelDefaults, ProviderCategory};
use reqwest::RequestBuilder;
use secrecy::SecretString;
use serde::de::DeserializeOwned;
use serde_json::Value;

pub use self::{
    azure::AzureOpenAiProvider, claude::ClaudeProvider, cohere::CohereProvider, gemini::GeminiProvider,
    openai::OpenAiCompatibleProvider,
};
use crate::{
    error::LlmError,
    messages::{CallOptions, ProviderReply},
};

/// One LLM vendor.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Registry name, e.g. `openai`.
    fn name(&self) -> &str;

    /// Vendor name for messages, e.g. `OpenAI`.
    fn display_name(&self) -> &str;

    /// Base endpoint of the vendor API.
    fn api_url(&self) -> &str;

    fn category(&self) -> ProviderCategory;

    /// Sends one completion request and normalizes the answer.
    async fn call(
        &self,
        api_key: &SecretString,
        options: &CallOptions,
        defaults: &ModelDefaults,
    ) -> crate::Result<ProviderReply>;

    /// Sends a caller-built body to the vendor's completion endpoint and returns the
    /// vendor's JSON untouched.
    async fn forward(&self, api_key: &SecretString, body: Value) -> crate::Result<Value>;
}

/// Model settings of one call after applying caller overrides.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Settings {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Settings {
    /// Caller values win over defaults. An empty model or a zero token budget counts as
    /// unset; a zero temperature is a real value.
    pub fn resolve(options: &CallOptions, defaults: &ModelDefaults) -> Self {
        let model = options
            .model
            .as_deref()
            .filter(|model| !model.is_empty())
            .unwrap_or(&defaults.model)
            .to_string();

        Self {
            model,
            max_tokens: options.max_tokens.filter(|tokens| *tokens > 0).unwrap_or(defaults.max_tokens),
            temperature: options.temperature.unwrap_or(defaults.temperature),
        }
    }
}

/// Sends a prepared request and decodes the JSON answer.
///
/// Non-success statuses become [`LlmError::ProviderApiError`] carrying the vendor's own
/// message where one can be found.
pub(crate) async fn send<T: DeserializeOwned>(vendor: &str, request: RequestBuilder) -> crate::Result<T> {
    let response = request.send().await.map_err(|e| {
        log::error!("Failed to send request to {vendor}: {e}");
        LlmError::ConnectionError(format!("Failed to send request to {vendor}: {e}"))
    })?;

    let status = response.status();

    let text = response.text().await.map_err(|e| {
        log::error!("Failed to read {vendor} response body: {e}");
        LlmError::ConnectionError(format!("Failed to read {vendor} response: {e}"))
    })?;

    if !status.is_success() {
        let message = vendor_error_message(&text);
        log::error!("{vendor} API error ({status}): {message}");

        return Err(LlmError::ProviderApiError {
            provider: vendor.to_string(),
            status: status.as_u16(),
            message,
        });
    }

    serde_json::from_str(&text).map_err(|e| {
        log::error!("Failed to parse {vendor} response: {e}");
        log::debug!("Response parsing failed, length: {} bytes", text.len());

        LlmError::InvalidResponse(format!("{vendor} returned an unexpected response: {e}"))
    })
}

fn vendor_error_message(body: &str) -> String {
    let Ok(value) = serde_json::from_str::<Value>(body) else {
        return if body.trim().is_empty() {
            "no error message".to_string()
        } else {
            body.trim().to_string()
        };
    };

    value
        .pointer("/error/message")
        .or_else(|| value.get("message"))
        .or_else(|| value.get("error"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| value.to_string())
}

fn endpoint(base_url: &str, path: &str) -> String {
    format!("{}/{path}", base_url.trim_end_matches('/'))
}
