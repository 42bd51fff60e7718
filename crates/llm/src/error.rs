use std::time::Duration;

use axum::{
    Json,
    http::{HeaderValue, StatusCode, header::RETRY_AFTER},
    response::{IntoResponse, Response},
};
use jiff::Timestamp;
use serde_json::{Map, Value, json};
use thiserror::Error;

pub type LlmResult<T> = std::result::Result<T, LlmError>;

/// Errors of the AI call path, each with an HTTP status.
#[derive(Debug, Error)]
pub enum LlmError {
    /// Malformed request body or call options.
    #[error("{0}")]
    InvalidRequest(String),

    /// The request reached an AI route without an authenticated identity.
    #[error("Authentication required")]
    Unauthenticated,

    /// No adapter is registered under the requested name.
    #[error("Unsupported provider: {0}")]
    UnsupportedProvider(String),

    /// The caller's plan does not include the provider.
    #[error("{provider} not available on plan {plan}")]
    NotEntitled {
        provider: String,
        plan: String,
        allowed: Vec<&'static str>,
    },

    /// Per-minute or per-day window of the caller is exhausted.
    #[error("Rate limit exceeded. Please wait {wait_minutes} minute(s). Remaining requests today: {}", remaining_label(*.remaining_day))]
    RateLimited {
        wait_minutes: u64,
        remaining_day: Option<u32>,
    },

    /// Persistent daily quota is used up.
    #[error("Daily limit reached")]
    DailyQuotaExceeded { limit: u32, reset_at: Timestamp },

    /// The provider exists but has no model configuration for the plan.
    #[error("{provider} is not configured for plan {plan}")]
    NotConfiguredForPlan { provider: String, plan: String },

    /// Neither a user key nor a managed key is available.
    #[error("No API key available for {0}. Configure your own {0} API key in settings to keep using it.")]
    MissingApiKey(String),

    /// The server holds no key for the provider.
    #[error("Provider not configured")]
    ProviderNotConfigured(String),

    /// Adapter settings are incomplete, e.g. an Azure deployment without an endpoint.
    #[error("{0}")]
    Configuration(String),

    /// The vendor answered with a non-success status.
    #[error("{provider} API error ({status}): {message}")]
    ProviderApiError {
        provider: String,
        status: u16,
        message: String,
    },

    /// The vendor answered with a body we cannot interpret.
    #[error("{0}")]
    InvalidResponse(String),

    /// Network or connection error.
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// One attempt did not complete within the configured deadline.
    #[error("{provider} did not respond within {}s", .after.as_secs_f32())]
    Timeout { provider: String, after: Duration },

    /// A quota or key store failed.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Internal server error.
    /// If Some(message), it is safe to show. If None, details stay in the logs.
    #[error("Internal server error")]
    InternalError(Option<String>),
}

fn remaining_label(remaining_day: Option<u32>) -> String {
    remaining_day.map_or_else(|| "unlimited".to_string(), |day| day.to_string())
}

impl LlmError {
    /// Get the appropriate HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) | Self::UnsupportedProvider(_) => StatusCode::BAD_REQUEST,
            Self::Unauthenticated => StatusCode::UNAUTHORIZED,
            Self::NotEntitled { .. } => StatusCode::FORBIDDEN,
            Self::RateLimited { .. } | Self::DailyQuotaExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            // The vendor's own error status reaches the client.
            Self::ProviderApiError { status, .. } => StatusCode::from_u16(*status)
                .ok()
                .filter(|status| status.is_client_error() || status.is_server_error())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            Self::ConnectionError(_)
            | Self::InvalidResponse(_)
            | Self::Timeout { .. }
            | Self::NotConfiguredForPlan { .. }
            | Self::MissingApiKey(_)
            | Self::ProviderNotConfigured(_)
            | Self::Configuration(_)
            | Self::Storage(_)
            | Self::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error type string for the response.
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) | Self::UnsupportedProvider(_) => "invalid_request_error",
            Self::Unauthenticated => "authentication_error",
            Self::NotEntitled { .. } => "entitlement_error",
            Self::RateLimited { .. } | Self::DailyQuotaExceeded { .. } => "rate_limit_error",
            Self::NotConfiguredForPlan { .. }
            | Self::MissingApiKey(_)
            | Self::ProviderNotConfigured(_)
            | Self::Configuration(_) => "configuration_error",
            Self::ProviderApiError { .. } | Self::InvalidResponse(_) => "api_error",
            Self::ConnectionError(_) | Self::Timeout { .. } => "transport_error",
            Self::Storage(_) | Self::InternalError(_) => "internal_error",
        }
    }

    /// Message that is safe to expose to API consumers.
    pub fn client_message(&self) -> String {
        match self {
            Self::InternalError(Some(message)) => message.clone(),
            Self::Storage(_) => "Internal server error".to_string(),
            _ => self.to_string(),
        }
    }

    /// Failures worth another attempt: the vendor was unreachable, too slow or broken.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::ConnectionError(_) | Self::Timeout { .. } => true,
            Self::ProviderApiError { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Renders the error, adding the full message as `details` to 5xx responses when
    /// `development` is set.
    pub fn to_response(self, development: bool) -> Response {
        let status = self.status_code();

        let mut body = Map::new();
        body.insert("success".into(), Value::Bool(false));
        body.insert("error".into(), Value::String(self.client_message()));
        body.insert("type".into(), Value::String(self.error_type().into()));

        let mut retry_after = None;

        match &self {
            Self::NotEntitled { allowed, .. } => {
                body.insert("allowedProviders".into(), json!(allowed));
            }
            Self::DailyQuotaExceeded { limit, reset_at } => {
                body.insert("limit".into(), json!(limit));
                body.insert("resetAt".into(), json!(reset_at.to_string()));

                let seconds = reset_at.as_second() - Timestamp::now().as_second();
                retry_after = Some(seconds.max(1).unsigned_abs());
            }
            Self::RateLimited { wait_minutes, .. } => {
                retry_after = Some(wait_minutes * 60);
            }
            _ => (),
        }

        if development && status.is_server_error() {
            body.insert("details".into(), Value::String(format!("{self:?}")));
        }

        let mut response = (status, Json(Value::Object(body))).into_response();

        if let Some(seconds) = retry_after
            && let Ok(value) = HeaderValue::from_str(&seconds.to_string())
        {
            response.headers_mut().insert(RETRY_AFTER, value);
        }

        response
    }
}

impl From<store::StoreError> for LlmError {
    fn from(error: store::StoreError) -> Self {
        log::error!("Store failure: {error}");
        Self::Storage(error.to_string())
    }
}

impl From<rate_limit::StorageError> for LlmError {
    fn from(error: rate_limit::StorageError) -> Self {
        log::error!("Rate limit storage failure: {error}");
        Self::Storage(error.to_string())
    }
}

impl IntoResponse for LlmError {
    fn into_response(self) -> Response {
        self.to_response(false)
    }
}
