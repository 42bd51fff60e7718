//! Routes of the server shell: health, sessions and managed keys.

mod health;
mod keys;
mod session;

use std::sync::Arc;

use axum::{
    Json, Router,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use config::Config;
use http::StatusCode;
use llm::{LlmError, ServerKeys};
use serde_json::json;
use store::StoreError;

use crate::{Stores, crypto::TokenCipher};

pub(crate) use health::health;

pub(crate) struct AppState {
    pub config: Arc<Config>,
    pub stores: Stores,
    pub server_keys: Arc<ServerKeys>,
    /// Absent when no encryption key is configured.
    pub cipher: Option<TokenCipher>,
}

/// Authenticated routes. The caller adds the auth middleware.
pub(crate) fn api_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/auth/session", post(session::create_session))
        .route(
            "/api/keys/managed",
            get(keys::issue_managed_tokens).post(keys::managed_key),
        )
        .route("/api/keys/rotate", post(keys::rotate_key))
        .with_state(state)
}

pub(crate) async fn not_found() -> Response {
    let body = json!({
        "error": "Not Found",
        "message": "Route not found",
    });

    (StatusCode::NOT_FOUND, Json(body)).into_response()
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{message}")]
    Forbidden { error: &'static str, message: String },
    #[error(transparent)]
    Llm(#[from] LlmError),
    #[error("{0}")]
    Internal(String),
}

impl From<StoreError> for ApiError {
    fn from(error: StoreError) -> Self {
        Self::Internal(format!("storage failure: {error}"))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::BadRequest(message) => (
                StatusCode::BAD_REQUEST,
                json!({ "error": "Validation error", "message": message }),
            ),
            ApiError::Forbidden { error, message } => {
                (StatusCode::FORBIDDEN, json!({ "error": error, "message": message }))
            }
            ApiError::Llm(error) => return error.into_response(),
            ApiError::Internal(message) => {
                log::error!("Request failed: {message}");
                (StatusCode::INTERNAL_SERVER_ERROR, json!({ "error": "Internal server error" }))
            }
        };

        (status, Json(body)).into_response()
    }
}
