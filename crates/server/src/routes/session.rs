use std::sync::Arc;

use axum::{
    Json,
    extract::{Extension, State},
};
use context::ClientIdentity;
use http::{Extensions, HeaderMap, header::USER_AGENT};
use jiff::{SignedDuration, Timestamp};
use serde::Serialize;
use store::Session;

use super::{ApiError, AppState};
use crate::client_ip::client_ip;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SessionCreated {
    success: bool,
    session_token: String,
    expires_at: Timestamp,
}

/// Issues an opaque session token for the authenticated user.
pub(crate) async fn create_session(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<ClientIdentity>,
    headers: HeaderMap,
    extensions: Extensions,
) -> Result<Json<SessionCreated>, ApiError> {
    let token = hex::encode(rand::random::<[u8; 32]>());

    let ttl = SignedDuration::try_from(state.config.auth.session_ttl)
        .map_err(|e| ApiError::Internal(format!("invalid session ttl: {e}")))?;

    let created_at = Timestamp::now();
    let expires_at = created_at
        .checked_add(ttl)
        .map_err(|e| ApiError::Internal(format!("session expiry out of range: {e}")))?;

    let session = Session {
        user_id: identity.user_id.clone(),
        user_agent: headers
            .get(USER_AGENT)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string),
        ip: client_ip(&state.config.server.client_ip, &headers, &extensions).map(|ip| ip.to_string()),
        created_at,
        expires_at,
    };

    state.stores.sessions.insert_session(&token, session).await?;

    log::debug!("Issued session for user {}", identity.user_id);

    Ok(Json(SessionCreated {
        success: true,
        session_token: token,
        expires_at,
    }))
}
