use std::{collections::BTreeMap, str::FromStr, sync::Arc};

use axum::{
    Json,
    extract::{Extension, State, rejection::JsonRejection},
};
use config::{ProviderAllowList, ProviderKind};
use context::ClientIdentity;
use http::{Extensions, HeaderMap, header::ORIGIN};
use jiff::{SignedDuration, Timestamp};
use llm::{KeyRequester, LlmError};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use store::{ApiToken, NewManagedKey};
use strum::IntoEnumIterator;

use super::{ApiError, AppState};
use crate::{client_ip::client_ip, crypto::EncryptedPayload};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ManagedTokens {
    success: bool,
    tokens: BTreeMap<&'static str, EncryptedPayload>,
    expires_in: u64,
}

/// Hands out short-lived, encrypted stand-in tokens for every managed provider the
/// caller's plan covers and the server holds a key for.
pub(crate) async fn issue_managed_tokens(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<ClientIdentity>,
) -> Result<Json<ManagedTokens>, ApiError> {
    let plan = state.config.plans.resolve(&identity.plan);
    let managed = &plan.config.managed_key_providers;

    if !offers_managed_keys(managed) {
        return Err(ApiError::Forbidden {
            error: "Access denied",
            message: "Managed keys are available on the Pro and Enterprise plans".to_string(),
        });
    }

    let Some(cipher) = &state.cipher else {
        return Err(ApiError::Internal("no encryption key configured".to_string()));
    };

    let ttl = state.config.auth.api_token_ttl;
    let signed_ttl = SignedDuration::try_from(ttl).map_err(|e| ApiError::Internal(format!("invalid token ttl: {e}")))?;

    let mut tokens = BTreeMap::new();

    for kind in ProviderKind::iter().filter(|kind| managed.allows(*kind)) {
        if !state.server_keys.is_available(kind).await? {
            continue;
        }

        let token = hex::encode(rand::random::<[u8; 32]>());
        let created_at = Timestamp::now();

        let api_token = ApiToken {
            user_id: identity.user_id.clone(),
            provider: kind.name().to_string(),
            created_at,
            expires_at: created_at
                .checked_add(signed_ttl)
                .map_err(|e| ApiError::Internal(format!("token expiry out of range: {e}")))?,
        };

        state.stores.api_tokens.insert_api_token(&token, api_token).await?;

        let sealed = cipher
            .encrypt(&token)
            .map_err(|e| ApiError::Internal(format!("failed to seal {kind} token: {e}")))?;

        tokens.insert(kind.name(), sealed);
    }

    log::debug!(
        "Issued {} managed token(s) to user {} on plan {}",
        tokens.len(),
        identity.user_id,
        plan.id
    );

    Ok(Json(ManagedTokens {
        success: true,
        tokens,
        expires_in: ttl.as_secs(),
    }))
}

#[derive(Debug, Deserialize)]
pub(crate) struct ManagedKeyRequest {
    provider: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ManagedKeyResponse {
    success: bool,
    api_key: String,
}

/// Returns a platform-held key to an active subscriber whose plan includes managed
/// keys for the provider.
pub(crate) async fn managed_key(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<ClientIdentity>,
    headers: HeaderMap,
    extensions: Extensions,
    body: Result<Json<ManagedKeyRequest>, JsonRejection>,
) -> Result<Json<ManagedKeyResponse>, ApiError> {
    let Json(request) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    if !identity.subscription_active {
        return Err(ApiError::Forbidden {
            error: "Access denied",
            message: "An active subscription is required".to_string(),
        });
    }

    let kind = ProviderKind::from_str(request.provider.trim())
        .map_err(|_| LlmError::UnsupportedProvider(request.provider.clone()))?;

    let plan = state.config.plans.resolve(&identity.plan);

    if !plan.config.managed_key_providers.allows(kind) || !plan.config.providers.allows(kind) {
        return Err(ApiError::Forbidden {
            error: "Access denied",
            message: format!("Managed {} keys are not included in the {} plan", kind.display_name(), plan.id),
        });
    }

    let requester = KeyRequester {
        origin: headers
            .get(ORIGIN)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string),
        ip: client_ip(&state.config.server.client_ip, &headers, &extensions),
    };

    let Some(key) = state.server_keys.select(kind, Some(&requester)).await? else {
        return Err(LlmError::ProviderNotConfigured(kind.name().to_string()).into());
    };

    log::debug!("Handed out a managed {kind} key to user {}", identity.user_id);

    Ok(Json(ManagedKeyResponse {
        success: true,
        api_key: key.expose_secret().to_string(),
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RotateKeyRequest {
    provider: String,
    api_key: SecretString,
    expires_at: Option<Timestamp>,
    #[serde(default)]
    allowed_origins: Vec<String>,
    #[serde(default)]
    allowed_ips: Vec<String>,
    #[serde(default = "deactivate_previous_default")]
    deactivate_previous: bool,
}

fn deactivate_previous_default() -> bool {
    true
}

#[derive(Debug, Serialize)]
pub(crate) struct KeyRotated {
    success: bool,
    provider: &'static str,
    version: u32,
}

/// Adds a managed key version. Administrators only.
pub(crate) async fn rotate_key(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<ClientIdentity>,
    body: Result<Json<RotateKeyRequest>, JsonRejection>,
) -> Result<Json<KeyRotated>, ApiError> {
    if !identity.admin {
        return Err(ApiError::Forbidden {
            error: "Forbidden",
            message: "Administrator access required".to_string(),
        });
    }

    let Json(request) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    let kind = ProviderKind::from_str(request.provider.trim())
        .map_err(|_| LlmError::UnsupportedProvider(request.provider.clone()))?;

    if request.api_key.expose_secret().trim().is_empty() {
        return Err(ApiError::BadRequest("apiKey must not be empty".to_string()));
    }

    let key = NewManagedKey {
        key: request.api_key,
        expires_at: request.expires_at,
        allowed_origins: request.allowed_origins,
        allowed_ips: request.allowed_ips,
    };

    let version = state
        .server_keys
        .rotate(kind, key, request.deactivate_previous)
        .await?;

    log::info!("User {} rotated the managed {kind} key to version {version}", identity.user_id);

    Ok(Json(KeyRotated {
        success: true,
        provider: kind.name(),
        version,
    }))
}

fn offers_managed_keys(providers: &ProviderAllowList) -> bool {
    match providers {
        ProviderAllowList::All => true,
        ProviderAllowList::Only(providers) => !providers.is_empty(),
    }
}
