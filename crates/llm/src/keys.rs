//! Where vendor API keys come from.
//!
//! A call uses either a key the user supplied for a vendor or a platform-managed key.
//! Managed keys come from the server's key pool and configuration, or, for clients of the
//! gateway, from the gateway's managed-key endpoint.

use std::{net::IpAddr, sync::Arc};

use async_trait::async_trait;
use config::{ProviderKind, ProvidersConfig};
use dashmap::DashMap;
use jiff::Timestamp;
use reqwest::{Client, header::HeaderMap};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use store::{ManagedKey, ManagedKeyPool, NewManagedKey};
use strum::IntoEnumIterator;
use url::Url;

use crate::{
    error::LlmError,
    provider::{http_client::default_http_client_builder, send},
};

/// Keys the user configured for themselves.
#[async_trait]
pub trait OwnKeyStore: Send + Sync {
    async fn own_key(&self, provider: ProviderKind) -> crate::Result<Option<SecretString>>;
}

/// Platform-held keys, handed out according to the caller's plan.
#[async_trait]
pub trait ManagedKeySource: Send + Sync {
    async fn managed_key(&self, provider: ProviderKind, plan_id: &str) -> crate::Result<Option<SecretString>>;
}

#[derive(Default)]
pub struct InMemoryOwnKeys {
    keys: DashMap<ProviderKind, SecretString>,
}

impl InMemoryOwnKeys {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a key. Empty keys remove the entry.
    pub fn set(&self, provider: ProviderKind, key: SecretString) {
        if key.expose_secret().trim().is_empty() {
            self.keys.remove(&provider);
        } else {
            self.keys.insert(provider, key);
        }
    }

    pub fn remove(&self, provider: ProviderKind) {
        self.keys.remove(&provider);
    }
}

#[async_trait]
impl OwnKeyStore for InMemoryOwnKeys {
    async fn own_key(&self, provider: ProviderKind) -> crate::Result<Option<SecretString>> {
        Ok(self.keys.get(&provider).map(|key| key.clone()))
    }
}

/// Who is asking for a managed key that will leave the server.
#[derive(Debug, Clone, Default)]
pub struct KeyRequester {
    pub origin: Option<String>,
    pub ip: Option<IpAddr>,
}

/// Managed keys held by this server: the versioned key pool first, then the key from
/// configuration or the vendor's environment variable.
pub struct ServerKeys {
    pool: Arc<dyn ManagedKeyPool>,
    providers: ProvidersConfig,
}

impl ServerKeys {
    pub fn new(pool: Arc<dyn ManagedKeyPool>, providers: ProvidersConfig) -> Self {
        Self { pool, providers }
    }

    /// Whether any key could be served for the provider without consulting the pool.
    pub fn has_configured_key(&self, provider: ProviderKind) -> bool {
        self.providers.api_key(provider).is_some()
    }

    /// Whether a key could be served right now, without recording a use.
    pub async fn is_available(&self, provider: ProviderKind) -> crate::Result<bool> {
        if self.has_configured_key(provider) {
            return Ok(true);
        }

        let now = Timestamp::now();
        let keys = self.pool.keys(provider.name()).await?;

        Ok(keys.iter().any(|key| key.is_usable(now)))
    }

    /// Picks a key for `provider`.
    ///
    /// Pool candidates must be active and unexpired. When `requester` is given the key
    /// leaves the server, so the key's origin and IP allow-lists must admit it. The
    /// least used candidate wins and its use is recorded.
    pub async fn select(
        &self,
        provider: ProviderKind,
        requester: Option<&KeyRequester>,
    ) -> crate::Result<Option<SecretString>> {
        let now = Timestamp::now();
        let keys = self.pool.keys(provider.name()).await?;

        let candidate = keys
            .into_iter()
            .filter(|key| key.is_usable(now))
            .filter(|key| requester.is_none_or(|requester| admits(key, requester)))
            .min_by_key(|key| key.usage_count);

        if let Some(key) = candidate {
            if let Err(e) = self.pool.record_use(provider.name(), key.version, now).await {
                log::warn!("Failed to record use of managed {provider} key version {}: {e}", key.version);
            }

            return Ok(Some(key.key));
        }

        Ok(self.providers.api_key(provider).cloned())
    }

    /// Adds a key version to the pool, optionally retiring the previous ones.
    pub async fn rotate(&self, provider: ProviderKind, key: NewManagedKey, deactivate_previous: bool) -> crate::Result<u32> {
        Ok(self.pool.add(provider.name(), key, deactivate_previous, Timestamp::now()).await?)
    }
}

fn admits(key: &ManagedKey, requester: &KeyRequester) -> bool {
    let origin_allowed = key.allowed_origins.is_empty()
        || requester
            .origin
            .as_deref()
            .is_some_and(|origin| key.allowed_origins.iter().any(|allowed| allowed == origin));

    let ip_allowed = key.allowed_ips.is_empty()
        || requester.ip.is_some_and(|ip| {
            key.allowed_ips
                .iter()
                .filter_map(|allowed| allowed.parse::<IpAddr>().ok())
                .any(|allowed| allowed == ip)
        });

    origin_allowed && ip_allowed
}

#[async_trait]
impl ManagedKeySource for ServerKeys {
    async fn managed_key(&self, provider: ProviderKind, _plan_id: &str) -> crate::Result<Option<SecretString>> {
        self.select(provider, None).await
    }
}

/// Identity token of the signed-in user, attached to managed-key requests.
#[async_trait]
pub trait IdTokenSource: Send + Sync {
    async fn id_token(&self) -> crate::Result<SecretString>;
}

/// A token that never changes, for service accounts and tests.
pub struct StaticIdToken(pub SecretString);

#[async_trait]
impl IdTokenSource for StaticIdToken {
    async fn id_token(&self) -> crate::Result<SecretString> {
        Ok(self.0.clone())
    }
}

#[derive(Debug, Serialize)]
struct ManagedKeyRequest<'a> {
    provider: &'a str,
    plan: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ManagedKeyResponse {
    api_key: Option<String>,
}

/// Managed keys fetched from a gateway's `POST /api/keys/managed` endpoint.
///
/// Nothing is cached: every lookup is one authenticated request.
pub struct RemoteManagedKeys {
    client: Client,
    endpoint: Url,
    client_api_key: SecretString,
    tokens: Arc<dyn IdTokenSource>,
}

impl RemoteManagedKeys {
    pub fn new(endpoint: Url, client_api_key: SecretString, tokens: Arc<dyn IdTokenSource>) -> crate::Result<Self> {
        let client = default_http_client_builder(HeaderMap::new()).build().map_err(|e| {
            log::error!("Failed to create HTTP client for managed keys: {e}");
            LlmError::InternalError(None)
        })?;

        Ok(Self {
            client,
            endpoint,
            client_api_key,
            tokens,
        })
    }
}

#[async_trait]
impl ManagedKeySource for RemoteManagedKeys {
    async fn managed_key(&self, provider: ProviderKind, plan_id: &str) -> crate::Result<Option<SecretString>> {
        let token = self.tokens.id_token().await?;

        let request = self
            .client
            .post(self.endpoint.clone())
            .bearer_auth(token.expose_secret())
            .header("x-api-key", self.client_api_key.expose_secret())
            .json(&ManagedKeyRequest {
                provider: provider.name(),
                plan: plan_id,
            });

        let response: ManagedKeyResponse = send("Managed key service", request).await?;

        Ok(response
            .api_key
            .filter(|key| !key.is_empty())
            .map(SecretString::from))
    }
}

/// Chooses between the user's own key and a managed one.
#[derive(Clone)]
pub struct KeyResolver {
    own: Arc<dyn OwnKeyStore>,
    managed: Arc<dyn ManagedKeySource>,
}

impl KeyResolver {
    pub fn new(own: Arc<dyn OwnKeyStore>, managed: Arc<dyn ManagedKeySource>) -> Self {
        Self { own, managed }
    }

    /// The user's key when preferred and present, the managed key otherwise.
    pub async fn api_key(
        &self,
        provider: ProviderKind,
        plan_id: &str,
        prefer_own_keys: bool,
    ) -> crate::Result<Option<SecretString>> {
        if prefer_own_keys && let Some(key) = self.own.own_key(provider).await? {
            return Ok(Some(key));
        }

        self.managed.managed_key(provider, plan_id).await
    }

    /// Whether the user configured a key for at least one vendor.
    pub async fn has_own_keys(&self) -> crate::Result<bool> {
        for provider in ProviderKind::iter() {
            if self.own.own_key(provider).await?.is_some() {
                return Ok(true);
            }
        }

        Ok(false)
    }

    /// Vendors with a user key, in registration order.
    pub async fn own_key_providers(&self) -> crate::Result<Vec<ProviderKind>> {
        let mut providers = Vec::new();

        for provider in ProviderKind::iter() {
            if self.own.own_key(provider).await?.is_some() {
                providers.push(provider);
            }
        }

        Ok(providers)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::http::StatusCode;
    use config::{Config, ProviderKind};
    use indoc::indoc;
    use secrecy::{ExposeSecret, SecretString};
    use serde_json::json;
    use store::{InMemoryManagedKeyPool, ManagedKeyPool, NewManagedKey};

    use super::{InMemoryOwnKeys, KeyRequester, KeyResolver, RemoteManagedKeys, ServerKeys, StaticIdToken};
    use crate::test_support::mock_vendor;

    fn secret(value: &str) -> SecretString {
        SecretString::from(value.to_string())
    }

    fn new_key(value: &str) -> NewManagedKey {
        NewManagedKey {
            key: secret(value),
            expires_at: None,
            allowed_origins: Vec::new(),
            allowed_ips: Vec::new(),
        }
    }

    fn server_keys(pool: Arc<InMemoryManagedKeyPool>) -> ServerKeys {
        let config: Config = toml::from_str(indoc! {r#"
            [providers.gemini]
            api_key = "configured-gemini"
        "#})
        .unwrap();

        ServerKeys::new(pool, config.providers)
    }

    #[tokio::test]
    async fn pool_keys_win_and_least_used_is_picked() {
        let pool = Arc::new(InMemoryManagedKeyPool::new());
        let keys = server_keys(pool.clone());

        keys.rotate(ProviderKind::Gemini, new_key("pool-1"), false).await.unwrap();
        keys.rotate(ProviderKind::Gemini, new_key("pool-2"), false).await.unwrap();

        let mut picked = Vec::new();

        for _ in 0..4 {
            let key = keys.select(ProviderKind::Gemini, None).await.unwrap().unwrap();
            picked.push(key.expose_secret().to_string());
        }

        picked.sort();
        assert_eq!(picked, ["pool-1", "pool-1", "pool-2", "pool-2"]);

        let usage: Vec<_> = pool
            .keys("gemini")
            .await
            .unwrap()
            .iter()
            .map(|key| key.usage_count)
            .collect();

        assert_eq!(usage, [2, 2]);
    }

    #[tokio::test]
    async fn falls_back_to_configured_key() {
        let keys = server_keys(Arc::new(InMemoryManagedKeyPool::new()));

        let gemini = keys.select(ProviderKind::Gemini, None).await.unwrap().unwrap();

        assert_eq!(gemini.expose_secret(), "configured-gemini");
        assert!(keys.select(ProviderKind::Claude, None).await.unwrap().is_none());

        assert!(keys.is_available(ProviderKind::Gemini).await.unwrap());
        assert!(!keys.is_available(ProviderKind::Claude).await.unwrap());

        keys.rotate(ProviderKind::Claude, new_key("pooled-claude"), false).await.unwrap();
        assert!(keys.is_available(ProviderKind::Claude).await.unwrap());
    }

    #[tokio::test]
    async fn rotation_retires_previous_versions() {
        let keys = server_keys(Arc::new(InMemoryManagedKeyPool::new()));

        keys.rotate(ProviderKind::Gemini, new_key("old"), false).await.unwrap();
        let version = keys.rotate(ProviderKind::Gemini, new_key("new"), true).await.unwrap();

        assert_eq!(version, 2);

        for _ in 0..3 {
            let key = keys.select(ProviderKind::Gemini, None).await.unwrap().unwrap();
            assert_eq!(key.expose_secret(), "new");
        }
    }

    #[tokio::test]
    async fn allow_lists_apply_to_keys_leaving_the_server() {
        let pool = Arc::new(InMemoryManagedKeyPool::new());
        let keys = server_keys(pool.clone());

        let mut restricted = new_key("restricted");
        restricted.allowed_origins = vec!["https://app.naya.io".to_string()];
        restricted.allowed_ips = vec!["10.0.0.7".to_string()];

        keys.rotate(ProviderKind::Gemini, restricted, false).await.unwrap();

        let allowed = KeyRequester {
            origin: Some("https://app.naya.io".to_string()),
            ip: Some("10.0.0.7".parse().unwrap()),
        };

        let wrong_ip = KeyRequester {
            ip: Some("10.0.0.8".parse().unwrap()),
            ..allowed.clone()
        };

        let key = keys.select(ProviderKind::Gemini, Some(&allowed)).await.unwrap().unwrap();
        assert_eq!(key.expose_secret(), "restricted");

        let key = keys.select(ProviderKind::Gemini, Some(&wrong_ip)).await.unwrap().unwrap();
        assert_eq!(key.expose_secret(), "configured-gemini");

        // Server-side use ignores the lists.
        let key = keys.select(ProviderKind::Gemini, None).await.unwrap().unwrap();
        assert_eq!(key.expose_secret(), "restricted");
    }

    #[tokio::test]
    async fn own_keys_are_used_only_when_preferred() {
        let own = Arc::new(InMemoryOwnKeys::new());
        let managed = Arc::new(server_keys(Arc::new(InMemoryManagedKeyPool::new())));
        let resolver = KeyResolver::new(own.clone(), managed);

        assert!(!resolver.has_own_keys().await.unwrap());

        own.set(ProviderKind::Gemini, secret("mine"));
        own.set(ProviderKind::DeepSeek, secret("mine-too"));
        own.set(ProviderKind::Claude, secret("  "));

        let preferred = resolver.api_key(ProviderKind::Gemini, "free", true).await.unwrap().unwrap();
        let managed = resolver.api_key(ProviderKind::Gemini, "free", false).await.unwrap().unwrap();

        assert_eq!(preferred.expose_secret(), "mine");
        assert_eq!(managed.expose_secret(), "configured-gemini");

        assert!(resolver.has_own_keys().await.unwrap());
        assert_eq!(
            resolver.own_key_providers().await.unwrap(),
            [ProviderKind::Gemini, ProviderKind::DeepSeek]
        );

        // No own key for Mistral: the managed path answers, and has nothing.
        assert!(resolver.api_key(ProviderKind::Mistral, "free", true).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn remote_managed_keys_authenticate_with_the_id_token() {
        let gateway = mock_vendor(StatusCode::OK, json!({ "apiKey": "managed-openai" })).await;

        let remote = RemoteManagedKeys::new(
            format!("{}/api/keys/managed", gateway.base_url()).parse().unwrap(),
            secret("client-key"),
            Arc::new(StaticIdToken(secret("id-token"))),
        )
        .unwrap();

        let resolver = KeyResolver::new(Arc::new(InMemoryOwnKeys::new()), Arc::new(remote));
        let key = resolver.api_key(ProviderKind::OpenAi, "pro", false).await.unwrap().unwrap();

        assert_eq!(key.expose_secret(), "managed-openai");

        let request = gateway.single_request();

        assert_eq!(request.path, "/api/keys/managed");
        assert_eq!(request.headers["authorization"], "Bearer id-token");
        assert_eq!(request.headers["x-api-key"], "client-key");
        assert_eq!(request.body, json!({ "provider": "openai", "plan": "pro" }));
    }

    #[tokio::test]
    async fn remote_refusal_is_an_error() {
        let gateway = mock_vendor(StatusCode::FORBIDDEN, json!({ "error": "Access denied" })).await;

        let remote = RemoteManagedKeys::new(
            gateway.base_url().parse().unwrap(),
            secret("client-key"),
            Arc::new(StaticIdToken(secret("id-token"))),
        )
        .unwrap();

        let error = KeyResolver::new(Arc::new(InMemoryOwnKeys::new()), Arc::new(remote))
            .api_key(ProviderKind::Claude, "free", false)
            .await
            .unwrap_err();

        insta::assert_snapshot!(error, @"Managed key service API error (403): Access denied");
    }
}
