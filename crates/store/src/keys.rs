use async_trait::async_trait;
use dashmap::DashMap;
use jiff::Timestamp;
use secrecy::SecretString;

use crate::{Result, StoreError};

/// One version of a platform-held vendor key.
#[derive(Debug, Clone)]
pub struct ManagedKey {
    pub version: u32,
    pub key: SecretString,
    pub active: bool,
    pub expires_at: Option<Timestamp>,
    /// Origins allowed to receive the key. Empty means any origin.
    pub allowed_origins: Vec<String>,
    /// Client IPs allowed to receive the key. Empty means any address.
    pub allowed_ips: Vec<String>,
    pub usage_count: u64,
    pub created_at: Timestamp,
    pub last_used_at: Option<Timestamp>,
}

impl ManagedKey {
    pub fn is_usable(&self, now: Timestamp) -> bool {
        self.active && self.expires_at.is_none_or(|expires_at| expires_at > now)
    }
}

/// A key to add to the pool during rotation.
#[derive(Debug, Clone)]
pub struct NewManagedKey {
    pub key: SecretString,
    pub expires_at: Option<Timestamp>,
    pub allowed_origins: Vec<String>,
    pub allowed_ips: Vec<String>,
}

/// Versioned platform keys per provider.
#[async_trait]
pub trait ManagedKeyPool: Send + Sync {
    /// All versions stored for the provider, in version order.
    async fn keys(&self, provider: &str) -> Result<Vec<ManagedKey>>;

    /// Bumps the usage counter of one key version.
    async fn record_use(&self, provider: &str, version: u32, at: Timestamp) -> Result<()>;

    /// Appends a new version, optionally deactivating every previous one. Returns the new version.
    async fn add(&self, provider: &str, key: NewManagedKey, deactivate_previous: bool, at: Timestamp) -> Result<u32>;
}

#[derive(Debug, Default)]
pub struct InMemoryManagedKeyPool {
    keys: DashMap<String, Vec<ManagedKey>>,
}

impl InMemoryManagedKeyPool {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ManagedKeyPool for InMemoryManagedKeyPool {
    async fn keys(&self, provider: &str) -> Result<Vec<ManagedKey>> {
        Ok(self.keys.get(provider).map(|keys| keys.clone()).unwrap_or_default())
    }

    async fn record_use(&self, provider: &str, version: u32, at: Timestamp) -> Result<()> {
        let mut keys = self
            .keys
            .get_mut(provider)
            .ok_or_else(|| StoreError::Conflict(format!("no managed keys stored for {provider}")))?;

        let key = keys
            .iter_mut()
            .find(|key| key.version == version)
            .ok_or_else(|| StoreError::Conflict(format!("{provider} has no managed key version {version}")))?;

        key.usage_count += 1;
        key.last_used_at = Some(at);

        Ok(())
    }

    async fn add(&self, provider: &str, key: NewManagedKey, deactivate_previous: bool, at: Timestamp) -> Result<u32> {
        let mut keys = self.keys.entry(provider.to_string()).or_default();
        let version = keys.iter().map(|key| key.version).max().unwrap_or(0) + 1;

        if deactivate_previous {
            for previous in keys.iter_mut() {
                previous.active = false;
            }
        }

        keys.push(ManagedKey {
            version,
            key: key.key,
            active: true,
            expires_at: key.expires_at,
            allowed_origins: key.allowed_origins,
            allowed_ips: key.allowed_ips,
            usage_count: 0,
            created_at: at,
            last_used_at: None,
        });

        log::info!("Managed key version {version} added for {provider}");

        Ok(version)
    }
}
