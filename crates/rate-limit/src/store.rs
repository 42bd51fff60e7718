use async_trait::async_trait;
use dashmap::DashMap;

use crate::StorageError;

/// Counters are kept per user and per plan id as given by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RateLimitKey {
    pub user_id: String,
    pub plan_id: String,
}

impl RateLimitKey {
    pub fn new(user_id: impl Into<String>, plan_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            plan_id: plan_id.into(),
        }
    }
}

/// Fixed-window counters of one key. Times are epoch milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitEntry {
    pub count: u32,
    pub reset_time: u64,
    pub daily_count: u32,
    pub daily_reset_time: u64,
}

/// Storage of rate limit counters.
///
/// Implementations only need plain reads and writes; [`crate::RateLimitService`]
/// serialises the read-modify-write cycle itself.
#[async_trait]
pub trait RateLimitStore: Send + Sync {
    async fn get(&self, key: &RateLimitKey) -> Result<Option<RateLimitEntry>, StorageError>;

    async fn set(&self, key: RateLimitKey, entry: RateLimitEntry) -> Result<(), StorageError>;

    async fn delete(&self, key: &RateLimitKey) -> Result<(), StorageError>;

    async fn keys(&self) -> Result<Vec<RateLimitKey>, StorageError>;
}

/// Process-local counters. Every replica counts on its own.
#[derive(Debug, Default)]
pub struct InMemoryRateLimitStore {
    entries: DashMap<RateLimitKey, RateLimitEntry>,
}

impl InMemoryRateLimitStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl RateLimitStore for InMemoryRateLimitStore {
    async fn get(&self, key: &RateLimitKey) -> Result<Option<RateLimitEntry>, StorageError> {
        Ok(self.entries.get(key).map(|entry| *entry))
    }

    async fn set(&self, key: RateLimitKey, entry: RateLimitEntry) -> Result<(), StorageError> {
        self.entries.insert(key, entry);
        Ok(())
    }

    async fn delete(&self, key: &RateLimitKey) -> Result<(), StorageError> {
        self.entries.remove(key);
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<RateLimitKey>, StorageError> {
        Ok(self.entries.iter().map(|entry| entry.key().clone()).collect())
    }
}
