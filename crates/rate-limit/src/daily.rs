mod redis_store;

use std::sync::Arc;

use async_trait::async_trait;
use config::RequestLimit;
use dashmap::DashMap;
use jiff::{Timestamp, tz::TimeZone};

pub use self::redis_store::RedisDailyQuota;
use crate::{Clock, DAY_WINDOW_MS, StorageError};

/// Usage of one user on one day after a consume attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DailyUsage {
    pub allowed: bool,
    pub used: u32,
}

/// Persistent per-user, per-day request counter.
#[async_trait]
pub trait DailyQuotaStorage: Send + Sync {
    /// Consumes one request of `user_id` on `day` unless `limit` requests were already
    /// made. Must be atomic with respect to concurrent callers.
    async fn check_and_consume(&self, user_id: &str, day: &str, limit: u32) -> Result<DailyUsage, StorageError>;
}

#[derive(Debug, Default)]
pub struct InMemoryDailyQuota {
    counters: DashMap<String, u32>,
}

impl InMemoryDailyQuota {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops counters of days other than `today`.
    pub fn retain_day(&self, today: &str) {
        let suffix = format!("_{today}");
        self.counters.retain(|key, _| key.ends_with(&suffix));
    }
}

#[async_trait]
impl DailyQuotaStorage for InMemoryDailyQuota {
    async fn check_and_consume(&self, user_id: &str, day: &str, limit: u32) -> Result<DailyUsage, StorageError> {
        let mut used = self.counters.entry(format!("{user_id}_{day}")).or_insert(0);

        if *used >= limit {
            return Ok(DailyUsage {
                allowed: false,
                used: *used,
            });
        }

        *used += 1;

        Ok(DailyUsage {
            allowed: true,
            used: *used,
        })
    }
}

/// Result of a daily quota check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DailyQuotaOutcome {
    /// The plan has no daily limit; nothing was counted.
    Unlimited,
    Allowed { used: u32, limit: u32 },
    Exceeded { limit: u32, reset_at: Timestamp },
}

/// Daily quota with UTC day boundaries.
pub struct DailyQuota {
    storage: Arc<dyn DailyQuotaStorage>,
    clock: Arc<dyn Clock>,
}

impl DailyQuota {
    pub fn new(storage: Arc<dyn DailyQuotaStorage>, clock: Arc<dyn Clock>) -> Self {
        Self { storage, clock }
    }

    pub async fn check(&self, user_id: &str, limit: RequestLimit) -> Result<DailyQuotaOutcome, StorageError> {
        let RequestLimit::Limited(limit) = limit else {
            return Ok(DailyQuotaOutcome::Unlimited);
        };

        let now = self.clock.now_ms();
        let day = utc_day(now)?;
        let usage = self.storage.check_and_consume(user_id, &day, limit).await?;

        if usage.allowed {
            return Ok(DailyQuotaOutcome::Allowed { used: usage.used, limit });
        }

        log::debug!("Daily quota of {limit} requests exhausted for user {user_id} on {day}");

        Ok(DailyQuotaOutcome::Exceeded {
            limit,
            reset_at: next_utc_midnight(now)?,
        })
    }
}

fn timestamp(ms: u64) -> Result<Timestamp, StorageError> {
    let ms = i64::try_from(ms).map_err(|err| StorageError::Clock(err.to_string()))?;
    Timestamp::from_millisecond(ms).map_err(|err| StorageError::Clock(err.to_string()))
}

/// `YYYY-MM-DD` of the UTC day containing `now_ms`.
pub(crate) fn utc_day(now_ms: u64) -> Result<String, StorageError> {
    Ok(timestamp(now_ms)?.to_zoned(TimeZone::UTC).date().to_string())
}

pub(crate) fn next_utc_midnight(now_ms: u64) -> Result<Timestamp, StorageError> {
    timestamp(now_ms - now_ms % DAY_WINDOW_MS + DAY_WINDOW_MS)
}
