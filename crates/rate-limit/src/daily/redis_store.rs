use async_trait::async_trait;
use config::RedisQuotaConfig;
use redis::{AsyncCommands, aio::ConnectionManager};

use super::{DailyQuotaStorage, DailyUsage};
use crate::StorageError;

// Counters outlive their day a little so late requests around midnight still see them.
const COUNTER_TTL_SECONDS: i64 = 2 * 24 * 60 * 60;

/// Daily counters shared by every replica through Redis.
#[derive(Clone)]
pub struct RedisDailyQuota {
    connection: ConnectionManager,
    key_prefix: String,
}

impl RedisDailyQuota {
    pub async fn connect(config: &RedisQuotaConfig) -> Result<Self, StorageError> {
        let client = redis::Client::open(config.url.as_str())?;
        let connection = ConnectionManager::new(client).await?;

        log::debug!("Connected to Redis for daily quota storage");

        Ok(Self {
            connection,
            key_prefix: config.key_prefix.clone(),
        })
    }

    fn key(&self, user_id: &str, day: &str) -> String {
        format!("{}{user_id}_{day}", self.key_prefix)
    }
}

/// Increments the counter and (re)arms its expiry in one `MULTI`, so a dropped connection
/// can never leave a counter without a TTL.
fn consume(key: &str) -> redis::Pipeline {
    let mut pipeline = redis::pipe();

    pipeline
        .atomic()
        .incr(key, 1)
        .expire(key, COUNTER_TTL_SECONDS)
        .ignore();

    pipeline
}

#[async_trait]
impl DailyQuotaStorage for RedisDailyQuota {
    async fn check_and_consume(&self, user_id: &str, day: &str, limit: u32) -> Result<DailyUsage, StorageError> {
        let key = self.key(user_id, day);
        let mut connection = self.connection.clone();

        let (used,): (i64,) = consume(&key).query_async(&mut connection).await?;

        let limit = i64::from(limit);

        if used > limit {
            let _: i64 = connection.decr(&key, 1).await?;

            return Ok(DailyUsage {
                allowed: false,
                used: u32::try_from(used - 1).unwrap_or(u32::MAX),
            });
        }

        Ok(DailyUsage {
            allowed: true,
            used: u32::try_from(used).unwrap_or(u32::MAX),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::consume;

    #[test]
    fn increment_and_expiry_share_one_transaction() {
        let packed = String::from_utf8(consume("naya:quota:u1_2026-10-18").get_packed_pipeline()).unwrap();

        let multi = packed.find("MULTI").unwrap();
        let incr = packed.find("INCR").unwrap();
        let expire = packed.find("EXPIRE").unwrap();
        let exec = packed.find("EXEC").unwrap();

        assert!(multi < incr && incr < expire && expire < exec);
        assert!(packed.contains("172800"));
    }
}
