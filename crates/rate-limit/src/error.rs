#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("Rate limit storage error: {0}")]
    Backend(String),
    #[error("Clock out of range: {0}")]
    Clock(String),
}
