use std::time::Duration;

use duration_str::deserialize_duration;
use serde::Deserialize;

/// Timeout and retry policy applied to every upstream vendor call.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HttpConfig {
    /// Deadline for a single attempt.
    #[serde(deserialize_with = "deserialize_duration")]
    pub timeout: Duration,
    /// Extra attempts after the first one for transient failures.
    pub max_retries: usize,
    /// Delay before the first retry. Later retries back off exponentially.
    #[serde(deserialize_with = "deserialize_duration")]
    pub initial_backoff: Duration,
    /// Upper bound for a single backoff delay.
    #[serde(deserialize_with = "deserialize_duration")]
    pub max_backoff: Duration,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_retries: 2,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(10),
        }
    }
}
