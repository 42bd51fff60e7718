use std::{future::Future, time::Duration};

use config::HttpConfig;
use tokio_retry2::{
    Retry, RetryError,
    strategy::{ExponentialBackoff, jitter},
};

use crate::error::LlmError;

/// Timeout and retry policy wrapped around every vendor call.
///
/// Each attempt gets its own deadline. Connection failures, timeouts and vendor 5xx
/// answers are retried with jittered exponential backoff; everything else fails at once.
#[derive(Debug, Clone, Copy)]
pub struct CallPolicy {
    timeout: Duration,
    max_retries: usize,
    initial_backoff: Duration,
    max_backoff: Duration,
}

impl CallPolicy {
    pub fn new(config: HttpConfig) -> Self {
        Self {
            timeout: config.timeout,
            max_retries: config.max_retries,
            initial_backoff: config.initial_backoff,
            max_backoff: config.max_backoff,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Runs `operation` until it succeeds, fails permanently or the retries run out.
    pub async fn run<T, F, Fut>(&self, provider: &str, operation: F) -> crate::Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = crate::Result<T>>,
    {
        // Delays are 2^n * factor, so the first one equals `initial_backoff`.
        let factor = u64::try_from(self.initial_backoff.as_millis() / 2).unwrap_or(u64::MAX).max(1);

        let strategy = ExponentialBackoff::from_millis(2)
            .factor(factor)
            .max_delay(self.max_backoff)
            .map(jitter)
            .take(self.max_retries);

        let operation = &operation;
        let timeout = self.timeout;

        Retry::spawn(strategy, move || async move {
            let result = match tokio::time::timeout(timeout, operation()).await {
                Ok(result) => result,
                Err(_) => Err(LlmError::Timeout {
                    provider: provider.to_string(),
                    after: timeout,
                }),
            };

            match result {
                Ok(value) => Ok(value),
                Err(e) if e.is_transient() => {
                    log::warn!("Transient failure calling {provider}: {e}");
                    Err(RetryError::Transient { err: e, retry_after: None })
                }
                Err(e) => Err(RetryError::Permanent(e)),
            }
        })
        .await
    }
}

impl Default for CallPolicy {
    fn default() -> Self {
        Self::new(HttpConfig::default())
    }
}
