use std::sync::Arc;

use config::PlansConfig;
use tokio::sync::Mutex;

use crate::{Clock, RateLimitEntry, RateLimitKey, RateLimitStore, StorageError};

/// Length of the short window.
pub const MINUTE_WINDOW_MS: u64 = 60_000;

/// Length of the long window.
pub const DAY_WINDOW_MS: u64 = 86_400_000;

/// Outcome of a rate limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    /// Requests left in the current minute window.
    pub remaining_minute: u32,
    /// Requests left today, `None` for plans without a daily limit.
    pub remaining_day: Option<u32>,
    /// When the binding window resets, in epoch milliseconds. When both windows are
    /// exhausted the minute window is reported.
    pub reset_time: u64,
}

/// Fixed-window limiter keyed by `(user, plan)`.
///
/// Limits come from the plan table; unknown plans get the limits of `free`. Windows reset
/// lazily on the next check after they elapse, so bursts at window boundaries are
/// possible. Counters live in the injected store, which is process-local unless a shared
/// one is supplied: with the default store every replica enforces the limits on its own.
pub struct RateLimitService {
    store: Arc<dyn RateLimitStore>,
    clock: Arc<dyn Clock>,
    plans: PlansConfig,
    // Serialises read-modify-write cycles so concurrent checks cannot lose increments.
    guard: Mutex<()>,
}

impl RateLimitService {
    pub fn new(store: Arc<dyn RateLimitStore>, clock: Arc<dyn Clock>, plans: PlansConfig) -> Self {
        Self {
            store,
            clock,
            plans,
            guard: Mutex::new(()),
        }
    }

    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    /// Checks and, when allowed, consumes one request in both windows.
    pub async fn check_rate_limit(&self, user_id: &str, plan_id: &str) -> Result<RateLimitDecision, StorageError> {
        let _guard = self.guard.lock().await;

        let now = self.clock.now_ms();
        let plan = self.plans.resolve(plan_id).config;
        let key = RateLimitKey::new(user_id, plan_id);

        let mut entry = self.store.get(&key).await?.unwrap_or(RateLimitEntry {
            count: 0,
            reset_time: now + MINUTE_WINDOW_MS,
            daily_count: 0,
            daily_reset_time: now + DAY_WINDOW_MS,
        });

        if now >= entry.reset_time {
            entry.count = 0;
            entry.reset_time = now + MINUTE_WINDOW_MS;
        }

        if now >= entry.daily_reset_time {
            entry.daily_count = 0;
            entry.daily_reset_time = now + DAY_WINDOW_MS;
        }

        let minute_exhausted = entry.count >= plan.requests_per_minute;
        let day_exhausted = plan.requests_per_day.is_exhausted(entry.daily_count);

        if minute_exhausted || day_exhausted {
            self.store.set(key, entry).await?;

            let reset_time = if minute_exhausted {
                entry.reset_time
            } else {
                entry.daily_reset_time
            };

            log::debug!(
                "Rate limit reached for user {user_id} on plan {plan_id} (minute: {minute_exhausted}, day: {day_exhausted})"
            );

            return Ok(RateLimitDecision {
                allowed: false,
                remaining_minute: plan.requests_per_minute.saturating_sub(entry.count),
                remaining_day: plan.requests_per_day.remaining(entry.daily_count),
                reset_time,
            });
        }

        entry.count += 1;
        entry.daily_count += 1;

        self.store.set(key, entry).await?;

        Ok(RateLimitDecision {
            allowed: true,
            remaining_minute: plan.requests_per_minute.saturating_sub(entry.count),
            remaining_day: plan.requests_per_day.remaining(entry.daily_count),
            reset_time: entry.reset_time,
        })
    }

    /// Forgets every counter of `(user, plan)`. The next check starts from zero.
    pub async fn reset_user_limits(&self, user_id: &str, plan_id: &str) -> Result<(), StorageError> {
        let _guard = self.guard.lock().await;

        self.store.delete(&RateLimitKey::new(user_id, plan_id)).await
    }

    /// Deletes entries whose daily window has elapsed. Returns how many were removed.
    ///
    /// Meant to be called periodically by the host; the service never schedules itself.
    pub async fn cleanup_expired_entries(&self) -> Result<usize, StorageError> {
        let _guard = self.guard.lock().await;

        let now = self.clock.now_ms();
        let mut removed = 0;

        for key in self.store.keys().await? {
            let Some(entry) = self.store.get(&key).await? else {
                continue;
            };

            if now >= entry.daily_reset_time {
                self.store.delete(&key).await?;
                removed += 1;
            }
        }

        if removed > 0 {
            log::debug!("Removed {removed} expired rate limit entries");
        }

        Ok(removed)
    }
}
