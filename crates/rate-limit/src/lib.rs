//! Request admission control.
//!
//! Three independent mechanisms live here:
//!
//! - [`RateLimitService`]: fixed one-minute and one-day windows per `(user, plan)`,
//!   consulted by the managed-call orchestrator.
//! - [`DailyQuota`]: the persistent per-user daily counter of the chat route, backed by
//!   memory or Redis.
//! - [`IpRateLimiter`]: per-client-IP limits applied by the HTTP middleware.

mod clock;
mod daily;
mod error;
mod ip;
mod service;
mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use daily::{DailyQuota, DailyQuotaOutcome, DailyQuotaStorage, DailyUsage, InMemoryDailyQuota, RedisDailyQuota};
pub use error::StorageError;
pub use ip::IpRateLimiter;
pub use service::{DAY_WINDOW_MS, MINUTE_WINDOW_MS, RateLimitDecision, RateLimitService};
pub use store::{InMemoryRateLimitStore, RateLimitEntry, RateLimitKey, RateLimitStore};
