use std::{net::IpAddr, num::NonZeroU32, time::Duration};

use config::IpRateLimit;
use governor::{
    DefaultKeyedRateLimiter, Quota, RateLimiter,
    clock::{Clock as _, DefaultClock},
};

/// In-memory per-IP limiter for one route scope.
///
/// The budget refills continuously: `limit` requests may burst, after which one more is
/// admitted every `interval / limit`.
pub struct IpRateLimiter {
    limiter: DefaultKeyedRateLimiter<IpAddr>,
    clock: DefaultClock,
}

impl IpRateLimiter {
    pub fn new(config: &IpRateLimit) -> Self {
        let burst = NonZeroU32::new(config.limit).unwrap_or(NonZeroU32::MIN);

        let quota = Quota::with_period(config.interval / burst.get())
            .unwrap_or_else(|| Quota::per_second(burst))
            .allow_burst(burst);

        Self {
            limiter: RateLimiter::keyed(quota),
            clock: DefaultClock::default(),
        }
    }

    /// Admits one request from `ip`, or returns how long to wait before retrying.
    pub fn check(&self, ip: IpAddr) -> Result<(), Duration> {
        self.limiter
            .check_key(&ip)
            .map_err(|not_until| not_until.wait_time_from(self.clock.now()))
    }

    /// Forgets addresses whose budget is full again.
    pub fn purge(&self) {
        self.limiter.retain_recent();
        self.limiter.shrink_to_fit();
    }

    pub fn tracked_addresses(&self) -> usize {
        self.limiter.len()
    }
}
