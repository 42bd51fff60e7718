use std::{sync::Arc, time::Duration};

use jiff::{Timestamp, tz::TimeZone};
use ::rate_limit::{InMemoryDailyQuota, RateLimitService};
use store::InMemoryTokenStore;
use tokio::{task::JoinHandle, time::MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::rate_limit::IpLimiters;

pub(crate) const MAINTENANCE_INTERVAL: Duration = Duration::from_secs(60);

/// Periodic eviction of expired in-memory state.
pub(crate) struct Maintenance {
    pub rate_limits: Arc<RateLimitService>,
    pub daily_quota: Option<Arc<InMemoryDailyQuota>>,
    pub tokens: Option<Arc<InMemoryTokenStore>>,
    pub ip_limiters: Option<Arc<IpLimiters>>,
}

impl Maintenance {
    pub async fn run_once(&self) {
        match self.rate_limits.cleanup_expired_entries().await {
            Ok(0) => (),
            Ok(removed) => log::debug!("Removed {removed} expired rate limit entries"),
            Err(e) => log::warn!("Rate limit cleanup failed: {e}"),
        }

        let now = Timestamp::now();

        if let Some(daily_quota) = &self.daily_quota {
            let today = now.to_zoned(TimeZone::UTC).date().to_string();
            daily_quota.retain_day(&today);
        }

        if let Some(tokens) = &self.tokens {
            let removed = tokens.purge_expired(now);

            if removed > 0 {
                log::debug!("Removed {removed} expired sessions and API tokens");
            }
        }

        if let Some(ip_limiters) = &self.ip_limiters {
            ip_limiters.purge();
        }
    }

    pub fn spawn(self, interval: Duration, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            // The first tick completes immediately.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => self.run_once().await,
                }
            }

            log::debug!("Maintenance task stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use config::{PlansConfig, RequestLimit};
    use jiff::{SignedDuration, Timestamp};
    use ::rate_limit::{Clock, DailyQuota, DailyQuotaOutcome, InMemoryDailyQuota, InMemoryRateLimitStore, ManualClock, RateLimitService};
    use store::{InMemoryTokenStore, Session, SessionStore};
    use tokio_util::sync::CancellationToken;

    use super::Maintenance;

    const START: u64 = 1_700_000_000_000;

    fn maintenance(clock: Arc<ManualClock>, daily: Arc<InMemoryDailyQuota>, tokens: Arc<InMemoryTokenStore>) -> Maintenance {
        let rate_limits = RateLimitService::new(Arc::new(InMemoryRateLimitStore::new()), clock, PlansConfig::default());

        Maintenance {
            rate_limits: Arc::new(rate_limits),
            daily_quota: Some(daily),
            tokens: Some(tokens),
            ip_limiters: None,
        }
    }

    #[tokio::test]
    async fn purges_expired_tokens_and_stale_days() {
        let clock = Arc::new(ManualClock::new(START));
        let daily = Arc::new(InMemoryDailyQuota::new());
        let tokens = Arc::new(InMemoryTokenStore::new());

        // 2023-11-14 in UTC, long before today.
        let quota = DailyQuota::new(daily.clone(), clock.clone() as Arc<dyn Clock>);
        let outcome = quota.check("u1", RequestLimit::Limited(1)).await.unwrap();
        assert!(matches!(outcome, DailyQuotaOutcome::Allowed { used: 1, .. }));

        let now = Timestamp::now();
        let session = Session {
            user_id: "u1".to_string(),
            user_agent: None,
            ip: None,
            created_at: now - SignedDuration::from_hours(2),
            expires_at: now - SignedDuration::from_hours(1),
        };

        tokens.insert_session("stale", session).await.unwrap();

        maintenance(clock, daily.clone(), tokens.clone()).run_once().await;

        assert_eq!(tokens.purge_expired(now), 0);

        // The stale day was dropped, so the same day starts from zero again.
        let outcome = quota.check("u1", RequestLimit::Limited(1)).await.unwrap();
        assert!(matches!(outcome, DailyQuotaOutcome::Allowed { used: 1, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn stops_on_shutdown() {
        let clock = Arc::new(ManualClock::new(START));
        let shutdown = CancellationToken::new();

        let handle = maintenance(clock, Default::default(), Default::default())
            .spawn(Duration::from_secs(60), shutdown.clone());

        tokio::time::sleep(Duration::from_secs(150)).await;
        shutdown.cancel();

        handle.await.unwrap();
    }
}
