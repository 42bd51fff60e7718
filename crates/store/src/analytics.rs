use async_trait::async_trait;
use jiff::Timestamp;
use tokio::sync::Mutex;

use crate::Result;

/// Which surface produced a usage record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsageSource {
    /// The quota-enforced chat route.
    Chat,
    /// The managed-call orchestrator.
    Managed,
}

/// One completed vendor call.
#[derive(Debug, Clone, PartialEq)]
pub struct UsageEvent {
    pub user_id: String,
    pub provider: String,
    pub model: String,
    pub tokens_used: u64,
    pub source: UsageSource,
    pub timestamp: Timestamp,
}

/// Usage tracking collaborator.
#[async_trait]
pub trait AnalyticsSink: Send + Sync {
    async fn record(&self, event: UsageEvent) -> Result<()>;
}

/// Keeps every event in memory, in arrival order.
#[derive(Debug, Default)]
pub struct InMemoryAnalytics {
    events: Mutex<Vec<UsageEvent>>,
}

impl InMemoryAnalytics {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn events(&self) -> Vec<UsageEvent> {
        self.events.lock().await.clone()
    }
}

#[async_trait]
impl AnalyticsSink for InMemoryAnalytics {
    async fn record(&self, event: UsageEvent) -> Result<()> {
        log::debug!(
            "usage recorded for {} on {}: {} tokens",
            event.user_id,
            event.provider,
            event.tokens_used
        );

        self.events.lock().await.push(event);

        Ok(())
    }
}
