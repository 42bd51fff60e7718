use async_trait::async_trait;
use dashmap::DashMap;

use crate::Result;

/// A user's subscription as recorded by billing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub plan: String,
    pub active: bool,
}

/// The subset of a user document the gateway reads.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserProfile {
    pub banned: bool,
    pub admin: bool,
    pub subscription: Option<Subscription>,
}

impl UserProfile {
    /// The stored plan id, `free` when the user never subscribed.
    pub fn plan(&self) -> &str {
        self.subscription
            .as_ref()
            .map(|subscription| subscription.plan.as_str())
            .unwrap_or("free")
    }

    pub fn subscription_active(&self) -> bool {
        self.subscription.as_ref().is_some_and(|subscription| subscription.active)
    }
}

/// Read access to user documents.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Returns `None` for users without a document.
    async fn profile(&self, user_id: &str) -> Result<Option<UserProfile>>;
}

#[derive(Debug, Default)]
pub struct InMemoryUserDirectory {
    users: DashMap<String, UserProfile>,
}

impl InMemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert(&self, user_id: impl Into<String>, profile: UserProfile) {
        self.users.insert(user_id.into(), profile);
    }

    /// Shortcut for an active subscriber on `plan`.
    pub fn subscribe(&self, user_id: impl Into<String>, plan: impl Into<String>) {
        let user_id = user_id.into();
        let mut profile = self.users.get(&user_id).map(|p| p.clone()).unwrap_or_default();

        profile.subscription = Some(Subscription {
            plan: plan.into(),
            active: true,
        });

        self.users.insert(user_id, profile);
    }
}

#[async_trait]
impl UserDirectory for InMemoryUserDirectory {
    async fn profile(&self, user_id: &str) -> Result<Option<UserProfile>> {
        Ok(self.users.get(user_id).map(|profile| profile.clone()))
    }
}
