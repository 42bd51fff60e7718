//! Users known to the gateway before any request arrives.

use indexmap::IndexMap;
use serde::Deserialize;

/// Static user records, keyed by the ID token subject.
///
/// Without an external user directory this is the only way to grant a paid plan, an
/// administrator role or a ban.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct UsersConfig {
    users: IndexMap<String, UserConfig>,
}

impl UsersConfig {
    pub fn iter(&self) -> impl Iterator<Item = (&str, &UserConfig)> {
        self.users.iter().map(|(id, user)| (id.as_str(), user))
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct UserConfig {
    /// Subscribed plan. Users without one are on the free plan.
    pub plan: Option<String>,
    /// Whether the subscription is paid up.
    pub active: bool,
    pub admin: bool,
    pub banned: bool,
}

impl Default for UserConfig {
    fn default() -> Self {
        Self {
            plan: None,
            active: true,
            admin: false,
            banned: false,
        }
    }
}
