/// The authenticated caller, resolved once per request by the auth middleware.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIdentity {
    /// Stable user identifier, the `sub` of the verified ID token.
    pub user_id: String,
    /// Subscription plan id as stored in the user profile. Defaults to `free`.
    pub plan: String,
    /// Whether the subscription is currently active.
    pub subscription_active: bool,
    /// Platform administrators may rotate managed keys.
    pub admin: bool,
}

impl ClientIdentity {
    /// An identity on the free plan with no privileges, used when no profile exists yet.
    pub fn free(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            plan: "free".to_string(),
            subscription_active: false,
            admin: false,
        }
    }
}
