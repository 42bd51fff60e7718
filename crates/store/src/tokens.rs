use async_trait::async_trait;
use dashmap::DashMap;
use jiff::Timestamp;

use crate::Result;

/// A browser session issued by the session endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub user_id: String,
    pub user_agent: Option<String>,
    pub ip: Option<String>,
    pub created_at: Timestamp,
    pub expires_at: Timestamp,
}

/// A short-lived token standing in for a platform-managed vendor key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiToken {
    pub user_id: String,
    pub provider: String,
    pub created_at: Timestamp,
    pub expires_at: Timestamp,
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn insert_session(&self, token: &str, session: Session) -> Result<()>;

    /// Returns `None` for unknown and expired sessions.
    async fn session(&self, token: &str) -> Result<Option<Session>>;
}

#[async_trait]
pub trait ApiTokenStore: Send + Sync {
    async fn insert_api_token(&self, token: &str, api_token: ApiToken) -> Result<()>;

    /// Returns `None` for unknown and expired tokens.
    async fn api_token(&self, token: &str) -> Result<Option<ApiToken>>;
}

/// Sessions and API tokens keyed by their opaque token string.
#[derive(Debug, Default)]
pub struct InMemoryTokenStore {
    sessions: DashMap<String, Session>,
    api_tokens: DashMap<String, ApiToken>,
}

impl InMemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops everything that expired before `now`. Returns how many entries were removed.
    pub fn purge_expired(&self, now: Timestamp) -> usize {
        let before = self.sessions.len() + self.api_tokens.len();

        self.sessions.retain(|_, session| session.expires_at > now);
        self.api_tokens.retain(|_, token| token.expires_at > now);

        before - (self.sessions.len() + self.api_tokens.len())
    }
}

#[async_trait]
impl SessionStore for InMemoryTokenStore {
    async fn insert_session(&self, token: &str, session: Session) -> Result<()> {
        self.sessions.insert(token.to_string(), session);
        Ok(())
    }

    async fn session(&self, token: &str) -> Result<Option<Session>> {
        let now = Timestamp::now();

        Ok(self
            .sessions
            .get(token)
            .filter(|session| session.expires_at > now)
            .map(|session| session.clone()))
    }
}

#[async_trait]
impl ApiTokenStore for InMemoryTokenStore {
    async fn insert_api_token(&self, token: &str, api_token: ApiToken) -> Result<()> {
        self.api_tokens.insert(token.to_string(), api_token);
        Ok(())
    }

    async fn api_token(&self, token: &str) -> Result<Option<ApiToken>> {
        let now = Timestamp::now();

        Ok(self
            .api_tokens
            .get(token)
            .filter(|api_token| api_token.expires_at > now)
            .map(|api_token| api_token.clone()))
    }
}
