//! Persistence collaborators of the gateway.
//!
//! Every external system the gateway talks to besides the LLM vendors sits behind one
//! of these traits: the user directory, usage analytics, issued sessions and tokens, and
//! the pool of platform-managed vendor keys. The in-memory implementations back tests
//! and single-node deployments.

mod analytics;
mod error;
mod keys;
mod tokens;
mod users;

pub use analytics::{AnalyticsSink, InMemoryAnalytics, UsageEvent, UsageSource};
pub use error::StoreError;
pub use keys::{InMemoryManagedKeyPool, ManagedKey, ManagedKeyPool, NewManagedKey};
pub use tokens::{ApiToken, ApiTokenStore, InMemoryTokenStore, Session, SessionStore};
pub use users::{InMemoryUserDirectory, Subscription, UserDirectory, UserProfile};

pub type Result<T> = std::result::Result<T, StoreError>;
