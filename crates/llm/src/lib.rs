//! The AI call path of the gateway.
//!
//! Provider adapters normalize fourteen vendor APIs behind [`ProviderAdapter`]. The
//! [`ProviderRegistry`] maps names to adapters, [`ManagedApiService`] gates and accounts
//! managed calls, and [`router`] exposes both the managed path and the quota-enforced
//! chat route over HTTP.

mod error;
mod keys;
mod managed;
mod messages;
mod policy;
pub mod provider;
mod registry;
mod server;
pub mod token_counter;

#[cfg(test)]
mod test_support;

pub use error::{LlmError, LlmResult as Result};
pub use keys::{
    IdTokenSource, InMemoryOwnKeys, KeyRequester, KeyResolver, ManagedKeySource, OwnKeyStore, RemoteManagedKeys,
    ServerKeys, StaticIdToken,
};
pub use managed::{ManagedApiService, ManagedCall};
pub use messages::{CallOptions, ChatMessage, ManagedApiResponse, Prompt, ProviderReply, Role, Usage};
pub use policy::CallPolicy;
pub use provider::ProviderAdapter;
pub use registry::ProviderRegistry;
pub use server::{AiServices, router};
