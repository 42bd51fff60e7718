//! Request-scoped values shared between the HTTP middleware and the handlers.

mod authentication;
mod client_identity;

pub use authentication::{Authentication, Claims, IdToken};
pub use client_identity::ClientIdentity;
