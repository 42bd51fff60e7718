mod error;
mod id_token;
mod layer;

pub(crate) use layer::*;

type AuthResult<T> = Result<T, error::AuthError>;
