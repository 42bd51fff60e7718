use context::{Claims, IdToken};
use jwt_compact::{
    AlgorithmExt, TimeOptions, UntrustedToken,
    alg::{Hs256, Hs256Key},
};
use secrecy::{ExposeSecret, SecretString};

use super::{AuthResult, error::AuthError};

const ISSUER_PREFIX: &str = "https://securetoken.google.com/";

/// Verifies the HS256-signed identity tokens clients send as bearer tokens.
pub struct IdTokenVerifier {
    key: Hs256Key,
    project_id: Option<String>,
}

impl IdTokenVerifier {
    pub fn new(secret: &SecretString, project_id: Option<String>) -> Self {
        Self {
            key: Hs256Key::new(secret.expose_secret().as_bytes()),
            project_id,
        }
    }

    /// Checks signature, expiry and, with a project configured, audience and issuer.
    pub fn verify(&self, raw: &str) -> AuthResult<IdToken> {
        let untrusted = UntrustedToken::new(raw).map_err(|e| {
            log::debug!("Malformed ID token: {e}");
            AuthError::InvalidToken
        })?;

        let token = Hs256.validator::<Claims>(&self.key).validate(&untrusted).map_err(|e| {
            log::debug!("ID token signature rejected: {e}");
            AuthError::InvalidToken
        })?;

        token
            .claims()
            .validate_expiration(&TimeOptions::default())
            .map_err(|e| {
                log::debug!("ID token rejected: {e}");
                AuthError::InvalidToken
            })?;

        let claims = &token.claims().custom;

        if let Some(project_id) = &self.project_id {
            if !claims.has_audience(project_id) {
                log::debug!("ID token audience does not match project {project_id}");
                return Err(AuthError::InvalidToken);
            }

            let issuer = format!("{ISSUER_PREFIX}{project_id}");

            if claims.issuer.as_deref() != Some(issuer.as_str()) {
                log::debug!("ID token issuer does not match {issuer}");
                return Err(AuthError::InvalidToken);
            }
        }

        if claims.user_id().is_none() {
            log::debug!("ID token carries no user id");
            return Err(AuthError::InvalidToken);
        }

        Ok(IdToken {
            raw: SecretString::from(raw.to_string()),
            token,
        })
    }
}
