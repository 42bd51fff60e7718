use std::collections::HashMap;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// What the auth middleware learned about the request credentials.
#[derive(Default, Clone, Debug)]
pub struct Authentication {
    /// Verified identity token, if the request carried one.
    pub id_token: Option<IdToken>,
}

#[derive(Clone, Debug)]
pub struct IdToken {
    pub raw: SecretString,
    pub token: jwt_compact::Token<Claims>,
}

impl std::ops::Deref for IdToken {
    type Target = jwt_compact::Token<Claims>;

    fn deref(&self) -> &Self::Target {
        &self.token
    }
}

impl IdToken {
    /// The user the token was issued for.
    pub fn user_id(&self) -> Option<&str> {
        self.token.claims().custom.user_id()
    }
}

/// Identity token claims.
#[serde_with::serde_as]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Claims {
    /// Issuer claim - identifies the principal that issued the JWT
    #[serde(default, rename = "iss", skip_serializing_if = "Option::is_none")]
    pub issuer: Option<String>,

    /// Audience claim - identifies the recipients that the JWT is intended for
    #[serde_as(deserialize_as = "Option<serde_with::OneOrMany<_>>")]
    #[serde(default, rename = "aud", skip_serializing_if = "Option::is_none")]
    pub audience: Option<Vec<String>>,

    /// Subject claim - the user id
    #[serde(default, rename = "sub", skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,

    /// Additional claims for flexible access to custom fields
    #[serde(flatten)]
    pub additional: HashMap<String, Value>,
}

impl Claims {
    /// The user id: `sub`, or the `user_id` claim some identity providers add instead.
    pub fn user_id(&self) -> Option<&str> {
        self.subject
            .as_deref()
            .filter(|sub| !sub.is_empty())
            .or_else(|| self.additional.get("user_id").and_then(Value::as_str))
    }

    pub fn has_audience(&self, audience: &str) -> bool {
        self.audience
            .as_ref()
            .is_some_and(|audiences| audiences.iter().any(|a| a == audience))
    }
}

#[cfg(test)]
mod tests {
    use super::Claims;

    #[test]
    fn single_audience() {
        let claims: Claims = serde_json::from_value(serde_json::json!({
            "iss": "https://securetoken.google.com/naya",
            "aud": "naya",
            "sub": "user-1",
            "firebase": { "sign_in_provider": "password" }
        }))
        .unwrap();

        assert!(claims.has_audience("naya"));
        assert!(!claims.has_audience("other"));
        assert_eq!(claims.user_id(), Some("user-1"));
        assert!(claims.additional.contains_key("firebase"));
    }

    #[test]
    fn user_id_claim_fallback() {
        let claims: Claims = serde_json::from_value(serde_json::json!({ "user_id": "user-2" })).unwrap();

        assert_eq!(claims.user_id(), Some("user-2"));
    }
}
