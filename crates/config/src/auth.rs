use std::time::Duration;

use duration_str::deserialize_duration;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

/// Caller authentication and secret handling.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AuthConfig {
    /// Shared key every client sends in `x-api-key`.
    pub client_api_key: Option<SecretString>,
    /// Identity project. ID tokens must carry it as audience.
    pub project_id: Option<String>,
    /// HMAC secret used to verify ID tokens.
    pub id_token_secret: Option<SecretString>,
    /// AES-256 key, 64 hex characters or 32 raw bytes.
    pub encryption_key: Option<SecretString>,
    /// Lifetime of tokens issued by the session endpoint.
    #[serde(deserialize_with = "deserialize_duration")]
    pub session_ttl: Duration,
    /// Lifetime of temporary managed-key tokens.
    #[serde(deserialize_with = "deserialize_duration")]
    pub api_token_ttl: Duration,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            client_api_key: None,
            project_id: None,
            id_token_secret: None,
            encryption_key: None,
            session_ttl: Duration::from_secs(24 * 60 * 60),
            api_token_ttl: Duration::from_secs(60 * 60),
        }
    }
}

impl AuthConfig {
    /// Decodes the encryption key into its 32 raw bytes.
    pub fn encryption_key_bytes(&self) -> Option<Result<[u8; 32], String>> {
        self.encryption_key.as_ref().map(|key| decode_encryption_key(key.expose_secret()))
    }
}

pub(crate) fn decode_encryption_key(key: &str) -> Result<[u8; 32], String> {
    if key.len() == 64
        && let Ok(bytes) = hex::decode(key)
        && let Ok(bytes) = <[u8; 32]>::try_from(bytes.as_slice())
    {
        return Ok(bytes);
    }

    <[u8; 32]>::try_from(key.as_bytes()).map_err(|_| {
        format!(
            "encryption key must be 64 hex characters or exactly 32 bytes, got {} bytes",
            key.len()
        )
    })
}

#[cfg(test)]
mod tests {
    use super::decode_encryption_key;

    #[test]
    fn hex_key() {
        let key = "00".repeat(31) + "ff";
        let bytes = decode_encryption_key(&key).unwrap();

        assert_eq!(bytes[31], 0xff);
        assert_eq!(bytes[0], 0);
    }

    #[test]
    fn raw_key() {
        let key = "0123456789abcdef0123456789abcdef";
        let bytes = decode_encryption_key(key).unwrap();

        assert_eq!(&bytes, key.as_bytes());
    }

    #[test]
    fn wrong_length() {
        let error = decode_encryption_key("short").unwrap_err();

        insta::assert_snapshot!(error, @"encryption key must be 64 hex characters or exactly 32 bytes, got 5 bytes");
    }
}
