use aes_gcm::{
    Aes256Gcm, Key, Nonce,
    aead::{Aead, AeadCore, KeyInit, OsRng},
};
use serde::{Deserialize, Serialize};

const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// A sealed value as handed to clients, every field hex encoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedPayload {
    pub encrypted: String,
    pub auth_tag: String,
    pub iv: String,
}

#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("encryption failed")]
    Encrypt,
    #[error("malformed encrypted payload")]
    Malformed,
    #[error("decryption failed")]
    Decrypt,
}

/// AES-256-GCM with a fresh random nonce per message.
pub struct TokenCipher {
    cipher: Aes256Gcm,
}

impl TokenCipher {
    pub fn new(key: [u8; 32]) -> Self {
        Self {
            cipher: Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key)),
        }
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<EncryptedPayload, CryptoError> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

        let mut sealed = self
            .cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|_| CryptoError::Encrypt)?;

        // The tag trails the ciphertext.
        let tag = sealed.split_off(sealed.len() - TAG_LEN);

        Ok(EncryptedPayload {
            encrypted: hex::encode(sealed),
            auth_tag: hex::encode(tag),
            iv: hex::encode(nonce),
        })
    }

    pub fn decrypt(&self, payload: &EncryptedPayload) -> Result<String, CryptoError> {
        let iv = hex::decode(&payload.iv).map_err(|_| CryptoError::Malformed)?;
        let tag = hex::decode(&payload.auth_tag).map_err(|_| CryptoError::Malformed)?;
        let mut sealed = hex::decode(&payload.encrypted).map_err(|_| CryptoError::Malformed)?;

        if iv.len() != NONCE_LEN || tag.len() != TAG_LEN {
            return Err(CryptoError::Malformed);
        }

        sealed.extend_from_slice(&tag);

        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(&iv), sealed.as_slice())
            .map_err(|_| CryptoError::Decrypt)?;

        String::from_utf8(plaintext).map_err(|_| CryptoError::Decrypt)
    }
}
