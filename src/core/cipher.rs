//! AES-256-GCM protection for Portal credentials at rest.
//!
//! Token format: standard base64 of `nonce (12 bytes) || ciphertext || tag (16 bytes)`.
//! A fresh nonce is drawn for every call, so equal secrets never produce equal tokens.

use crate::utils::error::{PortalError, Result};
use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use std::fmt;
use std::sync::{Arc, OnceLock};
use zeroize::Zeroizing;

pub const KEY_LEN: usize = 32;
pub const NONCE_LEN: usize = 12;
pub const TAG_LEN: usize = 16;
pub const DEFAULT_KEY_ENV: &str = "PORTAL_SYNC_KEY";

static PROCESS_CIPHER: OnceLock<Arc<CredentialCipher>> = OnceLock::new();

/// 256-bit symmetric key. Wiped on drop; never printed.
#[derive(Clone)]
pub struct CipherKey(Zeroizing<[u8; KEY_LEN]>);

impl CipherKey {
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(Zeroizing::new(bytes))
    }

    pub fn generate() -> Self {
        let generated = Aes256Gcm::generate_key(&mut OsRng);
        let mut bytes = Zeroizing::new([0u8; KEY_LEN]);
        bytes.copy_from_slice(&generated);
        Self(bytes)
    }

    pub fn from_base64(encoded: &str) -> Result<Self> {
        let decoded = Zeroizing::new(STANDARD.decode(encoded.trim()).map_err(|_| {
            PortalError::ConfigError {
                message: "cipher key is not valid base64".to_string(),
            }
        })?);
        if decoded.len() != KEY_LEN {
            return Err(PortalError::ConfigError {
                message: format!(
                    "cipher key must decode to {} bytes, got {}",
                    KEY_LEN,
                    decoded.len()
                ),
            });
        }
        let mut bytes = Zeroizing::new([0u8; KEY_LEN]);
        bytes.copy_from_slice(&decoded);
        Ok(Self(bytes))
    }

    /// Read a base64 key from the named environment variable.
    pub fn from_env(var: &str) -> Result<Self> {
        let value = Zeroizing::new(std::env::var(var).map_err(|_| PortalError::ConfigError {
            message: format!("environment variable {} is not set", var),
        })?);
        Self::from_base64(&value)
    }

    pub fn to_base64(&self) -> Zeroizing<String> {
        Zeroizing::new(STANDARD.encode(self.0.as_slice()))
    }
}

impl fmt::Debug for CipherKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CipherKey([REDACTED])")
    }
}

pub struct CredentialCipher {
    aead: Aes256Gcm,
}

impl CredentialCipher {
    pub fn new(key: &CipherKey) -> Self {
        Self {
            aead: Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.0.as_slice())),
        }
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<String> {
        if plaintext.is_empty() {
            return Err(PortalError::InvalidRequest {
                message: "cannot encrypt an empty secret".to_string(),
            });
        }

        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .aead
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|_| PortalError::EncryptionFailed)?;

        let mut token = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        token.extend_from_slice(&nonce);
        token.extend_from_slice(&ciphertext);
        Ok(STANDARD.encode(token))
    }

    pub fn decrypt(&self, token: &str) -> Result<Zeroizing<String>> {
        let raw = STANDARD
            .decode(token)
            .map_err(|_| PortalError::DecryptionFailed)?;
        if raw.len() < NONCE_LEN + TAG_LEN {
            return Err(PortalError::DecryptionFailed);
        }

        let (nonce, ciphertext) = raw.split_at(NONCE_LEN);
        let plaintext = self
            .aead
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| PortalError::DecryptionFailed)?;

        String::from_utf8(plaintext)
            .map(Zeroizing::new)
            .map_err(|_| PortalError::DecryptionFailed)
    }
}

impl fmt::Debug for CredentialCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CredentialCipher { .. }")
    }
}

/// Install the process-wide cipher. Succeeds once per process.
pub fn install(key: &CipherKey) -> Result<Arc<CredentialCipher>> {
    let cipher = Arc::new(CredentialCipher::new(key));
    PROCESS_CIPHER
        .set(Arc::clone(&cipher))
        .map_err(|_| PortalError::ConfigError {
            message: "cipher key has already been installed".to_string(),
        })?;
    tracing::debug!("Process cipher installed");
    Ok(cipher)
}

pub fn installed() -> Option<Arc<CredentialCipher>> {
    PROCESS_CIPHER.get().cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cipher() -> CredentialCipher {
        CredentialCipher::new(&CipherKey::generate())
    }

    #[test]
    fn test_round_trip() {
        let cipher = cipher();
        for secret in [
            "p",
            "hunter2",
            "https://hac.example-isd.org/HomeAccess",
            "pässwörd with spaces & symbols!",
            &"x".repeat(512),
        ] {
            let token = cipher.encrypt(secret).unwrap();
            assert_eq!(cipher.decrypt(&token).unwrap().as_str(), secret);
        }
    }

    #[test]
    fn test_tokens_are_not_deterministic() {
        let cipher = cipher();
        let a = cipher.encrypt("same secret").unwrap();
        let b = cipher.encrypt("same secret").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_every_single_bit_flip_is_rejected() {
        let cipher = cipher();
        let token = cipher.encrypt("correct-horse").unwrap();
        let raw = STANDARD.decode(&token).unwrap();

        for byte in 0..raw.len() {
            for bit in 0..8 {
                let mut tampered = raw.clone();
                tampered[byte] ^= 1 << bit;
                let result = cipher.decrypt(&STANDARD.encode(&tampered));
                assert!(
                    matches!(result, Err(PortalError::DecryptionFailed)),
                    "flip of byte {} bit {} was accepted",
                    byte,
                    bit
                );
            }
        }
    }

    #[test]
    fn test_malformed_and_truncated_tokens() {
        let cipher = cipher();
        let token = cipher.encrypt("secret").unwrap();
        let raw = STANDARD.decode(&token).unwrap();

        assert!(matches!(cipher.decrypt("%%% not base64"), Err(PortalError::DecryptionFailed)));
        assert!(matches!(cipher.decrypt(""), Err(PortalError::DecryptionFailed)));
        let truncated = STANDARD.encode(&raw[..NONCE_LEN + TAG_LEN - 1]);
        assert!(matches!(cipher.decrypt(&truncated), Err(PortalError::DecryptionFailed)));
        let short_body = STANDARD.encode(&raw[..raw.len() - 1]);
        assert!(matches!(cipher.decrypt(&short_body), Err(PortalError::DecryptionFailed)));
    }

    #[test]
    fn test_wrong_key_is_rejected() {
        let token = cipher().encrypt("secret").unwrap();
        assert!(matches!(cipher().decrypt(&token), Err(PortalError::DecryptionFailed)));
    }

    #[test]
    fn test_empty_plaintext_is_rejected() {
        assert!(matches!(cipher().encrypt(""), Err(PortalError::InvalidRequest { .. })));
    }

    #[test]
    fn test_key_base64_parsing() {
        let key = CipherKey::generate();
        let encoded = key.to_base64();
        let parsed = CipherKey::from_base64(&encoded).unwrap();

        let token = CredentialCipher::new(&key).encrypt("secret").unwrap();
        assert_eq!(
            CredentialCipher::new(&parsed).decrypt(&token).unwrap().as_str(),
            "secret"
        );

        assert!(CipherKey::from_base64("c2hvcnQ=").is_err());
        assert!(CipherKey::from_base64("not base64!").is_err());
    }

    #[test]
    fn test_key_debug_is_redacted() {
        let key = CipherKey::from_bytes([7u8; KEY_LEN]);
        let out = format!("{:?}", key);
        assert_eq!(out, "CipherKey([REDACTED])");
        assert!(!out.contains(key.to_base64().as_str()));
    }
}
