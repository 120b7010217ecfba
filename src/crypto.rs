//! Reversible cipher for OAuth token material at rest.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use rand::RngCore;
use secrecy::{ExposeSecret, SecretString};

use crate::error::CipherError;

const NONCE_LEN: usize = 12;

/// Encrypts and decrypts short secrets such as OAuth tokens.
pub trait Cipher: Send + Sync {
    fn encrypt(&self, plaintext: &str) -> Result<String, CipherError>;
    fn decrypt(&self, ciphertext: &str) -> Result<String, CipherError>;
}

/// AES-256-GCM with a random nonce prefixed to the sealed bytes, base64 encoded.
pub struct AesGcmCipher {
    inner: Aes256Gcm,
}

impl AesGcmCipher {
    /// Build from a 32-byte secret.
    pub fn new(secret: &SecretString) -> Result<Self, CipherError> {
        let key = secret.expose_secret().as_bytes();
        let inner = Aes256Gcm::new_from_slice(key).map_err(|_| {
            CipherError::InvalidKey(format!("expected 32 bytes, got {}", key.len()))
        })?;
        Ok(Self { inner })
    }
}

impl Cipher for AesGcmCipher {
    fn encrypt(&self, plaintext: &str) -> Result<String, CipherError> {
        let mut nonce = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce);

        let sealed = self
            .inner
            .encrypt(Nonce::from_slice(&nonce), plaintext.as_bytes())
            .map_err(|e| CipherError::Encrypt(e.to_string()))?;

        let mut envelope = Vec::with_capacity(NONCE_LEN + sealed.len());
        envelope.extend_from_slice(&nonce);
        envelope.extend_from_slice(&sealed);
        Ok(STANDARD.encode(envelope))
    }

    fn decrypt(&self, ciphertext: &str) -> Result<String, CipherError> {
        let envelope = STANDARD
            .decode(ciphertext.trim())
            .map_err(|e| CipherError::Decrypt(format!("invalid base64: {e}")))?;

        if envelope.len() < NONCE_LEN {
            return Err(CipherError::Decrypt("ciphertext shorter than nonce".into()));
        }

        let (nonce, sealed) = envelope.split_at(NONCE_LEN);
        let plain = self
            .inner
            .decrypt(Nonce::from_slice(nonce), sealed)
            .map_err(|e| CipherError::Decrypt(e.to_string()))?;

        String::from_utf8(plain).map_err(|e| CipherError::Decrypt(format!("invalid utf-8: {e}")))
    }
}
