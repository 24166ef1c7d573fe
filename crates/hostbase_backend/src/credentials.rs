//! Host-key credential cipher.
//!
//! Passwords handed to a host are encrypted under that host's own key:
//! `base64(nonce (12 bytes) || ciphertext || tag (16 bytes))`, AES-256-GCM
//! with a key derived from the host key by HKDF-SHA256.

use crate::error::{BackendError, BackendResult};
use aes_gcm::{
    aead::{generic_array::GenericArray, Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Size of the derived AES-256 key in bytes.
pub const KEY_SIZE: usize = 32;
/// Size of the GCM nonce in bytes.
pub const NONCE_SIZE: usize = 12;
/// Size of the GCM authentication tag in bytes.
pub const TAG_SIZE: usize = 16;

const KEY_INFO: &[u8] = b"hostbase-host-credentials-v1";

/// A user name with a password.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    /// Account name.
    pub username: String,
    /// Password, plain or encrypted depending on where it travels.
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

#[derive(Zeroize, ZeroizeOnDrop)]
struct DerivedKey([u8; KEY_SIZE]);

/// Encrypts and decrypts passwords under one host key.
pub struct HostKeyCipher {
    cipher: Aes256Gcm,
}

impl HostKeyCipher {
    /// Derives the cipher from a host key.
    ///
    /// # Errors
    ///
    /// Returns an error if the host key is empty.
    pub fn new(host_key: &str) -> BackendResult<Self> {
        use hkdf::Hkdf;
        use sha2::Sha256;

        if host_key.is_empty() {
            return Err(BackendError::Crypto("empty host key".to_string()));
        }
        let hk = Hkdf::<Sha256>::new(None, host_key.as_bytes());
        let mut key = DerivedKey([0u8; KEY_SIZE]);
        hk.expand(KEY_INFO, &mut key.0)
            .map_err(|_| BackendError::Crypto("HKDF expand failed".to_string()))?;
        let cipher = Aes256Gcm::new(GenericArray::from_slice(&key.0));
        Ok(Self { cipher })
    }

    /// Encrypts `plaintext` with a fresh random nonce.
    pub fn encrypt(&self, plaintext: &str) -> BackendResult<String> {
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|_| BackendError::Crypto("encryption error".to_string()))?;

        let mut blob = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        blob.extend_from_slice(&nonce_bytes);
        blob.extend(ciphertext);
        Ok(STANDARD.encode(blob))
    }

    /// Decrypts a blob produced by [`HostKeyCipher::encrypt`].
    ///
    /// # Errors
    ///
    /// Fails on bad base64, a truncated blob, the wrong key, or tampering.
    pub fn decrypt(&self, encoded: &str) -> BackendResult<String> {
        let blob = STANDARD
            .decode(encoded.trim())
            .map_err(|e| BackendError::Crypto(format!("bad base64: {e}")))?;
        if blob.len() < NONCE_SIZE + TAG_SIZE {
            return Err(BackendError::Crypto("ciphertext too short".to_string()));
        }
        let nonce = Nonce::from_slice(&blob[..NONCE_SIZE]);
        let plaintext = self
            .cipher
            .decrypt(nonce, &blob[NONCE_SIZE..])
            .map_err(|_| BackendError::Crypto("decryption error".to_string()))?;
        String::from_utf8(plaintext)
            .map_err(|_| BackendError::Crypto("password is not UTF-8".to_string()))
    }
}

impl std::fmt::Debug for HostKeyCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostKeyCipher")
            .field("cipher", &"Aes256Gcm")
            .finish()
    }
}
