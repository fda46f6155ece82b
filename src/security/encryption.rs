//! AES-256-GCM encryption for values held in the secure store.
//!
//! Values are encoded as `aes256:<base64(nonce ‖ ciphertext)>` so a stored
//! entry is self-describing and corrupt entries can be told apart from
//! I/O failures.

use super::secure_store::StoreError;
use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::Engine;
use std::path::Path;

/// Nonce size for AES-256-GCM (12 bytes / 96 bits).
const AES_GCM_NONCE_SIZE: usize = 12;

/// Key size for AES-256 (32 bytes).
pub const KEY_SIZE: usize = 32;

/// Prefix for AES-256-GCM encrypted values.
const AES_GCM_PREFIX: &str = "aes256:";

/// AES-256-GCM encryption engine.
pub struct AesEncryptor {
    cipher: Aes256Gcm,
}

impl AesEncryptor {
    /// Create a new encryptor with a 256-bit key.
    pub fn new(key: &[u8; KEY_SIZE]) -> Self {
        Self {
            cipher: Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key)),
        }
    }

    /// Load the key from `path`, generating and saving a fresh one if the file
    /// does not exist yet.
    pub fn load_or_generate(path: &Path) -> Result<Self, StoreError> {
        if path.exists() {
            return Self::from_key_file(path);
        }
        let key = Aes256Gcm::generate_key(&mut OsRng);
        write_private(path, key.as_slice())?;
        tracing::info!(path = %path.display(), "generated secure store key");
        let mut bytes = [0u8; KEY_SIZE];
        bytes.copy_from_slice(key.as_slice());
        Ok(Self::new(&bytes))
    }

    /// Create an encryptor by loading the key from a file.
    pub fn from_key_file(path: &Path) -> Result<Self, StoreError> {
        let key_bytes = std::fs::read(path)?;
        if key_bytes.len() != KEY_SIZE {
            return Err(StoreError::KeyFile(format!(
                "{} must hold exactly {KEY_SIZE} bytes, got {}",
                path.display(),
                key_bytes.len()
            )));
        }
        let mut key = [0u8; KEY_SIZE];
        key.copy_from_slice(&key_bytes);
        Ok(Self::new(&key))
    }

    /// Encrypt plaintext, returning a prefixed base64 string.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, StoreError> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|e| StoreError::Corrupt(format!("encryption failed: {e}")))?;

        let mut combined = Vec::with_capacity(AES_GCM_NONCE_SIZE + ciphertext.len());
        combined.extend_from_slice(nonce.as_slice());
        combined.extend_from_slice(&ciphertext);

        let encoded = base64::engine::general_purpose::STANDARD.encode(&combined);
        Ok(format!("{AES_GCM_PREFIX}{encoded}"))
    }

    /// Decrypt a prefixed base64 string back to plaintext.
    ///
    /// Every failure here means the stored bytes are unusable, so all of them
    /// map to [`StoreError::Corrupt`].
    pub fn decrypt(&self, encrypted: &str) -> Result<String, StoreError> {
        let encoded = encrypted
            .trim()
            .strip_prefix(AES_GCM_PREFIX)
            .ok_or_else(|| StoreError::Corrupt("missing AES-256-GCM prefix".into()))?;

        let combined = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| StoreError::Corrupt(format!("invalid base64: {e}")))?;

        if combined.len() < AES_GCM_NONCE_SIZE {
            return Err(StoreError::Corrupt("ciphertext too short".into()));
        }

        let (nonce_bytes, ciphertext) = combined.split_at(AES_GCM_NONCE_SIZE);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|e| StoreError::Corrupt(format!("decryption failed: {e}")))?;

        String::from_utf8(plaintext)
            .map_err(|e| StoreError::Corrupt(format!("invalid UTF-8 in plaintext: {e}")))
    }

    /// Check if a string is AES-256-GCM encrypted (has the prefix).
    pub fn is_encrypted(value: &str) -> bool {
        value.starts_with(AES_GCM_PREFIX)
    }
}

/// Write `bytes` to `path`, readable only by the owner on Unix.
pub(crate) fn write_private(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use std::io::Write;
        use std::os::unix::fs::OpenOptionsExt;
        let mut file = std::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)?;
        file.write_all(bytes)?;
        file.sync_all()
    }
    #[cfg(not(unix))]
    {
        std::fs::write(path, bytes)
    }
}
