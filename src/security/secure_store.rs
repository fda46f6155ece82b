//! Encrypted-at-rest key-value storage for small secrets.
//!
//! `FileSecureStore` keeps one AES-256-GCM encrypted file per key next to a
//! generated key file. `MemorySecureStore` is an in-process map with the same
//! contract, used for ephemeral sessions and tests.

use super::encryption::{write_private, AesEncryptor};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// File name of the store's encryption key.
const KEY_FILE_NAME: &str = "store.key";

/// Extension of encrypted value files.
const VALUE_EXTENSION: &str = "enc";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("invalid store key {0:?}: use letters, digits, '.', '_' or '-'")]
    InvalidKey(String),
    #[error("secure store I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("stored value is corrupt: {0}")]
    Corrupt(String),
    #[error("invalid key file: {0}")]
    KeyFile(String),
}

/// Platform-style secure key-value store.
#[async_trait]
pub trait SecureStore: Send + Sync {
    /// Read the value stored under `key`, if any.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Store `value` under `key`, replacing any previous value.
    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Remove the value under `key`. Removing a missing key succeeds.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;
}

fn validate_key(key: &str) -> Result<(), StoreError> {
    let valid = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        && key != "."
        && key != "..";
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidKey(key.to_string()))
    }
}

// ── File-backed store ────────────────────────────────────────────

/// Secure store backed by encrypted files in a private directory.
pub struct FileSecureStore {
    dir: PathBuf,
    encryptor: AesEncryptor,
}

impl FileSecureStore {
    /// Open (or create) a store rooted at `dir`.
    pub fn open(dir: &Path) -> Result<Self, StoreError> {
        std::fs::create_dir_all(dir)?;
        let encryptor = AesEncryptor::load_or_generate(&dir.join(KEY_FILE_NAME))?;
        Ok(Self {
            dir: dir.to_path_buf(),
            encryptor,
        })
    }

    fn value_path(&self, key: &str) -> Result<PathBuf, StoreError> {
        validate_key(key)?;
        Ok(self.dir.join(format!("{key}.{VALUE_EXTENSION}")))
    }
}

#[async_trait]
impl SecureStore for FileSecureStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let path = self.value_path(key)?;
        let encrypted = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) if e.kind() == std::io::ErrorKind::InvalidData => {
                return Err(StoreError::Corrupt(format!("{key}: not valid UTF-8")))
            }
            Err(e) => return Err(e.into()),
        };
        self.encryptor.decrypt(&encrypted).map(Some)
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let path = self.value_path(key)?;
        let encrypted = self.encryptor.encrypt(value)?;

        // Write-then-rename so a crash never leaves a half-written entry.
        let tmp = path.with_extension(format!("{VALUE_EXTENSION}.tmp"));
        let tmp_for_write = tmp.clone();
        tokio::task::spawn_blocking(move || write_private(&tmp_for_write, encrypted.as_bytes()))
            .await
            .map_err(|e| StoreError::Io(std::io::Error::other(e)))??;
        tokio::fs::rename(&tmp, &path).await?;
        tracing::debug!(key, "secure store entry written");
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let path = self.value_path(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                tracing::debug!(key, "secure store entry removed");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

// ── In-memory store ──────────────────────────────────────────────

/// Non-persistent store with the same contract as [`FileSecureStore`].
#[derive(Default)]
pub struct MemorySecureStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemorySecureStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[async_trait]
impl SecureStore for MemorySecureStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        validate_key(key)?;
        Ok(self.entries.lock().get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        validate_key(key)?;
        self.entries
            .lock()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        validate_key(key)?;
        self.entries.lock().remove(key);
        Ok(())
    }
}
