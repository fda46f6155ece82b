//! Secure credential persistence.
//!
//! - `encryption`: AES-256-GCM value encryption with a generated key file
//! - `secure_store`: the `SecureStore` contract plus file-backed and in-memory stores

pub mod encryption;
pub mod secure_store;

pub use encryption::AesEncryptor;
pub use secure_store::{FileSecureStore, MemorySecureStore, SecureStore, StoreError};
