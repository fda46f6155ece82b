//! Backend REST access.
//!
//! Provides:
//! - `ApiClient`: typed calls for auth, messages and the user profile
//! - `CredentialProvider`: where the client reads its bearer token from
//! - `QueryCache`: stale-time cache for reads

pub mod cache;
pub mod client;
pub mod models;

pub use cache::QueryCache;
pub use client::{ApiClient, ApiError, CredentialProvider};
pub use models::{Message, MessageDraft, UserProfile};
