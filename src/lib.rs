//! Client core for the courier messaging app.
//!
//! Provides:
//! - `auth`: session lifecycle (recover, login, register, logout) and navigation gating
//! - `security`: encrypted on-disk credential store
//! - `api`: REST client that authenticates from the live session
//! - `messages` / `profile`: cached domain operations on top of the client
//! - `config`: TOML + environment configuration

pub mod api;
pub mod auth;
pub mod config;
pub mod messages;
pub mod profile;
pub mod security;

pub use api::{ApiClient, ApiError, CredentialProvider};
pub use auth::{AuthResult, Destination, Session, SessionManager, SessionPhase};
pub use config::Config;
