//! Client authentication session.
//!
//! Provides:
//! - `SessionManager`: login/register/logout and one-time startup recovery
//! - Credential decoding (JWT payload → numeric user id)
//! - The `AuthService` contract the HTTP client implements
//! - Navigation gating on the recovered session
//!
//! ## Design Decisions
//! - The session is the single writer of credential state; outbound requests
//!   pull the token through `api::CredentialProvider` instead of a shared header map.
//! - Recovery, login and logout are serialized, so a login issued during
//!   startup waits for recovery rather than racing it.
//! - Undecodable credentials are never kept: they clear the session and the
//!   persisted copy, and are logged rather than surfaced.

pub mod gate;
pub mod service;
pub mod session;
pub mod token;

pub use gate::{destination, Destination};
pub use service::{AuthReply, AuthResult, AuthService};
pub use session::{Session, SessionManager, SessionPhase};
pub use token::{CredentialDecoder, DecodeError, Identity, JwtDecoder};
