//! Credential exchange contract and the result shape handed back to callers.

use crate::api::{ApiError, UserProfile};
use async_trait::async_trait;
use serde::Serialize;

/// What the authentication backend said about a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthReply<T> {
    /// Request accepted; carries the credential (login) or created user (register).
    Accepted(T),
    /// Request refused, with the backend's message.
    Rejected(String),
}

/// Backend that exchanges user credentials for a session credential.
#[async_trait]
pub trait AuthService: Send + Sync {
    /// Exchange email/password for a raw credential string.
    async fn login(&self, email: &str, password: &str) -> Result<AuthReply<String>, ApiError>;

    /// Create an account. Does not sign the user in.
    async fn register(
        &self,
        email: &str,
        password: &str,
        name: Option<&str>,
    ) -> Result<AuthReply<UserProfile>, ApiError>;
}

/// Result of a login or registration, returned as data rather than an error so
/// callers can render the message inline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthResult<T> {
    pub error: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub msg: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> AuthResult<T> {
    pub fn ok(data: T) -> Self {
        Self {
            error: false,
            msg: None,
            data: Some(data),
        }
    }

    pub fn failed(msg: impl Into<String>) -> Self {
        Self {
            error: true,
            msg: Some(msg.into()),
            data: None,
        }
    }

    pub fn is_error(&self) -> bool {
        self.error
    }
}
