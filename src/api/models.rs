//! REST payloads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A message on the board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: i64,
    pub content: String,
    /// Author.
    pub user_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

/// Body for creating or editing a message.
#[derive(Debug, Clone, Serialize)]
pub struct MessageDraft<'a> {
    pub content: &'a str,
}

/// The signed-in user's profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: i64,
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
    /// Server-relative avatar path, e.g. `/uploads/7.jpg`.
    #[serde(default)]
    pub avatar: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct LoginRequest<'a> {
    pub email: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct RegisterRequest<'a> {
    pub email: &'a str,
    pub password: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TokenResponse {
    pub token: String,
}

/// Error bodies seen from the backend; any of these fields may carry the text.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct ErrorBody {
    pub msg: Option<String>,
    pub message: Option<String>,
    pub error: Option<String>,
}

impl ErrorBody {
    pub fn into_message(self) -> Option<String> {
        self.msg
            .or(self.message)
            .or(self.error)
            .filter(|m| !m.trim().is_empty())
    }
}
