//! Message board operations on top of the authenticated API client.
//!
//! Provides:
//! - Cached listing and detail reads
//! - Content validation before anything reaches the network
//! - Cache invalidation after every mutation

use crate::api::{ApiClient, ApiError, Message, QueryCache};
use std::time::Duration;

/// Longest message the board accepts, in characters.
pub const MAX_CONTENT_CHARS: usize = 500;

#[derive(Debug, thiserror::Error)]
pub enum MessageError {
    #[error("message content is empty")]
    Empty,
    #[error("message is {0} characters; the limit is {MAX_CONTENT_CHARS}")]
    TooLong(usize),
    #[error(transparent)]
    Api(#[from] ApiError),
}

/// Trim `content` and check it against the board's limits.
pub fn validate_content(content: &str) -> Result<&str, MessageError> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Err(MessageError::Empty);
    }
    let chars = trimmed.chars().count();
    if chars > MAX_CONTENT_CHARS {
        return Err(MessageError::TooLong(chars));
    }
    Ok(trimmed)
}

pub struct MessageBoard {
    api: ApiClient,
    list: QueryCache<(), Vec<Message>>,
    detail: QueryCache<i64, Message>,
}

impl MessageBoard {
    pub fn new(api: ApiClient, stale_after: Duration) -> Self {
        Self {
            api,
            list: QueryCache::new(stale_after),
            detail: QueryCache::new(stale_after),
        }
    }

    pub async fn list(&self) -> Result<Vec<Message>, MessageError> {
        let api = &self.api;
        Ok(self.list.get_or_fetch((), || api.list_messages()).await?)
    }

    pub async fn get(&self, id: i64) -> Result<Message, MessageError> {
        let api = &self.api;
        Ok(self.detail.get_or_fetch(id, || api.get_message(id)).await?)
    }

    pub async fn create(&self, content: &str) -> Result<Message, MessageError> {
        let content = validate_content(content)?;
        let created = self.api.create_message(content).await?;
        self.list.clear();
        tracing::debug!(id = created.id, "message created");
        Ok(created)
    }

    /// Edit a message. Returns `Ok(None)` without a request when the content
    /// is unchanged.
    pub async fn update(&self, id: i64, content: &str) -> Result<Option<Message>, MessageError> {
        let content = validate_content(content)?;
        let current = self.get(id).await?;
        if current.content == content {
            tracing::debug!(id, "message unchanged, skipping update");
            return Ok(None);
        }

        let updated = self.api.update_message(id, content).await?;
        self.list.clear();
        self.detail.insert(id, updated.clone());
        Ok(Some(updated))
    }

    pub async fn delete(&self, id: i64) -> Result<(), MessageError> {
        self.api.delete_message(id).await?;
        self.list.clear();
        self.detail.invalidate(&id);
        tracing::debug!(id, "message deleted");
        Ok(())
    }

    /// Whether `user_id` wrote `message` and may edit or delete it.
    pub fn is_own(message: &Message, user_id: Option<i64>) -> bool {
        user_id == Some(message.user_id)
    }

    pub fn clear_cache(&self) {
        self.list.clear();
        self.detail.clear();
    }
}
