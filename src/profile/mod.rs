//! Signed-in user's profile and avatar.

use crate::api::{ApiClient, ApiError, QueryCache, UserProfile};
use std::path::Path;
use std::time::Duration;

pub struct ProfileService {
    api: ApiClient,
    cache: QueryCache<(), UserProfile>,
}

impl ProfileService {
    pub fn new(api: ApiClient, stale_after: Duration) -> Self {
        Self {
            api,
            cache: QueryCache::new(stale_after),
        }
    }

    pub async fn profile(&self) -> Result<UserProfile, ApiError> {
        let api = &self.api;
        self.cache.get_or_fetch((), || api.current_user()).await
    }

    /// Upload a new avatar image and return the updated profile.
    pub async fn upload_avatar(&self, path: &Path) -> Result<UserProfile, ApiError> {
        let profile = self.api.upload_avatar(path).await?;
        self.cache.invalidate(&());
        tracing::info!(user_id = profile.id, "avatar updated");
        Ok(profile)
    }

    pub fn avatar_url(&self, profile: &UserProfile) -> Option<String> {
        profile
            .avatar
            .as_deref()
            .filter(|a| !a.is_empty())
            .map(|a| self.api.asset_url(a))
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }
}

/// Uppercased first letter of the user's name, `?` without one.
pub fn display_initial(profile: &UserProfile) -> String {
    profile
        .name
        .as_deref()
        .and_then(|n| n.trim().chars().next())
        .map(|c| c.to_uppercase().collect())
        .unwrap_or_else(|| "?".to_string())
}

pub fn display_name(profile: &UserProfile) -> &str {
    profile
        .name
        .as_deref()
        .filter(|n| !n.trim().is_empty())
        .unwrap_or("No name")
}

pub fn display_email(profile: &UserProfile) -> &str {
    Some(profile.email.as_str())
        .filter(|e| !e.trim().is_empty())
        .unwrap_or("No email")
}
