//! HTTP client for the courier backend.
//!
//! ## Design
//! - One `reqwest::Client` shared by clones of `ApiClient`
//! - Credentials are pulled from a `CredentialProvider` each time a request is
//!   built, so the Authorization header always reflects the live session
//! - Non-2xx responses carry the backend's message in `ApiError::Status`

use super::models::{
    ErrorBody, LoginRequest, Message, MessageDraft, RegisterRequest, TokenResponse, UserProfile,
};
use crate::auth::{AuthReply, AuthService};
use crate::config::Config;
use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use reqwest::{Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Multipart field name the backend expects for avatar uploads.
const AVATAR_FIELD: &str = "avatar";

/// Source of the bearer credential for outbound requests.
pub trait CredentialProvider: Send + Sync {
    fn current_token(&self) -> Option<String>;
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("network error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("request failed ({status}): {message}")]
    Status { status: u16, message: String },
    #[error("could not read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ApiError {
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Transport(e) => e.status().map(|s| s.as_u16()),
            Self::Io { .. } => None,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status() == Some(401)
    }
}

/// REST client. Cheap to clone.
#[derive(Clone)]
pub struct ApiClient {
    base_url: String,
    http: reqwest::Client,
    credentials: Option<Arc<dyn CredentialProvider>>,
}

impl ApiClient {
    /// Create an anonymous client from configuration.
    pub fn new(config: &Config) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;
        Ok(Self {
            base_url: config.api_url.trim_end_matches('/').to_string(),
            http,
            credentials: None,
        })
    }

    /// A client sharing this one's connection pool that authenticates with
    /// whatever `provider` holds at request time.
    pub fn with_credentials(&self, provider: Arc<dyn CredentialProvider>) -> Self {
        Self {
            base_url: self.base_url.clone(),
            http: self.http.clone(),
            credentials: Some(provider),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Absolute URL for a server-relative asset such as an avatar path.
    pub fn asset_url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        self.url(path)
    }

    /// The Authorization header value requests would carry right now.
    pub fn authorization(&self) -> Option<String> {
        self.credentials
            .as_ref()?
            .current_token()
            .map(|token| format!("Bearer {token}"))
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let mut req = self.http.request(method, self.url(path));
        if let Some(value) = self.authorization() {
            req = req.header(AUTHORIZATION, value);
        }
        req
    }

    async fn execute<T: DeserializeOwned>(&self, req: RequestBuilder) -> Result<T, ApiError> {
        let resp = req.send().await?;
        if !resp.status().is_success() {
            return Err(status_error(resp).await);
        }
        Ok(resp.json().await?)
    }

    async fn execute_empty(&self, req: RequestBuilder) -> Result<(), ApiError> {
        let resp = req.send().await?;
        if !resp.status().is_success() {
            return Err(status_error(resp).await);
        }
        Ok(())
    }

    // ── Messages ─────────────────────────────────────────────────

    pub async fn list_messages(&self) -> Result<Vec<Message>, ApiError> {
        self.execute(self.request(Method::GET, "/messages")).await
    }

    pub async fn get_message(&self, id: i64) -> Result<Message, ApiError> {
        self.execute(self.request(Method::GET, &format!("/messages/{id}")))
            .await
    }

    pub async fn create_message(&self, content: &str) -> Result<Message, ApiError> {
        let req = self
            .request(Method::POST, "/messages")
            .json(&MessageDraft { content });
        self.execute(req).await
    }

    pub async fn update_message(&self, id: i64, content: &str) -> Result<Message, ApiError> {
        let req = self
            .request(Method::PUT, &format!("/messages/{id}"))
            .json(&MessageDraft { content });
        self.execute(req).await
    }

    pub async fn delete_message(&self, id: i64) -> Result<(), ApiError> {
        self.execute_empty(self.request(Method::DELETE, &format!("/messages/{id}")))
            .await
    }

    // ── Profile ──────────────────────────────────────────────────

    pub async fn current_user(&self) -> Result<UserProfile, ApiError> {
        self.execute(self.request(Method::GET, "/users/me")).await
    }

    /// Upload an image file as the signed-in user's avatar.
    pub async fn upload_avatar(&self, path: &Path) -> Result<UserProfile, ApiError> {
        let bytes = tokio::fs::read(path).await.map_err(|source| ApiError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "avatar".to_string());
        let mime = mime_guess::from_path(path).first_or_octet_stream();

        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name(file_name)
            .mime_str(mime.essence_str())?;
        let form = reqwest::multipart::Form::new().part(AVATAR_FIELD, part);

        let req = self.request(Method::POST, "/users/me/avatar").multipart(form);
        self.execute(req).await
    }
}

#[async_trait]
impl AuthService for ApiClient {
    async fn login(&self, email: &str, password: &str) -> Result<AuthReply<String>, ApiError> {
        let req = self
            .request(Method::POST, "/auth")
            .json(&LoginRequest { email, password });
        match self.execute::<TokenResponse>(req).await {
            Ok(body) => Ok(AuthReply::Accepted(body.token)),
            Err(ApiError::Status { message, .. }) => Ok(AuthReply::Rejected(message)),
            Err(e) => Err(e),
        }
    }

    async fn register(
        &self,
        email: &str,
        password: &str,
        name: Option<&str>,
    ) -> Result<AuthReply<UserProfile>, ApiError> {
        let req = self.request(Method::POST, "/users").json(&RegisterRequest {
            email,
            password,
            name,
        });
        match self.execute::<UserProfile>(req).await {
            Ok(user) => Ok(AuthReply::Accepted(user)),
            Err(ApiError::Status { message, .. }) => Ok(AuthReply::Rejected(message)),
            Err(e) => Err(e),
        }
    }
}

/// Build an `ApiError::Status` from a failed response, preferring the
/// backend's own message.
async fn status_error(resp: Response) -> ApiError {
    let status = resp.status();
    let text = resp.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&text)
        .ok()
        .and_then(ErrorBody::into_message)
        .or_else(|| {
            let trimmed = text.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        })
        .unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("request failed")
                .to_string()
        });
    tracing::debug!(status = status.as_u16(), %message, "request failed");
    ApiError::Status {
        status: status.as_u16(),
        message,
    }
}
