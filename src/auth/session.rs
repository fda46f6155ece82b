//! Client session lifecycle.
//!
//! State machine:
//!
//! ```text
//! Uninitialized ──recover()──▶ Anonymous ◀──logout() / bad credential── Authenticated
//!       │                          └──────────────login()──────────────────▶ ▲
//!       └──────────recover() with a decodable stored credential──────────────┘
//! ```
//!
//! The in-memory [`Session`] is the source of truth for the process; the copy
//! in the secure store only seeds the next process. Outbound requests read the
//! current token through [`CredentialProvider`], so clearing the session also
//! clears the Authorization header.

use super::gate::{destination, Destination};
use super::service::{AuthReply, AuthResult, AuthService};
use super::token::CredentialDecoder;
use crate::api::{CredentialProvider, UserProfile};
use crate::security::{SecureStore, StoreError};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};

/// Token together with the identity decoded from it.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Credential {
    token: String,
    user_id: i64,
}

/// Observable session state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    credential: Option<Credential>,
    initialized: bool,
}

/// Coarse session state, as seen by navigation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Uninitialized,
    Anonymous,
    Authenticated,
}

impl Session {
    pub fn token(&self) -> Option<&str> {
        self.credential.as_ref().map(|c| c.token.as_str())
    }

    pub fn user_id(&self) -> Option<i64> {
        self.credential.as_ref().map(|c| c.user_id)
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn is_authenticated(&self) -> bool {
        self.credential.is_some()
    }

    pub fn phase(&self) -> SessionPhase {
        match (self.initialized, self.is_authenticated()) {
            (false, _) => SessionPhase::Uninitialized,
            (true, false) => SessionPhase::Anonymous,
            (true, true) => SessionPhase::Authenticated,
        }
    }
}

/// Owns the session and the operations that change it.
pub struct SessionManager {
    state: watch::Sender<Session>,
    /// Serializes recover/login/logout so none observes another half-applied.
    ops: Mutex<()>,
    auth: Arc<dyn AuthService>,
    store: Arc<dyn SecureStore>,
    decoder: Arc<dyn CredentialDecoder>,
    credential_key: String,
}

impl SessionManager {
    pub fn new(
        auth: Arc<dyn AuthService>,
        store: Arc<dyn SecureStore>,
        decoder: Arc<dyn CredentialDecoder>,
        credential_key: impl Into<String>,
    ) -> Self {
        let (state, _) = watch::channel(Session::default());
        Self {
            state,
            ops: Mutex::new(()),
            auth,
            store,
            decoder,
            credential_key: credential_key.into(),
        }
    }

    // ── Observers ───────────────────────────────────────────────

    pub fn snapshot(&self) -> Session {
        self.state.borrow().clone()
    }

    /// Receive every subsequent session change.
    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.state.subscribe()
    }

    pub fn token(&self) -> Option<String> {
        self.state.borrow().token().map(str::to_owned)
    }

    pub fn user_id(&self) -> Option<i64> {
        self.state.borrow().user_id()
    }

    pub fn is_initialized(&self) -> bool {
        self.state.borrow().is_initialized()
    }

    /// Wait until startup recovery has completed, then return the session.
    pub async fn wait_initialized(&self) -> Session {
        let mut rx = self.state.subscribe();
        let session = match rx.wait_for(Session::is_initialized).await {
            Ok(session) => (*session).clone(),
            // The sender lives in `self`, so the channel cannot close while borrowed.
            Err(_) => self.snapshot(),
        };
        session
    }

    /// Where navigation should go once recovery has completed.
    pub async fn resolve_destination(&self) -> Destination {
        destination(&self.wait_initialized().await)
    }

    // ── Operations ──────────────────────────────────────────────

    /// Restore the session from the secure store. Runs once per process; later
    /// calls return the current state untouched.
    pub async fn recover(&self) -> Session {
        let _guard = self.ops.lock().await;
        if self.is_initialized() {
            tracing::debug!("session already recovered");
            return self.snapshot();
        }

        match self.store.get(&self.credential_key).await {
            Ok(Some(raw)) => {
                self.process_credential(&raw).await;
            }
            Ok(None) => tracing::debug!("no stored credential"),
            Err(StoreError::Corrupt(reason)) => {
                tracing::warn!(%reason, "stored credential unreadable, clearing it");
                self.clear_credential().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "could not read secure store, starting signed out");
            }
        }

        self.state.send_modify(|s| s.initialized = true);
        let session = self.snapshot();
        tracing::info!(phase = ?session.phase(), "session recovery complete");
        session
    }

    /// Exchange credentials for a session. Rejections come back as data.
    pub async fn login(&self, email: &str, password: &str) -> AuthResult<String> {
        let _guard = self.ops.lock().await;

        let raw = match self.auth.login(email, password).await {
            Ok(AuthReply::Accepted(raw)) => raw,
            Ok(AuthReply::Rejected(msg)) => {
                tracing::info!(%msg, "login rejected");
                return AuthResult::failed(msg);
            }
            Err(e) => {
                tracing::warn!(error = %e, "login request failed");
                return AuthResult::failed(e.to_string());
            }
        };

        let Some(token) = self.process_credential(&raw).await else {
            return AuthResult::failed("the server issued an unreadable credential");
        };

        if let Err(e) = self.store.set(&self.credential_key, &token).await {
            tracing::warn!(error = %e, "could not persist credential; session lasts until exit");
        }
        AuthResult::ok(token)
    }

    /// Create an account. The session is left as it is.
    pub async fn register(
        &self,
        email: &str,
        password: &str,
        name: Option<&str>,
    ) -> AuthResult<UserProfile> {
        match self.auth.register(email, password, name).await {
            Ok(AuthReply::Accepted(user)) => {
                tracing::info!(user_id = user.id, "account registered");
                AuthResult::ok(user)
            }
            Ok(AuthReply::Rejected(msg)) => AuthResult::failed(msg),
            Err(e) => {
                tracing::warn!(error = %e, "registration request failed");
                AuthResult::failed(e.to_string())
            }
        }
    }

    /// End the session and forget the persisted credential. Idempotent.
    pub async fn logout(&self) {
        let _guard = self.ops.lock().await;
        self.clear_credential().await;
        tracing::info!("signed out");
    }

    // ── Internals ───────────────────────────────────────────────

    /// Decode `raw` and adopt it, returning the token as adopted (surrounding
    /// whitespace stripped). A credential that does not decode clears the
    /// whole session instead.
    async fn process_credential(&self, raw: &str) -> Option<String> {
        let token = raw.trim();
        match self.decoder.decode(token) {
            Ok(identity) => {
                let credential = Credential {
                    token: token.to_string(),
                    user_id: identity.user_id,
                };
                self.state.send_modify(|s| s.credential = Some(credential));
                tracing::info!(user_id = identity.user_id, "session established");
                Some(token.to_string())
            }
            Err(e) => {
                tracing::error!(error = %e, "error decoding credential, signing out");
                self.clear_credential().await;
                None
            }
        }
    }

    async fn clear_credential(&self) {
        if let Err(e) = self.store.delete(&self.credential_key).await {
            tracing::warn!(error = %e, "could not remove persisted credential");
        }
        self.state.send_if_modified(|s| s.credential.take().is_some());
    }
}

impl CredentialProvider for SessionManager {
    fn current_token(&self) -> Option<String> {
        self.token()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::token::test_tokens::for_user;
    use crate::auth::token::JwtDecoder;
    use crate::security::MemorySecureStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const KEY: &str = "jwt-key";

    /// Scripted auth backend.
    #[derive(Default)]
    struct FakeAuth {
        login_reply: parking_lot::Mutex<Option<AuthReply<String>>>,
        logins: AtomicUsize,
    }

    impl FakeAuth {
        fn accepting(token: String) -> Arc<Self> {
            let fake = Self::default();
            *fake.login_reply.lock() = Some(AuthReply::Accepted(token));
            Arc::new(fake)
        }

        fn rejecting(msg: &str) -> Arc<Self> {
            let fake = Self::default();
            *fake.login_reply.lock() = Some(AuthReply::Rejected(msg.to_string()));
            Arc::new(fake)
        }
    }

    #[async_trait]
    impl AuthService for FakeAuth {
        async fn login(&self, _: &str, _: &str) -> Result<AuthReply<String>, crate::api::ApiError> {
            self.logins.fetch_add(1, Ordering::SeqCst);
            Ok(self
                .login_reply
                .lock()
                .clone()
                .unwrap_or_else(|| AuthReply::Rejected("no reply scripted".into())))
        }

        async fn register(
            &self,
            email: &str,
            _: &str,
            name: Option<&str>,
        ) -> Result<AuthReply<UserProfile>, crate::api::ApiError> {
            if email.is_empty() {
                return Ok(AuthReply::Rejected("email required".into()));
            }
            Ok(AuthReply::Accepted(UserProfile {
                id: 11,
                email: email.to_string(),
                name: name.map(str::to_owned),
                avatar: None,
            }))
        }
    }

    /// Store whose reads always fail with an I/O error.
    struct BrokenStore {
        deletes: AtomicUsize,
    }

    #[async_trait]
    impl SecureStore for BrokenStore {
        async fn get(&self, _: &str) -> Result<Option<String>, StoreError> {
            Err(StoreError::Io(std::io::Error::other("keychain locked")))
        }
        async fn set(&self, _: &str, _: &str) -> Result<(), StoreError> {
            Err(StoreError::Io(std::io::Error::other("keychain locked")))
        }
        async fn delete(&self, _: &str) -> Result<(), StoreError> {
            self.deletes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    /// Store whose single entry is corrupt.
    struct CorruptStore {
        cleared: AtomicUsize,
    }

    #[async_trait]
    impl SecureStore for CorruptStore {
        async fn get(&self, _: &str) -> Result<Option<String>, StoreError> {
            Err(StoreError::Corrupt("decryption failed".into()))
        }
        async fn set(&self, _: &str, _: &str) -> Result<(), StoreError> {
            Ok(())
        }
        async fn delete(&self, _: &str) -> Result<(), StoreError> {
            self.cleared.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn manager(auth: Arc<dyn AuthService>, store: Arc<dyn SecureStore>) -> SessionManager {
        SessionManager::new(auth, store, Arc::new(JwtDecoder::new()), KEY)
    }

    #[tokio::test]
    async fn starts_uninitialized() {
        let session = manager(Arc::new(FakeAuth::default()), Arc::new(MemorySecureStore::new()));
        let snapshot = session.snapshot();
        assert!(!snapshot.is_initialized());
        assert_eq!(snapshot.phase(), SessionPhase::Uninitialized);
        assert_eq!(session.token(), None);
        assert_eq!(session.user_id(), None);
    }

    #[tokio::test]
    async fn fresh_install_recovers_anonymous() {
        let session = manager(Arc::new(FakeAuth::default()), Arc::new(MemorySecureStore::new()));
        let recovered = session.recover().await;
        assert!(recovered.is_initialized());
        assert_eq!(recovered.token(), None);
        assert_eq!(recovered.phase(), SessionPhase::Anonymous);
    }

    #[tokio::test]
    async fn returning_user_recovers_stored_credential() {
        let store = Arc::new(MemorySecureStore::new());
        let token = for_user(42);
        store.set(KEY, &token).await.unwrap();

        let session = manager(Arc::new(FakeAuth::default()), store);
        session.recover().await;

        assert_eq!(session.token().as_deref(), Some(token.as_str()));
        assert_eq!(session.user_id(), Some(42));
        assert_eq!(session.snapshot().phase(), SessionPhase::Authenticated);
        assert_eq!(session.current_token(), Some(token));
    }

    #[tokio::test]
    async fn corrupted_credential_is_cleared_on_recover() {
        let store = Arc::new(MemorySecureStore::new());
        store.set(KEY, "definitely not a jwt").await.unwrap();

        let session = manager(Arc::new(FakeAuth::default()), store.clone());
        let recovered = session.recover().await;

        assert!(recovered.is_initialized());
        assert_eq!(recovered.token(), None);
        assert_eq!(recovered.user_id(), None);
        assert_eq!(store.get(KEY).await.unwrap(), None);
    }

    #[tokio::test]
    async fn undecryptable_entry_is_cleared_on_recover() {
        let store = Arc::new(CorruptStore {
            cleared: AtomicUsize::new(0),
        });
        let session = manager(Arc::new(FakeAuth::default()), store.clone());
        let recovered = session.recover().await;

        assert_eq!(recovered.phase(), SessionPhase::Anonymous);
        assert_eq!(store.cleared.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn store_io_error_starts_anonymous_without_deleting() {
        let store = Arc::new(BrokenStore {
            deletes: AtomicUsize::new(0),
        });
        let session = manager(Arc::new(FakeAuth::default()), store.clone());
        let recovered = session.recover().await;

        assert_eq!(recovered.phase(), SessionPhase::Anonymous);
        assert_eq!(store.deletes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn recover_runs_only_once() {
        let store = Arc::new(MemorySecureStore::new());
        let session = manager(Arc::new(FakeAuth::default()), store.clone());
        session.recover().await;

        // A credential appearing later must not be picked up by a second recover.
        store.set(KEY, &for_user(5)).await.unwrap();
        let again = session.recover().await;
        assert!(again.is_initialized());
        assert_eq!(again.token(), None);
    }

    #[tokio::test]
    async fn initialized_never_reverts() {
        let token = for_user(7);
        let session = manager(FakeAuth::accepting(token), Arc::new(MemorySecureStore::new()));
        session.recover().await;
        session.login("a@a.com", "123456").await;
        session.logout().await;
        session.logout().await;
        assert!(session.is_initialized());
    }

    #[tokio::test]
    async fn login_success_sets_session_and_persists() {
        let token = for_user(7);
        let store = Arc::new(MemorySecureStore::new());
        let session = manager(FakeAuth::accepting(token.clone()), store.clone());
        session.recover().await;

        let result = session.login("a@a.com", "123456").await;
        assert!(!result.is_error());
        assert_eq!(result.data.as_deref(), Some(token.as_str()));
        assert_eq!(session.token().as_deref(), Some(token.as_str()));
        assert_eq!(session.user_id(), Some(7));
        assert_eq!(store.get(KEY).await.unwrap(), session.token());
    }

    #[tokio::test]
    async fn login_failure_leaves_session_unchanged() {
        let store = Arc::new(MemorySecureStore::new());
        let session = manager(FakeAuth::rejecting("invalid credentials"), store.clone());
        session.recover().await;
        let before = session.snapshot();

        let result = session.login("a@a.com", "wrong").await;
        assert!(result.is_error());
        assert_eq!(result.msg.as_deref(), Some("invalid credentials"));
        assert_eq!(session.snapshot(), before);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn login_with_undecodable_credential_is_rejected() {
        let store = Arc::new(MemorySecureStore::new());
        let session = manager(FakeAuth::accepting("garbage".into()), store.clone());
        session.recover().await;

        let result = session.login("a@a.com", "123456").await;
        assert!(result.is_error());
        assert_eq!(session.snapshot().phase(), SessionPhase::Anonymous);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn bad_credential_during_login_signs_out_previous_session() {
        let store = Arc::new(MemorySecureStore::new());
        store.set(KEY, &for_user(1)).await.unwrap();
        let session = manager(FakeAuth::accepting("garbage".into()), store.clone());
        session.recover().await;
        assert_eq!(session.user_id(), Some(1));

        session.login("a@a.com", "123456").await;
        assert_eq!(session.token(), None);
        assert_eq!(session.user_id(), None);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn login_survives_store_write_failure() {
        let store = Arc::new(BrokenStore {
            deletes: AtomicUsize::new(0),
        });
        let session = manager(FakeAuth::accepting(for_user(3)), store);
        session.recover().await;

        let result = session.login("a@a.com", "123456").await;
        assert!(!result.is_error());
        assert_eq!(session.user_id(), Some(3));
    }

    #[tokio::test]
    async fn padded_credential_is_adopted_trimmed() {
        let token = for_user(7);
        let store = Arc::new(MemorySecureStore::new());
        let session = manager(FakeAuth::accepting(format!("{token}\n")), store.clone());
        session.recover().await;

        let result = session.login("a@a.com", "123456").await;
        assert_eq!(result.data.as_deref(), Some(token.as_str()));
        assert_eq!(session.current_token().as_deref(), Some(token.as_str()));
        assert_eq!(store.get(KEY).await.unwrap().as_deref(), Some(token.as_str()));
    }

    #[tokio::test]
    async fn padded_stored_credential_recovers_trimmed() {
        let token = for_user(12);
        let store = Arc::new(MemorySecureStore::new());
        store.set(KEY, &format!("  {token}\r\n")).await.unwrap();

        let session = manager(Arc::new(FakeAuth::default()), store);
        session.recover().await;
        assert_eq!(session.token().as_deref(), Some(token.as_str()));
        assert_eq!(session.user_id(), Some(12));
    }

    #[tokio::test]
    async fn fractional_expiry_does_not_discard_stored_credential() {
        let token = crate::auth::token::test_tokens::issue(
            serde_json::json!({ "id": 42, "exp": 4_102_444_800.5 }),
        );
        let store = Arc::new(MemorySecureStore::new());
        store.set(KEY, &token).await.unwrap();

        let session = manager(Arc::new(FakeAuth::default()), store.clone());
        session.recover().await;
        assert_eq!(session.user_id(), Some(42));
        assert_eq!(store.get(KEY).await.unwrap(), Some(token));
    }

    #[tokio::test]
    async fn login_then_logout_clears_everything() {
        let store = Arc::new(MemorySecureStore::new());
        let session = manager(FakeAuth::accepting(for_user(7)), store.clone());
        session.recover().await;
        session.login("a@a.com", "123456").await;
        assert!(session.current_token().is_some());

        session.logout().await;
        assert_eq!(session.token(), None);
        assert_eq!(session.user_id(), None);
        assert!(store.is_empty());
        assert_eq!(session.current_token(), None);
    }

    #[tokio::test]
    async fn logout_is_idempotent() {
        let store = Arc::new(MemorySecureStore::new());
        let session = manager(FakeAuth::accepting(for_user(7)), store.clone());
        session.recover().await;
        session.login("a@a.com", "123456").await;

        session.logout().await;
        let once = session.snapshot();
        session.logout().await;
        assert_eq!(session.snapshot(), once);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn register_does_not_sign_in() {
        let session = manager(Arc::new(FakeAuth::default()), Arc::new(MemorySecureStore::new()));
        session.recover().await;

        let result = session.register("new@a.com", "pw", Some("Cloud")).await;
        assert!(!result.is_error());
        assert_eq!(result.data.unwrap().name.as_deref(), Some("Cloud"));
        assert_eq!(session.snapshot().phase(), SessionPhase::Anonymous);

        let rejected = session.register("", "pw", None).await;
        assert_eq!(rejected.msg.as_deref(), Some("email required"));
    }

    #[tokio::test]
    async fn subscribers_see_changes() {
        let session = manager(FakeAuth::accepting(for_user(8)), Arc::new(MemorySecureStore::new()));
        let mut rx = session.subscribe();

        session.recover().await;
        assert!(rx.has_changed().unwrap());
        assert!(rx.borrow_and_update().is_initialized());

        session.login("a@a.com", "123456").await;
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().user_id(), Some(8));
    }

    #[tokio::test]
    async fn wait_initialized_resolves_after_recover() {
        let store = Arc::new(MemorySecureStore::new());
        store.set(KEY, &for_user(42)).await.unwrap();
        let session = Arc::new(manager(Arc::new(FakeAuth::default()), store));

        let waiter = {
            let session = session.clone();
            tokio::spawn(async move { session.resolve_destination().await })
        };
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        session.recover().await;
        assert_eq!(waiter.await.unwrap(), Destination::App);
    }

    #[tokio::test]
    async fn login_waits_for_inflight_recovery() {
        let store = Arc::new(MemorySecureStore::new());
        let auth = FakeAuth::accepting(for_user(2));
        let session = Arc::new(manager(auth.clone(), store));

        let guard = session.ops.lock().await;
        let login = {
            let session = session.clone();
            tokio::spawn(async move { session.login("a@a.com", "123456").await })
        };
        tokio::task::yield_now().await;
        assert_eq!(auth.logins.load(Ordering::SeqCst), 0);
        drop(guard);

        assert!(!login.await.unwrap().is_error());
        assert_eq!(auth.logins.load(Ordering::SeqCst), 1);
    }
}
