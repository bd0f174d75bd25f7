use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::Context;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::api::{ApiError, ApiRequest, ApiResponse, Transport, PROFILE_PATH, TOKEN_PATH};
use crate::storage::{Storage, ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY, USER_KEY};

use super::{Session, TokenPair, UserProfile};

/// Owner of the authentication state and its durable mirror.
///
/// Clone is cheap and every clone sees the same session. The store talks to
/// the API through the raw transport, never through the refreshing client.
#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<Inner>,
}

struct Inner {
    storage: Arc<dyn Storage>,
    transport: Arc<dyn Transport>,
    state: RwLock<Session>,
}

impl SessionStore {
    /// Create a store, restoring any session persisted by a previous run.
    ///
    /// A session is restored only when both tokens are present. Anything
    /// less is treated as no session and the leftovers are cleared.
    pub fn restore(storage: Arc<dyn Storage>, transport: Arc<dyn Transport>) -> Self {
        let state = match Self::load_state(storage.as_ref()) {
            Ok(state) => state,
            Err(e) => {
                warn!(error = %e, "Failed to read stored session");
                Session::default()
            }
        };
        debug!(
            authenticated = state.is_authenticated,
            has_user = state.user.is_some(),
            "Session restored"
        );

        let store = Self {
            inner: Arc::new(Inner {
                storage,
                transport,
                state: RwLock::new(Session::default()),
            }),
        };
        if state.is_authenticated {
            *store.write_state() = state;
        } else {
            store.clear_storage();
        }
        store
    }

    fn load_state(storage: &dyn Storage) -> anyhow::Result<Session> {
        let access = storage.access_token()?;
        let refresh = storage.refresh_token()?;
        if access.is_none() || refresh.is_none() {
            return Ok(Session::default());
        }

        let user = match storage.get(USER_KEY)? {
            Some(raw) => match serde_json::from_str::<UserProfile>(&raw) {
                Ok(user) => Some(user),
                Err(e) => {
                    warn!(error = %e, "Ignoring unparseable stored user profile");
                    None
                }
            },
            None => None,
        };

        Ok(Session {
            is_authenticated: true,
            user,
        })
    }

    // ===== Actions =====

    /// Exchange credentials for tokens, fetch the profile, then commit both.
    ///
    /// On any failure the session is cleared and the error returned.
    pub async fn login<C: Serialize + ?Sized>(&self, credentials: &C) -> Result<UserProfile, ApiError> {
        let result = match self.authenticate(credentials).await {
            Ok((user, tokens)) => self.commit(&user, &tokens).map(|()| user),
            Err(e) => Err(e),
        };

        match result {
            Ok(user) => {
                info!(role = ?user.role, "Logged in");
                Ok(user)
            }
            Err(e) => {
                warn!(error = %e, "Login failed");
                self.clear();
                Err(e)
            }
        }
    }

    async fn authenticate<C: Serialize + ?Sized>(
        &self,
        credentials: &C,
    ) -> Result<(UserProfile, TokenPair), ApiError> {
        let request = ApiRequest::post(TOKEN_PATH).json(credentials)?;
        let tokens: TokenPair = self.send_raw(&request).await?.json()?;
        if tokens.access.is_empty() || tokens.refresh.is_empty() {
            return Err(ApiError::InvalidResponse(
                "Token endpoint returned an empty token".to_string(),
            ));
        }

        let user = self.fetch_profile(&tokens.access).await?;
        Ok((user, tokens))
    }

    /// Clear the session and its stored tokens. Never fails.
    pub fn logout(&self) {
        self.clear();
        info!("Logged out");
    }

    /// Refresh the user record using the stored access token.
    ///
    /// Returns `None` without a network call when there is no token. A
    /// rejected token clears the whole session. No refresh is attempted.
    pub async fn fetch_current_user(&self) -> Option<UserProfile> {
        let access = match self.inner.storage.access_token() {
            Ok(Some(token)) => token,
            Ok(None) => return None,
            Err(e) => {
                warn!(error = %e, "Failed to read access token");
                return None;
            }
        };

        match self.fetch_profile(&access).await {
            Ok(user) => {
                self.set_user(&user);
                Some(user)
            }
            Err(e) => {
                warn!(error = %e, "Profile fetch failed, clearing session");
                self.clear();
                None
            }
        }
    }

    // ===== Projections =====

    pub fn is_authenticated(&self) -> bool {
        self.read_state().is_authenticated
    }

    pub fn user(&self) -> Option<UserProfile> {
        self.read_state().user.clone()
    }

    /// True when the current user holds one of the administrator roles
    pub fn is_admin(&self) -> bool {
        self.read_state()
            .user
            .as_ref()
            .map(UserProfile::is_admin)
            .unwrap_or(false)
    }

    pub fn snapshot(&self) -> Session {
        self.read_state().clone()
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.inner.storage
    }

    // ===== State mutations =====

    fn commit(&self, user: &UserProfile, tokens: &TokenPair) -> Result<(), ApiError> {
        let user_json = serde_json::to_string(user).context("Failed to serialize user profile")?;

        let mut state = self.write_state();
        let storage = &self.inner.storage;
        storage.set(ACCESS_TOKEN_KEY, &tokens.access)?;
        storage.set(REFRESH_TOKEN_KEY, &tokens.refresh)?;
        storage.set(USER_KEY, &user_json)?;

        *state = Session {
            is_authenticated: true,
            user: Some(user.clone()),
        };
        Ok(())
    }

    fn set_user(&self, user: &UserProfile) {
        let mut state = self.write_state();
        match serde_json::to_string(user) {
            Ok(json) => {
                if let Err(e) = self.inner.storage.set(USER_KEY, &json) {
                    warn!(error = %e, "Failed to persist user profile");
                }
            }
            Err(e) => warn!(error = %e, "Failed to serialize user profile"),
        }
        state.user = Some(user.clone());
    }

    fn clear(&self) {
        let mut state = self.write_state();
        *state = Session::default();
        self.clear_storage();
    }

    fn clear_storage(&self) {
        if let Err(e) = self.inner.storage.clear_session() {
            warn!(error = %e, "Failed to clear stored session");
        }
    }

    // ===== Transport helpers =====

    async fn fetch_profile(&self, access: &str) -> Result<UserProfile, ApiError> {
        let request = ApiRequest::get(PROFILE_PATH).bearer(access);
        self.send_raw(&request).await?.json()
    }

    async fn send_raw(&self, request: &ApiRequest) -> Result<ApiResponse, ApiError> {
        self.inner.transport.send(request).await?.error_for_status()
    }

    fn read_state(&self) -> RwLockReadGuard<'_, Session> {
        self.inner.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, Session> {
        self.inner.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Credentials;
    use crate::storage::{FileStorage, MemoryStorage, SESSION_KEYS};
    use crate::test_support::{FakeTransport, Reply};
    use reqwest::StatusCode;
    use serde_json::json;

    fn store_with(transport: &Arc<FakeTransport>) -> (SessionStore, Arc<MemoryStorage>) {
        let storage = Arc::new(MemoryStorage::new());
        let store = SessionStore::restore(storage.clone(), transport.clone());
        (store, storage)
    }

    fn assert_storage_empty(storage: &MemoryStorage) {
        for key in SESSION_KEYS {
            assert_eq!(storage.get(key).unwrap(), None, "{} should be cleared", key);
        }
    }

    #[tokio::test]
    async fn test_login_commits_user_and_tokens() {
        let transport = Arc::new(FakeTransport::new());
        transport.on(TOKEN_PATH, Reply::json(json!({ "access": "A1", "refresh": "R1" })));
        transport.on(PROFILE_PATH, Reply::json(json!({ "id": "u1", "role": "CUSTOMER" })));
        let (store, storage) = store_with(&transport);

        let user = store
            .login(&json!({ "id": "u1", "pw": "p1" }))
            .await
            .unwrap();

        assert_eq!(user.role.as_deref(), Some("CUSTOMER"));
        assert!(store.is_authenticated());
        assert!(!store.is_admin());
        assert_eq!(store.user(), Some(user));
        assert_eq!(storage.get(ACCESS_TOKEN_KEY).unwrap().as_deref(), Some("A1"));
        assert_eq!(storage.get(REFRESH_TOKEN_KEY).unwrap().as_deref(), Some("R1"));
        let stored_user: serde_json::Value =
            serde_json::from_str(&storage.get(USER_KEY).unwrap().unwrap()).unwrap();
        assert_eq!(stored_user, json!({ "id": "u1", "role": "CUSTOMER" }));

        // Credentials were posted verbatim and the profile fetched with the new token
        let sent = transport.requests();
        assert_eq!(sent[0].body, Some(json!({ "id": "u1", "pw": "p1" })));
        assert_eq!(sent[0].bearer, None);
        assert_eq!(sent[1].path, PROFILE_PATH);
        assert_eq!(sent[1].bearer.as_deref(), Some("A1"));
    }

    #[tokio::test]
    async fn test_login_with_bad_credentials_leaves_session_empty() {
        let transport = Arc::new(FakeTransport::new());
        transport.on(TOKEN_PATH, Reply::status(StatusCode::UNAUTHORIZED));
        let (store, storage) = store_with(&transport);

        let err = store.login(&Credentials::new("u1", "wrong")).await.unwrap_err();

        assert!(err.is_unauthorized());
        assert!(!store.is_authenticated());
        assert_eq!(store.user(), None);
        assert_storage_empty(&storage);
        assert_eq!(transport.calls_to(PROFILE_PATH), 0);
    }

    #[tokio::test]
    async fn test_login_profile_failure_does_not_partially_commit() {
        let transport = Arc::new(FakeTransport::new());
        transport.on(TOKEN_PATH, Reply::json(json!({ "access": "A1", "refresh": "R1" })));
        transport.on(PROFILE_PATH, Reply::status(StatusCode::INTERNAL_SERVER_ERROR));
        let (store, storage) = store_with(&transport);

        let err = store.login(&Credentials::new("u1", "p1")).await.unwrap_err();

        assert!(matches!(err, ApiError::ServerError(_)));
        assert!(!store.is_authenticated());
        assert_storage_empty(&storage);
    }

    #[tokio::test]
    async fn test_failed_login_clears_previous_session() {
        let transport = Arc::new(FakeTransport::new());
        transport.on(TOKEN_PATH, Reply::json(json!({ "access": "A1", "refresh": "R1" })));
        transport.on(PROFILE_PATH, Reply::json(json!({ "id": "u1", "role": "SUPER_ADMIN" })));
        let (store, storage) = store_with(&transport);
        store.login(&Credentials::new("u1", "p1")).await.unwrap();
        assert!(store.is_admin());

        transport.on(
            TOKEN_PATH,
            Reply::error(|| ApiError::InvalidResponse("connection reset".to_string())),
        );
        assert!(store.login(&Credentials::new("u2", "p2")).await.is_err());

        assert!(!store.is_authenticated());
        assert!(!store.is_admin());
        assert_storage_empty(&storage);
    }

    #[tokio::test]
    async fn test_logout_always_clears() {
        let transport = Arc::new(FakeTransport::new());
        let (store, storage) = store_with(&transport);

        // Logging out with nothing stored is fine
        store.logout();
        assert!(!store.is_authenticated());

        transport.on(TOKEN_PATH, Reply::json(json!({ "access": "A1", "refresh": "R1" })));
        transport.on(PROFILE_PATH, Reply::json(json!({ "id": "u1", "role": "CUSTOMER" })));
        store.login(&Credentials::new("u1", "p1")).await.unwrap();

        store.logout();
        assert_eq!(store.snapshot(), Session::default());
        assert_storage_empty(&storage);
    }

    #[tokio::test]
    async fn test_restore_from_storage() {
        let storage = Arc::new(MemoryStorage::new());
        storage.set(ACCESS_TOKEN_KEY, "A1").unwrap();
        storage.set(REFRESH_TOKEN_KEY, "R1").unwrap();
        storage.set(USER_KEY, r#"{"id":"u1","role":"COMPANY_ADMIN"}"#).unwrap();

        let store = SessionStore::restore(storage, Arc::new(FakeTransport::new()));

        assert!(store.is_authenticated());
        assert!(store.is_admin());
        assert_eq!(
            store.user().and_then(|u| u.field("id").cloned()),
            Some(json!("u1"))
        );
    }

    #[tokio::test]
    async fn test_restore_with_partial_storage_clears_it() {
        let storage = Arc::new(MemoryStorage::new());
        storage.set(ACCESS_TOKEN_KEY, "A1").unwrap();
        storage.set(USER_KEY, r#"{"id":"u1"}"#).unwrap();

        let store = SessionStore::restore(storage.clone(), Arc::new(FakeTransport::new()));

        assert!(!store.is_authenticated());
        assert_storage_empty(&storage);
    }

    #[tokio::test]
    async fn test_fetch_current_user_without_token_skips_network() {
        let transport = Arc::new(FakeTransport::new());
        let (store, _storage) = store_with(&transport);

        assert_eq!(store.fetch_current_user().await, None);
        assert!(transport.requests().is_empty());
    }

    #[tokio::test]
    async fn test_fetch_current_user_replaces_only_user() {
        let storage = Arc::new(MemoryStorage::new());
        storage.set(ACCESS_TOKEN_KEY, "A1").unwrap();
        storage.set(REFRESH_TOKEN_KEY, "R1").unwrap();
        let transport = Arc::new(FakeTransport::new());
        transport.on(PROFILE_PATH, Reply::json(json!({ "id": "u1", "role": "CUSTOMER" })));
        let store = SessionStore::restore(storage.clone(), transport.clone());

        let user = store.fetch_current_user().await.unwrap();

        assert_eq!(store.user(), Some(user));
        assert!(storage.get(USER_KEY).unwrap().is_some());
        assert_eq!(storage.get(ACCESS_TOKEN_KEY).unwrap().as_deref(), Some("A1"));
        assert_eq!(transport.requests()[0].bearer.as_deref(), Some("A1"));
    }

    #[tokio::test]
    async fn test_fetch_current_user_with_expired_token_clears_without_refresh() {
        let storage = Arc::new(MemoryStorage::new());
        storage.set(ACCESS_TOKEN_KEY, "A1").unwrap();
        storage.set(REFRESH_TOKEN_KEY, "R1").unwrap();
        let transport = Arc::new(FakeTransport::new());
        transport.on(PROFILE_PATH, Reply::status(StatusCode::UNAUTHORIZED));
        let store = SessionStore::restore(storage.clone(), transport.clone());

        assert_eq!(store.fetch_current_user().await, None);

        assert!(!store.is_authenticated());
        assert_storage_empty(&storage);
        assert_eq!(transport.calls_to(crate::api::TOKEN_REFRESH_PATH), 0);
    }

    #[tokio::test]
    async fn test_corrupt_session_file_is_discarded_on_restore() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(FileStorage::new(dir.path()));
        std::fs::write(storage.path(), "not json").unwrap();
        let transport = Arc::new(FakeTransport::new());
        transport.on(TOKEN_PATH, Reply::json(json!({ "access": "A1", "refresh": "R1" })));
        transport.on(PROFILE_PATH, Reply::json(json!({ "id": "u1", "role": "CUSTOMER" })));

        let store = SessionStore::restore(storage.clone(), transport.clone());
        assert!(!store.is_authenticated());
        assert!(!storage.path().exists());

        store.login(&Credentials::new("u1", "p1")).await.unwrap();

        assert!(store.is_authenticated());
        let reopened = FileStorage::new(dir.path());
        assert_eq!(reopened.access_token().unwrap().as_deref(), Some("A1"));
        assert_eq!(reopened.refresh_token().unwrap().as_deref(), Some("R1"));
    }
}
