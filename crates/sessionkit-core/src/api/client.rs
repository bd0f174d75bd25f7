//! Authenticated API client.
//!
//! Every call runs through the same pipeline: the stored access token is
//! attached, the request is dispatched, and a 401 on an eligible request is
//! recovered by exchanging the refresh token and replaying the request once.
//! When the refresh itself fails the session is torn down and the login
//! redirect fires.

use std::sync::{Arc, PoisonError, RwLock};

use serde::{de::DeserializeOwned, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::session::models::{RefreshRequest, RefreshResponse};
use crate::session::SessionStore;
use crate::storage::ACCESS_TOKEN_KEY;

use super::{
    ApiError, ApiRequest, ApiResponse, LogRedirect, LoginRedirect, PendingRequest, Transport,
    DEFAULT_LOGIN_PATH, TOKEN_REFRESH_PATH,
};

/// Whether a failed request may be recovered with a token refresh.
///
/// Only a 401 on a request that has not been retried yet and that does not
/// target the token endpoints qualifies.
pub fn is_refresh_eligible(pending: &PendingRequest, error: &ApiError) -> bool {
    error.is_unauthorized() && !pending.retried && !pending.request.targets_token_endpoint()
}

/// API client that attaches the session's bearer token and refreshes it on expiry.
/// Clone is cheap and all clones share the default header and refresh gate.
#[derive(Clone)]
pub struct AuthClient {
    inner: Arc<Inner>,
}

struct Inner {
    transport: Arc<dyn Transport>,
    session: SessionStore,
    redirect: Arc<dyn LoginRedirect>,
    login_path: String,
    /// Last refreshed token, kept for inspection only
    default_bearer: RwLock<Option<String>>,
    /// Serializes refresh calls so concurrent 401s share one refresh
    refresh_gate: Mutex<()>,
}

pub struct AuthClientBuilder {
    transport: Arc<dyn Transport>,
    session: SessionStore,
    redirect: Arc<dyn LoginRedirect>,
    login_path: String,
}

impl AuthClientBuilder {
    pub fn redirect(mut self, redirect: Arc<dyn LoginRedirect>) -> Self {
        self.redirect = redirect;
        self
    }

    pub fn login_path(mut self, path: impl Into<String>) -> Self {
        self.login_path = path.into();
        self
    }

    pub fn build(self) -> AuthClient {
        AuthClient {
            inner: Arc::new(Inner {
                transport: self.transport,
                session: self.session,
                redirect: self.redirect,
                login_path: self.login_path,
                default_bearer: RwLock::new(None),
                refresh_gate: Mutex::new(()),
            }),
        }
    }
}

impl AuthClient {
    /// Create a client with the default login path and a logging redirect
    pub fn new(transport: Arc<dyn Transport>, session: SessionStore) -> Self {
        Self::builder(transport, session).build()
    }

    pub fn builder(transport: Arc<dyn Transport>, session: SessionStore) -> AuthClientBuilder {
        AuthClientBuilder {
            transport,
            session,
            redirect: Arc::new(LogRedirect),
            login_path: DEFAULT_LOGIN_PATH.to_string(),
        }
    }

    pub fn session(&self) -> &SessionStore {
        &self.inner.session
    }

    /// Bearer token most recently issued by a refresh, if any.
    ///
    /// This only records the last refresh result and is cleared on teardown.
    /// Requests never read it: `attach_auth` always takes the token from
    /// storage, so a logout done directly on the `SessionStore` cannot leave
    /// a stale header behind.
    pub fn default_bearer(&self) -> Option<String> {
        self.inner
            .default_bearer
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_default_bearer(&self, token: Option<String>) {
        *self
            .inner
            .default_bearer
            .write()
            .unwrap_or_else(PoisonError::into_inner) = token;
    }

    /// Send a request through the auth pipeline.
    ///
    /// The request is dispatched at most twice: once as given and once more
    /// after a successful refresh.
    pub async fn send(&self, request: ApiRequest) -> Result<ApiResponse, ApiError> {
        let mut pending = PendingRequest::new(self.attach_auth(request)?);

        loop {
            match self.dispatch(&pending.request).await {
                Ok(response) => return Ok(response),
                Err(e) if is_refresh_eligible(&pending, &e) => {
                    pending.retried = true;
                    debug!(path = %pending.request.path, "Access token rejected, refreshing");
                    let access = self.recover(pending.request.bearer.as_deref()).await?;
                    pending.request.bearer = Some(access);
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Attach the stored access token, if any
    fn attach_auth(&self, mut request: ApiRequest) -> Result<ApiRequest, ApiError> {
        if let Some(token) = self.inner.session.storage().access_token()? {
            request.bearer = Some(token);
        }
        Ok(request)
    }

    async fn dispatch(&self, request: &ApiRequest) -> Result<ApiResponse, ApiError> {
        self.inner.transport.send(request).await?.error_for_status()
    }

    /// Obtain a fresh access token, ending the session if that is impossible
    async fn recover(&self, stale: Option<&str>) -> Result<String, ApiError> {
        match self.refresh_access_token(stale).await {
            Ok(access) => Ok(access),
            Err(e) => {
                warn!(error = %e, "Token refresh failed, ending session");
                self.inner.session.logout();
                self.set_default_bearer(None);
                self.inner.redirect.redirect_to_login(&self.inner.login_path);
                Err(ApiError::RefreshFailed(Box::new(e)))
            }
        }
    }

    async fn refresh_access_token(&self, stale: Option<&str>) -> Result<String, ApiError> {
        let _gate = self.inner.refresh_gate.lock().await;
        let storage = self.inner.session.storage();

        // Another request refreshed while this one waited on the gate
        if let Some(current) = storage.access_token()? {
            if stale != Some(current.as_str()) {
                debug!("Reusing access token from concurrent refresh");
                return Ok(current);
            }
        }

        let refresh = storage.refresh_token()?.ok_or(ApiError::NotAuthenticated)?;
        let request = ApiRequest::post(TOKEN_REFRESH_PATH).json(&RefreshRequest { refresh: &refresh })?;
        let refreshed: RefreshResponse = self
            .inner
            .transport
            .send(&request)
            .await?
            .error_for_status()?
            .json()?;
        if refreshed.access.is_empty() {
            return Err(ApiError::InvalidResponse(
                "Refresh endpoint returned an empty token".to_string(),
            ));
        }

        storage.set(ACCESS_TOKEN_KEY, &refreshed.access)?;
        self.set_default_bearer(Some(refreshed.access.clone()));
        info!("Access token refreshed");
        Ok(refreshed.access)
    }

    // ===== Typed helpers =====

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.send(ApiRequest::get(path)).await?.json()
    }

    pub async fn post_json<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        self.send(ApiRequest::post(path).json(body)?).await?.json()
    }

    pub async fn put_json<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        self.send(ApiRequest::put(path).json(body)?).await?.json()
    }

    pub async fn patch_json<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        self.send(ApiRequest::patch(path).json(body)?).await?.json()
    }

    pub async fn delete(&self, path: &str) -> Result<ApiResponse, ApiError> {
        self.send(ApiRequest::delete(path)).await
    }
}
