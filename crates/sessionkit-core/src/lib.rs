//! sessionkit core - token storage, session store, and a refreshing API client.
//!
//! The two main types share one storage and one transport:
//!
//! - `SessionStore` logs in, logs out, and rehydrates the current user.
//! - `AuthClient` attaches the stored access token to every request and,
//!   when the token has expired, refreshes it and replays the request once.
//!
//! ```no_run
//! use std::sync::Arc;
//! use sessionkit_core::{AuthClient, Credentials, HttpTransport, MemoryStorage, SessionStore};
//!
//! # async fn run() -> Result<(), sessionkit_core::ApiError> {
//! let transport = Arc::new(HttpTransport::new("http://localhost:8000/api/v1/")?);
//! let session = SessionStore::restore(Arc::new(MemoryStorage::new()), transport.clone());
//! let client = AuthClient::new(transport, session.clone());
//!
//! session.login(&Credentials::new("u1", "p1")).await?;
//! let bookings: serde_json::Value = client.get_json("/bookings/").await?;
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod config;
pub mod session;
pub mod storage;

#[cfg(test)]
mod test_support;

pub use api::{
    ApiError, ApiRequest, ApiResponse, AuthClient, HttpTransport, LogRedirect, LoginRedirect,
    Transport,
};
pub use config::{Config, StorageBackend};
pub use session::{Credentials, Session, SessionStore, UserProfile};
pub use storage::{FileStorage, KeyringStorage, MemoryStorage, Storage};
