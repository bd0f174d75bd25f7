//! REST API client module.
//!
//! This module provides the `AuthClient` for making authenticated calls
//! against the remote API, plus the pieces it is composed of:
//! - `Transport`: sends a request and returns the raw response
//! - `ApiRequest` / `ApiResponse`: the request and response values
//! - `LoginRedirect`: hook fired when the session cannot be recovered
//!
//! The API uses JWT bearer tokens issued by `/token/` and renewed by
//! `/token/refresh/`.

pub mod client;
pub mod error;
pub mod redirect;
pub mod request;
pub mod transport;

pub use client::{is_refresh_eligible, AuthClient, AuthClientBuilder};
pub use error::ApiError;
pub use redirect::{LogRedirect, LoginRedirect, DEFAULT_LOGIN_PATH};
pub use request::{
    ApiRequest, ApiResponse, PendingRequest, PROFILE_PATH, TOKEN_PATH, TOKEN_REFRESH_PATH,
};
pub use transport::{HttpTransport, Transport, DEFAULT_REQUEST_TIMEOUT_SECS};
