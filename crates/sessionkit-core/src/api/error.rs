//! Error type shared by the session store and the authenticated client.

use reqwest::StatusCode;
use thiserror::Error;

/// Longest response excerpt carried in an error message, in characters
const MAX_BODY_EXCERPT: usize = 500;

#[derive(Error, Debug)]
pub enum ApiError {
    // Non-success HTTP statuses
    #[error("Unauthorized - access token missing or expired")]
    Unauthorized,

    #[error("Forbidden: {0}")]
    AccessDenied(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Too many requests - retry later")]
    RateLimited,

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Unexpected response: {0}")]
    InvalidResponse(String),

    // Failures below HTTP
    #[error("Request failed: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("Session storage failed: {0:#}")]
    Storage(#[from] anyhow::Error),

    // Session lifecycle
    #[error("No session to refresh - log in first")]
    NotAuthenticated,

    #[error("Session expired, could not refresh the access token: {0}")]
    RefreshFailed(#[source] Box<ApiError>),
}

/// Shorten a response body for inclusion in an error, cutting on a char boundary
fn excerpt(body: &str) -> String {
    match body.char_indices().nth(MAX_BODY_EXCERPT) {
        Some((cut, _)) => format!("{}... ({} bytes total)", &body[..cut], body.len()),
        None => body.to_string(),
    }
}

impl ApiError {
    /// Map a non-success status and its body onto the matching variant
    pub fn from_status(status: StatusCode, body: &str) -> Self {
        match status {
            StatusCode::UNAUTHORIZED => Self::Unauthorized,
            StatusCode::TOO_MANY_REQUESTS => Self::RateLimited,
            StatusCode::FORBIDDEN => Self::AccessDenied(excerpt(body)),
            StatusCode::NOT_FOUND => Self::NotFound(excerpt(body)),
            s if s.is_server_error() => Self::ServerError(excerpt(body)),
            s => Self::InvalidResponse(format!("{} {}", s, excerpt(body))),
        }
    }

    /// True for an authorization failure (HTTP 401)
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ApiError::Unauthorized)
    }

    /// True when the session was torn down because the refresh token was rejected
    pub fn is_session_expired(&self) -> bool {
        matches!(self, ApiError::RefreshFailed(_))
    }
}
