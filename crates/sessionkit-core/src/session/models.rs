use serde::{Deserialize, Serialize};

/// Roles granted administrator access
pub const ADMIN_ROLES: [&str; 2] = ["SUPER_ADMIN", "COMPANY_ADMIN"];

/// Username/password pair for the token endpoint.
///
/// `SessionStore::login` accepts any serializable credentials; this is the
/// common shape.
#[derive(Clone, Serialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Token pair issued by the token endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct RefreshRequest<'a> {
    pub refresh: &'a str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RefreshResponse {
    pub access: String,
}

/// User profile as returned by the profile endpoint.
///
/// Only `role` is interpreted; every other field is kept verbatim so the
/// record round-trips through storage unchanged.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(flatten)]
    pub fields: serde_json::Map<String, serde_json::Value>,
}

impl UserProfile {
    pub fn is_admin(&self) -> bool {
        self.role
            .as_deref()
            .map(|role| ADMIN_ROLES.contains(&role))
            .unwrap_or(false)
    }

    /// Look up an arbitrary profile field
    pub fn field(&self, name: &str) -> Option<&serde_json::Value> {
        self.fields.get(name)
    }
}

/// In-memory authentication state
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Session {
    pub is_authenticated: bool,
    pub user: Option<UserProfile>,
}
