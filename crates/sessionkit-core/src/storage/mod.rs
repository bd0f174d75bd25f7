//! Durable key-value storage for session state.
//!
//! This module provides:
//! - `Storage`: the string key-value contract the session layer persists through
//! - `MemoryStorage`: in-process map, lost on exit
//! - `FileStorage`: a JSON file in the platform cache directory
//! - `KeyringStorage`: one OS keychain entry per key
//!
//! The access token, refresh token, and serialized user profile live under
//! the fixed keys defined here.

pub mod file;
pub mod keychain;
pub mod memory;

use anyhow::Result;

pub use self::file::FileStorage;
pub use self::keychain::KeyringStorage;
pub use self::memory::MemoryStorage;

/// Key holding the current access token
pub const ACCESS_TOKEN_KEY: &str = "accessToken";

/// Key holding the refresh token
pub const REFRESH_TOKEN_KEY: &str = "refreshToken";

/// Key holding the JSON-serialized user profile
pub const USER_KEY: &str = "user";

/// All keys owned by the session, cleared together on logout.
pub const SESSION_KEYS: [&str; 3] = [ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY, USER_KEY];

/// String key-value store that survives process restarts.
pub trait Storage: Send + Sync {
    /// Read a value, `None` if the key is absent
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Write a value, replacing any previous one
    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Remove a key. Removing an absent key is not an error.
    fn remove(&self, key: &str) -> Result<()>;

    /// Remove every session key. Backends that can hold unreadable data
    /// discard it here so a fresh session can be written afterwards.
    fn clear_session(&self) -> Result<()> {
        for key in SESSION_KEYS {
            self.remove(key)?;
        }
        Ok(())
    }

    /// Stored access token, ignoring empty values
    fn access_token(&self) -> Result<Option<String>> {
        Ok(self.get(ACCESS_TOKEN_KEY)?.filter(|t| !t.is_empty()))
    }

    /// Stored refresh token, ignoring empty values
    fn refresh_token(&self) -> Result<Option<String>> {
        Ok(self.get(REFRESH_TOKEN_KEY)?.filter(|t| !t.is_empty()))
    }
}
