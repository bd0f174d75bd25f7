//! Session module: authentication state and its lifecycle.
//!
//! This module provides:
//! - `SessionStore`: login, logout, and profile rehydration, with the
//!   session mirrored to durable storage
//! - `Session`, `UserProfile`, `TokenPair`, `Credentials`: the data it holds
//!
//! The authenticated flag and both tokens are always set or cleared together.

pub mod models;
pub mod store;

pub use models::{Credentials, Session, TokenPair, UserProfile, ADMIN_ROLES};
pub use store::SessionStore;
