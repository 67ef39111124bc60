//! Authentication and authorization for the gateway.
//!
//! This module provides:
//! - User accounts with role-based access control
//! - Password hashing and verification (Argon2id)
//! - JWT session-token issuance and validation
//! - The per-request guard that resolves a bearer token to a live identity

mod config;
mod jwt;
mod middleware;
mod password;
mod service;
mod users;

pub use config::{AuthConfig, AuthConfigBuilder};
pub use jwt::{Claims, JwtManager};
pub use middleware::{AuthState, Identity};
pub use service::{SessionToken, SignupDraft};
pub use users::{PublicUser, Role, User, UserStore};

pub(crate) use users::uuid_v4;

use rolodex_core::ValidationError;
use thiserror::Error;

/// Authentication and authorization errors.
///
/// Every variant is terminal for the current operation; nothing here is
/// retried internally.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Email address is already registered.
    #[error("Email already in use")]
    DuplicateEmail,

    /// Nickname is already taken.
    #[error("Nickname already in use")]
    DuplicateNickname,

    /// Signin failed. Covers both unknown email and wrong password so the
    /// response cannot be used to enumerate accounts.
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// Missing, invalid, or expired token, or the token's subject no
    /// longer exists.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Authenticated but not permitted.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Storage-level uniqueness constraint lost after the pre-check passed.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Input failed validation.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Token could not be issued.
    #[error("Token error: {0}")]
    Token(String),

    /// Storage error.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Configuration error.
    #[error("Config error: {0}")]
    Config(String),
}
