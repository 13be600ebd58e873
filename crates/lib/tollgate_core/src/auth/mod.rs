//! Authentication and authorization logic.
//!
//! Token issuance, verification, rotation and revocation live in [`tokens`];
//! role→permission resolution lives in [`access`]. Both are storage-agnostic
//! and talk to persistence only through the traits in [`crate::store`].

pub mod access;
pub mod config;
pub mod jwt;
pub mod password;
pub mod tokens;

use thiserror::Error;

/// Role name that bypasses permission checks.
pub const SUPERADMIN_ROLE: &str = "superadmin";

/// Authentication errors.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Token has expired")]
    TokenExpired,

    #[error("Token has been revoked")]
    TokenRevoked,

    #[error("Invalid refresh token")]
    InvalidRefreshToken,

    #[error("Permission denied")]
    PermissionDenied,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Db(#[from] sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}
