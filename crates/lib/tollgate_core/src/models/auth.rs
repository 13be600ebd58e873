//! Authentication domain models.
//!
//! These are internal domain models, distinct from the API request/response
//! shapes in `tollgate_api::models`.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Domain user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    pub name: Option<String>,
}

/// Result of creating a user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedUser {
    pub id: String,
    /// True for exactly one user: the first ever created in the store.
    pub is_first: bool,
}

/// User with password hash (for internal auth flows).
#[derive(Debug, Clone)]
pub struct UserWithPassword {
    pub user: User,
    pub password_hash: Option<String>,
}

/// The identity a token pair is issued for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    /// String form of the user's UUID.
    pub subject_id: String,
    pub email: String,
    pub roles: BTreeSet<String>,
}

impl Principal {
    pub fn new<I, S>(subject_id: impl Into<String>, email: impl Into<String>, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            subject_id: subject_id.into(),
            email: email.into(),
            roles: roles.into_iter().map(Into::into).collect(),
        }
    }
}

/// JWT claims embedded in access tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Subject: user ID (standard JWT `sub` claim).
    pub sub: String,
    /// User email.
    pub email: String,
    /// Role names held at issuance time.
    pub roles: BTreeSet<String>,
    /// Expiry (unix timestamp).
    pub exp: i64,
    /// Set at issuance when `roles` contains the superadmin role.
    pub is_superuser: bool,
}

impl TokenClaims {
    /// The principal these claims were issued for.
    pub fn principal(&self) -> Principal {
        Principal {
            subject_id: self.sub.clone(),
            email: self.email.clone(),
            roles: self.roles.clone(),
        }
    }
}

/// JWT claims embedded in refresh tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshClaims {
    pub sub: String,
    pub email: String,
    /// Expiry (unix timestamp).
    pub exp: i64,
    /// Random nonce; makes every refresh token unique.
    pub jti: String,
}

/// Refresh token record stored per user. At most one exists for any user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshTokenRecord {
    pub user_id: String,
    /// SHA-256 of the serialized token. The raw token is never stored.
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// A freshly issued access/refresh pair.
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}
