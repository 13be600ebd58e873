//! Persistence seams used by the token and access-control services.
//!
//! Every method is an async suspension point. Implementations provide their
//! own atomicity: a single upsert per refresh-token write, a single keyed set
//! per revocation. No in-process locking is layered on top.

pub mod memory;
pub mod postgres;

use std::time::Duration;

use async_trait::async_trait;

use crate::auth::AuthError;
use crate::models::auth::{CreatedUser, RefreshTokenRecord, User, UserWithPassword};
use crate::models::rbac::Role;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// User records and password hashes.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn find_by_email(&self, email: &str) -> Result<Option<UserWithPassword>, AuthError>;

    async fn find_by_id(&self, user_id: &str) -> Result<Option<User>, AuthError>;

    async fn email_exists(&self, email: &str) -> Result<bool, AuthError>;

    /// Create a user. Whether it is the first user is decided atomically
    /// with the insert, so concurrent callers never both see `is_first`.
    ///
    /// A taken email is [`AuthError::Validation`].
    async fn create_user(
        &self,
        email: &str,
        name: Option<&str>,
        password_hash: &str,
    ) -> Result<CreatedUser, AuthError>;
}

/// One refresh-token record per user.
#[async_trait]
pub trait RefreshTokenStore: Send + Sync {
    /// Insert the record, or replace the user's existing one in place.
    async fn upsert(&self, record: &RefreshTokenRecord) -> Result<(), AuthError>;

    async fn find_by_user(&self, user_id: &str) -> Result<Option<RefreshTokenRecord>, AuthError>;

    async fn delete(&self, user_id: &str) -> Result<(), AuthError>;

    /// Delete the user's record only if it still carries `token_hash`.
    /// Returns whether a record was removed.
    async fn delete_matching(&self, user_id: &str, token_hash: &str) -> Result<bool, AuthError>;
}

/// TTL-bounded deny-list.
#[async_trait]
pub trait RevocationCache: Send + Sync {
    /// True while an unexpired entry exists for `key`.
    async fn exists(&self, key: &str) -> Result<bool, AuthError>;

    async fn set(&self, key: &str, ttl: Duration) -> Result<(), AuthError>;
}

/// Roles, permissions and user↔role membership. Read-mostly.
#[async_trait]
pub trait RolePermissionStore: Send + Sync {
    /// Role with its permissions, or `None` for an unknown name.
    async fn find_role_by_name(&self, name: &str) -> Result<Option<Role>, AuthError>;

    /// Known roles among `names`; unknown names are skipped.
    async fn roles_by_names(&self, names: &[String]) -> Result<Vec<Role>, AuthError>;

    async fn roles_for_user(&self, user_id: &str) -> Result<Vec<String>, AuthError>;

    async fn grant_role(&self, user_id: &str, role_name: &str) -> Result<(), AuthError>;
}
