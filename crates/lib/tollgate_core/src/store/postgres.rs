//! PostgreSQL-backed stores.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::debug;

use super::{CredentialStore, RefreshTokenStore, RevocationCache, RolePermissionStore};
use crate::auth::AuthError;
use crate::models::auth::{CreatedUser, RefreshTokenRecord, User, UserWithPassword};
use crate::models::rbac::{Permission, Role};

/// Implements every store trait over a single connection pool.
#[derive(Clone, Debug)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

type RolePermissionRow = (String, Option<String>, Option<String>, Option<String>);

/// Fold `(role, permission…)` join rows into roles, keeping roles without permissions.
fn group_roles(rows: Vec<RolePermissionRow>) -> Vec<Role> {
    let mut roles: BTreeMap<String, Vec<Permission>> = BTreeMap::new();
    for (role, name, resource, http_method) in rows {
        let permissions = roles.entry(role).or_default();
        if let (Some(name), Some(resource), Some(http_method)) = (name, resource, http_method) {
            permissions.push(Permission {
                name,
                resource,
                http_method,
            });
        }
    }
    roles
        .into_iter()
        .map(|(name, permissions)| Role { name, permissions })
        .collect()
}

const ROLE_PERMISSIONS_SELECT: &str = "SELECT r.name, p.name, p.resource, p.http_method \
     FROM roles r \
     LEFT JOIN role_permissions rp ON rp.role_id = r.id \
     LEFT JOIN permissions p ON p.id = rp.permission_id";

#[async_trait]
impl CredentialStore for PgStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<UserWithPassword>, AuthError> {
        let row = sqlx::query_as::<_, (String, Option<String>, Option<String>)>(
            "SELECT id::text, name, password_hash FROM users WHERE email = $1",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|(id, name, password_hash)| UserWithPassword {
            user: User {
                id,
                email: email.to_string(),
                name,
            },
            password_hash,
        }))
    }

    async fn find_by_id(&self, user_id: &str) -> Result<Option<User>, AuthError> {
        let row = sqlx::query_as::<_, (String, Option<String>)>(
            "SELECT email, name FROM users WHERE id = $1::uuid",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|(email, name)| User {
            id: user_id.to_string(),
            email,
            name,
        }))
    }

    async fn email_exists(&self, email: &str) -> Result<bool, AuthError> {
        let exists =
            sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM users WHERE email = $1)")
                .bind(email)
                .fetch_one(&self.pool)
                .await?;
        Ok(exists)
    }

    async fn create_user(
        &self,
        email: &str,
        name: Option<&str>,
        password_hash: &str,
    ) -> Result<CreatedUser, AuthError> {
        let mut tx = self.pool.begin().await?;

        // Self-conflicting lock: concurrent creators take turns, so exactly
        // one of them can observe an empty table.
        sqlx::query("LOCK TABLE users IN SHARE ROW EXCLUSIVE MODE")
            .execute(&mut *tx)
            .await?;
        let is_first = sqlx::query_scalar::<_, bool>("SELECT NOT EXISTS(SELECT 1 FROM users)")
            .fetch_one(&mut *tx)
            .await?;

        let id = sqlx::query_scalar::<_, String>(
            "INSERT INTO users (email, name, password_hash) VALUES ($1, $2, $3) RETURNING id::text",
        )
        .bind(email)
        .bind(name)
        .bind(password_hash)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AuthError::Validation("Email already registered".into())
            } else {
                AuthError::Db(e)
            }
        })?;

        tx.commit().await?;
        Ok(CreatedUser { id, is_first })
    }
}

/// Postgres `unique_violation`.
fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => db.code().as_deref() == Some("23505"),
        _ => false,
    }
}

#[async_trait]
impl RefreshTokenStore for PgStore {
    async fn upsert(&self, record: &RefreshTokenRecord) -> Result<(), AuthError> {
        sqlx::query(
            "INSERT INTO refresh_tokens (user_id, token_hash, expires_at, created_at) \
             VALUES ($1::uuid, $2, $3, $4) \
             ON CONFLICT (user_id) DO UPDATE \
             SET token_hash = EXCLUDED.token_hash, \
                 expires_at = EXCLUDED.expires_at, \
                 created_at = EXCLUDED.created_at",
        )
        .bind(&record.user_id)
        .bind(&record.token_hash)
        .bind(record.expires_at)
        .bind(record.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_by_user(&self, user_id: &str) -> Result<Option<RefreshTokenRecord>, AuthError> {
        let row = sqlx::query_as::<_, (String, DateTime<Utc>, DateTime<Utc>)>(
            "SELECT token_hash, expires_at, created_at \
             FROM refresh_tokens WHERE user_id = $1::uuid",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|(token_hash, expires_at, created_at)| RefreshTokenRecord {
            user_id: user_id.to_string(),
            token_hash,
            expires_at,
            created_at,
        }))
    }

    async fn delete(&self, user_id: &str) -> Result<(), AuthError> {
        sqlx::query("DELETE FROM refresh_tokens WHERE user_id = $1::uuid")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_matching(&self, user_id: &str, token_hash: &str) -> Result<bool, AuthError> {
        let result =
            sqlx::query("DELETE FROM refresh_tokens WHERE user_id = $1::uuid AND token_hash = $2")
                .bind(user_id)
                .bind(token_hash)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl RevocationCache for PgStore {
    async fn exists(&self, key: &str) -> Result<bool, AuthError> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM revoked_tokens WHERE key = $1 AND expires_at > now())",
        )
        .bind(key)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn set(&self, key: &str, ttl: Duration) -> Result<(), AuthError> {
        if ttl.is_zero() {
            return Ok(());
        }
        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|e| AuthError::Internal(format!("revocation ttl: {e}")))?;
        sqlx::query(
            "INSERT INTO revoked_tokens (key, expires_at) VALUES ($1, $2) \
             ON CONFLICT (key) DO UPDATE SET expires_at = EXCLUDED.expires_at",
        )
        .bind(key)
        .bind(Utc::now() + ttl)
        .execute(&self.pool)
        .await?;

        // Entries past their TTL are dead weight; sweep them on write.
        let purged = sqlx::query("DELETE FROM revoked_tokens WHERE expires_at <= now()")
            .execute(&self.pool)
            .await?
            .rows_affected();
        if purged > 0 {
            debug!(purged, "purged expired revocation entries");
        }
        Ok(())
    }
}

#[async_trait]
impl RolePermissionStore for PgStore {
    async fn find_role_by_name(&self, name: &str) -> Result<Option<Role>, AuthError> {
        let rows = sqlx::query_as::<_, RolePermissionRow>(&format!(
            "{ROLE_PERMISSIONS_SELECT} WHERE r.name = $1"
        ))
        .bind(name)
        .fetch_all(&self.pool)
        .await?;
        Ok(group_roles(rows).into_iter().next())
    }

    async fn roles_by_names(&self, names: &[String]) -> Result<Vec<Role>, AuthError> {
        if names.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query_as::<_, RolePermissionRow>(&format!(
            "{ROLE_PERMISSIONS_SELECT} WHERE r.name = ANY($1)"
        ))
        .bind(names)
        .fetch_all(&self.pool)
        .await?;
        Ok(group_roles(rows))
    }

    async fn roles_for_user(&self, user_id: &str) -> Result<Vec<String>, AuthError> {
        let rows = sqlx::query_scalar::<_, String>(
            "SELECT r.name FROM user_roles ur \
             JOIN roles r ON r.id = ur.role_id \
             WHERE ur.user_id = $1::uuid \
             ORDER BY r.name",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn grant_role(&self, user_id: &str, role_name: &str) -> Result<(), AuthError> {
        let role_exists =
            sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM roles WHERE name = $1)")
                .bind(role_name)
                .fetch_one(&self.pool)
                .await?;
        if !role_exists {
            return Err(AuthError::Validation(format!("Unknown role '{role_name}'")));
        }
        sqlx::query(
            "INSERT INTO user_roles (user_id, role_id) \
             SELECT $1::uuid, id FROM roles WHERE name = $2 \
             ON CONFLICT DO NOTHING",
        )
        .bind(user_id)
        .bind(role_name)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
