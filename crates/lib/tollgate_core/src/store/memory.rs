//! In-process stores backed by `DashMap`.
//!
//! Used by tests and single-node development. Revocation entries expire
//! lazily: an entry past its deadline is dropped the next time it is read.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use uuid::Uuid;

use super::{CredentialStore, RefreshTokenStore, RevocationCache, RolePermissionStore};
use crate::auth::AuthError;
use crate::models::auth::{CreatedUser, RefreshTokenRecord, User, UserWithPassword};
use crate::models::rbac::Role;

#[derive(Debug, Default)]
pub struct MemoryStore {
    users: DashMap<String, UserWithPassword>,
    /// email → user id, enforces unique emails.
    emails: DashMap<String, String>,
    /// Set by the first successful `create_user`.
    first_user_created: AtomicBool,
    refresh_tokens: DashMap<String, RefreshTokenRecord>,
    revocations: DashMap<String, Instant>,
    roles: DashMap<String, Role>,
    user_roles: DashMap<String, BTreeSet<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Define (or replace) a role and its permissions.
    pub fn insert_role(&self, role: Role) {
        self.roles.insert(role.name.clone(), role);
    }

    /// Time left on a revocation entry, if it is still live.
    pub fn revocation_ttl(&self, key: &str) -> Option<Duration> {
        let deadline = *self.revocations.get(key)?;
        deadline.checked_duration_since(Instant::now())
    }

    /// Number of refresh-token records currently stored.
    pub fn refresh_token_count(&self) -> usize {
        self.refresh_tokens.len()
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<UserWithPassword>, AuthError> {
        let Some(id) = self.emails.get(email).map(|id| id.clone()) else {
            return Ok(None);
        };
        Ok(self.users.get(&id).map(|u| u.clone()))
    }

    async fn find_by_id(&self, user_id: &str) -> Result<Option<User>, AuthError> {
        Ok(self.users.get(user_id).map(|u| u.user.clone()))
    }

    async fn email_exists(&self, email: &str) -> Result<bool, AuthError> {
        Ok(self.emails.contains_key(email))
    }

    async fn create_user(
        &self,
        email: &str,
        name: Option<&str>,
        password_hash: &str,
    ) -> Result<CreatedUser, AuthError> {
        let id = Uuid::now_v7().to_string();
        match self.emails.entry(email.to_string()) {
            Entry::Occupied(_) => {
                return Err(AuthError::Validation("Email already registered".into()));
            }
            Entry::Vacant(slot) => {
                slot.insert(id.clone());
            }
        }
        self.users.insert(
            id.clone(),
            UserWithPassword {
                user: User {
                    id: id.clone(),
                    email: email.to_string(),
                    name: name.map(str::to_string),
                },
                password_hash: Some(password_hash.to_string()),
            },
        );
        let is_first = self
            .first_user_created
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        Ok(CreatedUser { id, is_first })
    }
}

#[async_trait]
impl RefreshTokenStore for MemoryStore {
    async fn upsert(&self, record: &RefreshTokenRecord) -> Result<(), AuthError> {
        self.refresh_tokens
            .insert(record.user_id.clone(), record.clone());
        Ok(())
    }

    async fn find_by_user(&self, user_id: &str) -> Result<Option<RefreshTokenRecord>, AuthError> {
        Ok(self.refresh_tokens.get(user_id).map(|r| r.clone()))
    }

    async fn delete(&self, user_id: &str) -> Result<(), AuthError> {
        self.refresh_tokens.remove(user_id);
        Ok(())
    }

    async fn delete_matching(&self, user_id: &str, token_hash: &str) -> Result<bool, AuthError> {
        Ok(self
            .refresh_tokens
            .remove_if(user_id, |_, record| record.token_hash == token_hash)
            .is_some())
    }
}

#[async_trait]
impl RevocationCache for MemoryStore {
    async fn exists(&self, key: &str) -> Result<bool, AuthError> {
        let now = Instant::now();
        // Drop the entry if it has outlived its TTL.
        if self
            .revocations
            .remove_if(key, |_, deadline| *deadline <= now)
            .is_some()
        {
            return Ok(false);
        }
        Ok(self.revocations.contains_key(key))
    }

    async fn set(&self, key: &str, ttl: Duration) -> Result<(), AuthError> {
        if ttl.is_zero() {
            return Ok(());
        }
        self.revocations
            .insert(key.to_string(), Instant::now() + ttl);
        Ok(())
    }
}

#[async_trait]
impl RolePermissionStore for MemoryStore {
    async fn find_role_by_name(&self, name: &str) -> Result<Option<Role>, AuthError> {
        Ok(self.roles.get(name).map(|r| r.clone()))
    }

    async fn roles_by_names(&self, names: &[String]) -> Result<Vec<Role>, AuthError> {
        Ok(names
            .iter()
            .filter_map(|name| self.roles.get(name).map(|r| r.clone()))
            .collect())
    }

    async fn roles_for_user(&self, user_id: &str) -> Result<Vec<String>, AuthError> {
        Ok(self
            .user_roles
            .get(user_id)
            .map(|roles| roles.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn grant_role(&self, user_id: &str, role_name: &str) -> Result<(), AuthError> {
        if !self.roles.contains_key(role_name) {
            return Err(AuthError::Validation(format!("Unknown role '{role_name}'")));
        }
        self.user_roles
            .entry(user_id.to_string())
            .or_default()
            .insert(role_name.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn record(user_id: &str, hash: &str) -> RefreshTokenRecord {
        RefreshTokenRecord {
            user_id: user_id.into(),
            token_hash: hash.into(),
            expires_at: Utc::now(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn upsert_keeps_one_record_per_user() {
        let store = MemoryStore::new();
        store.upsert(&record("u1", "h1")).await.unwrap();
        store.upsert(&record("u1", "h2")).await.unwrap();
        assert_eq!(store.refresh_token_count(), 1);
        let stored = store.find_by_user("u1").await.unwrap().unwrap();
        assert_eq!(stored.token_hash, "h2");
    }

    #[tokio::test]
    async fn delete_matching_requires_current_hash() {
        let store = MemoryStore::new();
        store.upsert(&record("u1", "h2")).await.unwrap();
        assert!(!store.delete_matching("u1", "h1").await.unwrap());
        assert!(store.delete_matching("u1", "h2").await.unwrap());
        assert!(!store.delete_matching("u1", "h2").await.unwrap());
        assert!(store.find_by_user("u1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn revocation_entries_expire() {
        let store = MemoryStore::new();
        store.set("k", Duration::from_millis(20)).await.unwrap();
        assert!(store.exists("k").await.unwrap());
        std::thread::sleep(Duration::from_millis(40));
        assert!(!store.exists("k").await.unwrap());
        assert!(store.revocation_ttl("k").is_none());
    }

    #[tokio::test]
    async fn zero_ttl_is_not_stored() {
        let store = MemoryStore::new();
        store.set("k", Duration::ZERO).await.unwrap();
        assert!(!store.exists("k").await.unwrap());
    }

    #[tokio::test]
    async fn duplicate_email_is_rejected() {
        let store = MemoryStore::new();
        let first = store.create_user("a@b.com", None, "hash").await.unwrap();
        assert!(first.is_first);
        let err = store.create_user("a@b.com", None, "hash").await.unwrap_err();
        assert!(matches!(err, AuthError::Validation(_)));
        let second = store.create_user("b@b.com", None, "hash").await.unwrap();
        assert!(!second.is_first);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn exactly_one_concurrent_user_is_first() {
        let store = std::sync::Arc::new(MemoryStore::new());
        let handles: Vec<_> = (0..16)
            .map(|i| {
                let store = store.clone();
                tokio::spawn(async move {
                    store
                        .create_user(&format!("u{i}@b.com"), None, "hash")
                        .await
                        .unwrap()
                })
            })
            .collect();
        let mut firsts = 0;
        for handle in handles {
            if handle.await.unwrap().is_first {
                firsts += 1;
            }
        }
        assert_eq!(firsts, 1);
    }

    #[tokio::test]
    async fn grant_role_requires_known_role() {
        let store = MemoryStore::new();
        assert!(store.grant_role("u1", "ghost").await.is_err());
        store.insert_role(Role {
            name: "viewer".into(),
            permissions: vec![],
        });
        store.grant_role("u1", "viewer").await.unwrap();
        assert_eq!(store.roles_for_user("u1").await.unwrap(), vec!["viewer"]);
    }
}
