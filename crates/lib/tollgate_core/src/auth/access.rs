//! Role-based permission resolution.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::debug;

use super::AuthError;
use super::tokens::TokenService;
use crate::models::auth::TokenClaims;
use crate::models::rbac::{PermissionKey, Role};
use crate::store::RolePermissionStore;

/// Every `(resource, http_method)` pair granted by `roles`.
pub fn permissions_for(roles: &[Role]) -> BTreeSet<PermissionKey> {
    roles
        .iter()
        .flat_map(|role| role.permissions.iter().map(|p| p.key()))
        .collect()
}

/// Answers "can the bearer of this token call `http_method` on `resource`".
#[derive(Clone)]
pub struct AccessControlService {
    tokens: TokenService,
    roles: Arc<dyn RolePermissionStore>,
}

impl AccessControlService {
    pub fn new(tokens: TokenService, roles: Arc<dyn RolePermissionStore>) -> Self {
        Self { tokens, roles }
    }

    /// Token errors (invalid, expired, revoked) propagate; a missing grant is `Ok(false)`.
    pub async fn check_permission(
        &self,
        token: &str,
        resource: &str,
        http_method: &str,
    ) -> Result<bool, AuthError> {
        match self.require_permission(token, resource, http_method).await {
            Ok(_) => Ok(true),
            Err(AuthError::PermissionDenied) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Like [`check_permission`](Self::check_permission), but a missing grant
    /// is [`AuthError::PermissionDenied`]. Returns the verified claims.
    pub async fn require_permission(
        &self,
        token: &str,
        resource: &str,
        http_method: &str,
    ) -> Result<TokenClaims, AuthError> {
        let claims = self.tokens.check_access_token(token).await?;
        if !self.claims_permit(&claims, resource, http_method).await? {
            debug!(user_id = %claims.sub, resource, http_method, "permission denied");
            return Err(AuthError::PermissionDenied);
        }
        Ok(claims)
    }

    /// Decision for already-verified claims.
    ///
    /// Superusers pass without any role lookup. Otherwise any one role holding
    /// the exact pair is enough; unknown role names simply don't match.
    pub async fn claims_permit(
        &self,
        claims: &TokenClaims,
        resource: &str,
        http_method: &str,
    ) -> Result<bool, AuthError> {
        if claims.is_superuser {
            return Ok(true);
        }
        for name in &claims.roles {
            let Some(role) = self.roles.find_role_by_name(name).await? else {
                debug!(role = %name, "role not found");
                continue;
            };
            if role.grants(resource, http_method) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Effective permission set for a set of role names.
    pub async fn effective_permissions(
        &self,
        role_names: &BTreeSet<String>,
    ) -> Result<BTreeSet<PermissionKey>, AuthError> {
        let names: Vec<String> = role_names.iter().cloned().collect();
        let roles = self.roles.roles_by_names(&names).await?;
        Ok(permissions_for(&roles))
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::auth::SUPERADMIN_ROLE;
    use crate::auth::config::TokenConfig;
    use crate::models::auth::Principal;
    use crate::models::rbac::Permission;
    use crate::store::MemoryStore;

    fn permission(resource: &str, method: &str) -> Permission {
        Permission {
            name: format!("{method} {resource}"),
            resource: resource.into(),
            http_method: method.into(),
        }
    }

    fn setup() -> (AccessControlService, TokenService) {
        let store = Arc::new(MemoryStore::new());
        store.insert_role(Role {
            name: "editor".into(),
            permissions: vec![permission("roles", "PUT")],
        });
        store.insert_role(Role {
            name: "viewer".into(),
            permissions: vec![permission("roles", "GET"), permission("users", "GET")],
        });
        let tokens = TokenService::new(&TokenConfig::new("test-secret"), store.clone(), store.clone());
        (AccessControlService::new(tokens.clone(), store), tokens)
    }

    fn token_for(tokens: &TokenService, roles: &[&str]) -> String {
        let principal = Principal::new("u1", "a@b.com", roles.iter().copied());
        tokens.create_access_token(&principal).unwrap()
    }

    #[tokio::test]
    async fn exact_pair_grants_and_other_methods_do_not() {
        let (acl, tokens) = setup();
        let token = token_for(&tokens, &["editor"]);
        assert!(acl.check_permission(&token, "roles", "PUT").await.unwrap());
        assert!(!acl.check_permission(&token, "roles", "DELETE").await.unwrap());
        assert!(!acl.check_permission(&token, "roles/1", "PUT").await.unwrap());
    }

    #[tokio::test]
    async fn any_role_may_satisfy_the_check() {
        let (acl, tokens) = setup();
        let token = token_for(&tokens, &["editor", "viewer"]);
        assert!(acl.check_permission(&token, "users", "GET").await.unwrap());
        assert!(acl.check_permission(&token, "roles", "PUT").await.unwrap());
    }

    #[tokio::test]
    async fn unknown_roles_are_no_match() {
        let (acl, tokens) = setup();
        let token = token_for(&tokens, &["ghost"]);
        assert!(!acl.check_permission(&token, "roles", "PUT").await.unwrap());
    }

    #[tokio::test]
    async fn superadmin_bypasses_lookup() {
        let (acl, tokens) = setup();
        let token = token_for(&tokens, &[SUPERADMIN_ROLE]);
        assert!(
            acl.check_permission(&token, "anything", "DELETE")
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn token_errors_propagate() {
        let (acl, tokens) = setup();
        assert!(matches!(
            acl.check_permission("bogus", "roles", "PUT").await,
            Err(AuthError::InvalidToken)
        ));

        let mut claims = tokens
            .codec()
            .access_claims(&Principal::new("u1", "a@b.com", ["editor"]));
        claims.exp = Utc::now().timestamp() - 1;
        let expired = tokens.codec().encode(&claims).unwrap();
        assert!(matches!(
            acl.check_permission(&expired, "roles", "PUT").await,
            Err(AuthError::TokenExpired)
        ));

        let token = token_for(&tokens, &["editor"]);
        tokens.add_blacklist(&token).await.unwrap();
        assert!(matches!(
            acl.check_permission(&token, "roles", "PUT").await,
            Err(AuthError::TokenRevoked)
        ));
    }

    #[tokio::test]
    async fn require_permission_denies_missing_grant() {
        let (acl, tokens) = setup();
        let token = token_for(&tokens, &["viewer"]);
        assert!(acl.require_permission(&token, "roles", "GET").await.is_ok());
        assert!(matches!(
            acl.require_permission(&token, "roles", "PUT").await,
            Err(AuthError::PermissionDenied)
        ));
    }

    #[tokio::test]
    async fn effective_permissions_union_roles() {
        let (acl, _) = setup();
        let names: BTreeSet<String> = ["editor", "viewer", "ghost"]
            .into_iter()
            .map(String::from)
            .collect();
        let perms = acl.effective_permissions(&names).await.unwrap();
        assert_eq!(perms.len(), 3);
        assert!(perms.contains(&PermissionKey::new("roles", "PUT")));
        assert!(perms.contains(&PermissionKey::new("users", "GET")));
    }

    #[test]
    fn permissions_for_deduplicates() {
        let roles = vec![
            Role {
                name: "a".into(),
                permissions: vec![permission("roles", "GET")],
            },
            Role {
                name: "b".into(),
                permissions: vec![permission("roles", "GET")],
            },
        ];
        assert_eq!(permissions_for(&roles).len(), 1);
    }
}
