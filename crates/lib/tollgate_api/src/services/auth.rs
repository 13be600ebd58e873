//! Authentication flows: login, register, refresh, logout, permission checks.
//!
//! Orchestrates the credential and role stores around
//! [`tollgate_core::auth::tokens::TokenService`].

use tollgate_core::auth::password::{hash_password, validate_password, verify_password};
use tollgate_core::auth::{AuthError, SUPERADMIN_ROLE};
use tollgate_core::models::auth::{Principal, TokenClaims, TokenPair};
use tracing::{info, warn};

use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::models::{MeResponse, MessageResponse, TokenResponse};

fn token_response(state: &AppState, pair: TokenPair) -> TokenResponse {
    TokenResponse {
        access_token: pair.access_token,
        refresh_token: pair.refresh_token,
        token_type: "bearer".to_string(),
        expires_in: state.tokens.codec().access_ttl().num_seconds(),
    }
}

/// Principal for `user_id` with roles as currently stored.
async fn load_principal(state: &AppState, user_id: &str, email: &str) -> AppResult<Principal> {
    let roles = state.roles.roles_for_user(user_id).await?;
    Ok(Principal::new(user_id, email, roles))
}

/// Authenticate with email + password.
///
/// Unknown email and wrong password produce the same error.
pub async fn login(state: &AppState, email: &str, password: &str) -> AppResult<TokenResponse> {
    let Some(found) = state.credentials.find_by_email(email).await? else {
        return Err(AuthError::InvalidCredentials.into());
    };
    let Some(pw_hash) = found.password_hash.as_deref() else {
        return Err(AuthError::InvalidCredentials.into());
    };
    let verified = verify_password(password, pw_hash).unwrap_or_else(|e| {
        warn!(user_id = %found.user.id, error = %e, "stored password hash is unusable");
        false
    });
    if !verified {
        return Err(AuthError::InvalidCredentials.into());
    }

    let principal = load_principal(state, &found.user.id, &found.user.email).await?;
    let pair = state.tokens.create_tokens(&principal).await?;
    Ok(token_response(state, pair))
}

/// Register a new user account. The first user becomes superadmin.
pub async fn register(
    state: &AppState,
    email: &str,
    password: &str,
    name: Option<&str>,
) -> AppResult<TokenResponse> {
    let email = email.trim();
    if email.is_empty() || !email.contains('@') {
        return Err(AppError::Validation("A valid email is required".into()));
    }
    validate_password(password)?;

    // Fast path that skips the bcrypt cost; the store still enforces uniqueness.
    if state.credentials.email_exists(email).await? {
        return Err(AppError::Validation("Email already registered".into()));
    }

    let pw_hash = hash_password(password)?;
    let created = state
        .credentials
        .create_user(email, name, &pw_hash)
        .await?;

    if created.is_first {
        state.roles.grant_role(&created.id, SUPERADMIN_ROLE).await?;
        info!(email, "first user granted superadmin role");
    }

    let principal = load_principal(state, &created.id, email).await?;
    let pair = state.tokens.create_tokens(&principal).await?;
    Ok(token_response(state, pair))
}

/// Rotate a refresh token into a new pair. Each refresh token works once.
pub async fn refresh(state: &AppState, refresh_token: &str) -> AppResult<TokenResponse> {
    let (claims, record) = state.tokens.check_refresh_token(refresh_token).await?;

    // The account may have been removed since the token was issued.
    let Some(user) = state.credentials.find_by_id(&claims.sub).await? else {
        return Err(AuthError::InvalidRefreshToken.into());
    };

    let principal = load_principal(state, &user.id, &user.email).await?;
    let pair = state.tokens.refresh_tokens(&principal, &record).await?;
    Ok(token_response(state, pair))
}

/// Logout: revoke the refresh token and blacklist the access token.
pub async fn logout(
    state: &AppState,
    access_token: &str,
    refresh_token: &str,
) -> AppResult<MessageResponse> {
    state
        .tokens
        .revoke_token(access_token, refresh_token)
        .await?;
    Ok(MessageResponse {
        detail: "logged out".to_string(),
    })
}

/// Succeeds only if the token's principal may call `http_method` on `resource`.
pub async fn check_permission(
    state: &AppState,
    access_token: &str,
    resource: &str,
    http_method: &str,
) -> AppResult<MessageResponse> {
    state
        .access
        .require_permission(access_token, resource, http_method)
        .await?;
    Ok(MessageResponse {
        detail: "permission granted".to_string(),
    })
}

/// Verified claims plus the permissions their roles currently grant.
pub async fn me(state: &AppState, claims: &TokenClaims) -> AppResult<MeResponse> {
    let permissions = state.access.effective_permissions(&claims.roles).await?;
    Ok(MeResponse {
        user_id: claims.sub.clone(),
        email: claims.email.clone(),
        roles: claims.roles.iter().cloned().collect(),
        permissions: permissions.into_iter().collect(),
        is_superuser: claims.is_superuser,
        expires_at: claims.exp,
    })
}
