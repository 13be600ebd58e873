//! Token issuance, verification, rotation and revocation.
//!
//! Refresh-token lineage per user:
//!
//! ```text
//! absent → issued → rotated → issued (new token) …
//!                 ↘ revoked → absent
//! ```
//!
//! A refresh token that has been rotated or revoked still decodes, but its
//! hash no longer matches the stored record, so it is rejected as
//! [`AuthError::InvalidRefreshToken`].

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, warn};

use super::AuthError;
use super::config::TokenConfig;
use super::jwt::{TokenCodec, hash_token};
use crate::models::auth::{Principal, RefreshClaims, RefreshTokenRecord, TokenClaims, TokenPair};
use crate::store::{RefreshTokenStore, RevocationCache};

/// Revocation cache key prefix.
pub const BLACKLIST_PREFIX: &str = "blacklist:";

/// Revocation cache key for an access token.
pub fn blacklist_key(access_token: &str) -> String {
    format!("{BLACKLIST_PREFIX}{access_token}")
}

#[derive(Clone)]
pub struct TokenService {
    codec: TokenCodec,
    refresh_tokens: Arc<dyn RefreshTokenStore>,
    revocations: Arc<dyn RevocationCache>,
}

impl TokenService {
    pub fn new(
        config: &TokenConfig,
        refresh_tokens: Arc<dyn RefreshTokenStore>,
        revocations: Arc<dyn RevocationCache>,
    ) -> Self {
        Self {
            codec: TokenCodec::new(config),
            refresh_tokens,
            revocations,
        }
    }

    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    /// Sign an access token for `principal`. No side effects.
    pub fn create_access_token(&self, principal: &Principal) -> Result<String, AuthError> {
        self.codec.encode(&self.codec.access_claims(principal))
    }

    /// Sign a refresh token and make its hash the user's single stored record.
    ///
    /// The returned raw token exists nowhere else on the server.
    pub async fn create_refresh_token(&self, principal: &Principal) -> Result<String, AuthError> {
        let claims = self.codec.refresh_claims(principal);
        let token = self.codec.encode(&claims)?;
        let now = Utc::now();
        let record = RefreshTokenRecord {
            user_id: principal.subject_id.clone(),
            token_hash: hash_token(&token),
            expires_at: now + self.codec.refresh_ttl(),
            created_at: now,
        };
        self.refresh_tokens.upsert(&record).await?;
        Ok(token)
    }

    /// Issue a fresh pair, replacing any refresh token the user already had.
    pub async fn create_tokens(&self, principal: &Principal) -> Result<TokenPair, AuthError> {
        let access_token = self.create_access_token(principal)?;
        let refresh_token = self.create_refresh_token(principal).await?;
        info!(user_id = %principal.subject_id, "issued token pair");
        Ok(TokenPair {
            access_token,
            refresh_token,
        })
    }

    /// Verify signature and expiry of an access token.
    pub fn get_token_data(&self, token: &str) -> Result<TokenClaims, AuthError> {
        self.codec.decode_access(token)
    }

    /// [`get_token_data`](Self::get_token_data) plus the revocation check.
    pub async fn check_access_token(&self, token: &str) -> Result<TokenClaims, AuthError> {
        let claims = self.get_token_data(token)?;
        if self.revocations.exists(&blacklist_key(token)).await? {
            debug!(user_id = %claims.sub, "rejected revoked access token");
            return Err(AuthError::TokenRevoked);
        }
        Ok(claims)
    }

    /// Decode a refresh token and match it against the user's stored record.
    ///
    /// Every failure, including reuse after rotation, is reported uniformly
    /// as [`AuthError::InvalidRefreshToken`].
    pub async fn check_refresh_token(
        &self,
        token: &str,
    ) -> Result<(RefreshClaims, RefreshTokenRecord), AuthError> {
        let claims = self
            .codec
            .decode_refresh(token)
            .map_err(|_| AuthError::InvalidRefreshToken)?;

        let Some(record) = self.refresh_tokens.find_by_user(&claims.sub).await? else {
            debug!(user_id = %claims.sub, "no refresh token on record");
            return Err(AuthError::InvalidRefreshToken);
        };

        if record.token_hash != hash_token(token) {
            warn!(user_id = %claims.sub, "refresh token does not match stored record");
            return Err(AuthError::InvalidRefreshToken);
        }
        if record.expires_at <= Utc::now() {
            return Err(AuthError::InvalidRefreshToken);
        }
        Ok((claims, record))
    }

    /// Consume `record` and issue a new pair for `principal`.
    ///
    /// The old record is removed only if it still holds the presented hash, so
    /// of two concurrent rotations exactly one proceeds.
    pub async fn refresh_tokens(
        &self,
        principal: &Principal,
        record: &RefreshTokenRecord,
    ) -> Result<TokenPair, AuthError> {
        if principal.subject_id != record.user_id {
            return Err(AuthError::InvalidRefreshToken);
        }
        if !self
            .refresh_tokens
            .delete_matching(&record.user_id, &record.token_hash)
            .await?
        {
            warn!(user_id = %record.user_id, "refresh token already consumed");
            return Err(AuthError::InvalidRefreshToken);
        }
        let pair = self.create_tokens(principal).await?;
        info!(user_id = %record.user_id, "rotated refresh token");
        Ok(pair)
    }

    /// Logout: drop the refresh token and blacklist the access token.
    ///
    /// Both tokens are verified, and must belong to the same subject, before
    /// anything is changed. A second call with the same refresh token fails.
    pub async fn revoke_token(&self, access_token: &str, refresh_token: &str) -> Result<(), AuthError> {
        let (refresh, record) = self.check_refresh_token(refresh_token).await?;
        let access = self.codec.decode_access_ignoring_expiry(access_token)?;
        if access.sub != refresh.sub {
            warn!(user_id = %refresh.sub, "logout with another subject's access token");
            return Err(AuthError::InvalidToken);
        }
        if !self
            .refresh_tokens
            .delete_matching(&record.user_id, &record.token_hash)
            .await?
        {
            return Err(AuthError::InvalidRefreshToken);
        }
        self.blacklist(access_token, &access).await?;
        info!(user_id = %refresh.sub, "revoked tokens");
        Ok(())
    }

    /// Deny-list an access token for the rest of its lifetime.
    ///
    /// Already-expired tokens get a zero TTL, which stores nothing.
    pub async fn add_blacklist(&self, access_token: &str) -> Result<(), AuthError> {
        let claims = self.codec.decode_access_ignoring_expiry(access_token)?;
        self.blacklist(access_token, &claims).await
    }

    async fn blacklist(&self, access_token: &str, claims: &TokenClaims) -> Result<(), AuthError> {
        let ttl = remaining_lifetime(claims.exp);
        self.revocations
            .set(&blacklist_key(access_token), ttl)
            .await?;
        debug!(user_id = %claims.sub, ttl_ms = ttl.as_millis() as u64, "blacklisted access token");
        Ok(())
    }
}

/// `exp - now`, clamped at zero. Millisecond precision keeps it from
/// overshooting the token's real expiry.
fn remaining_lifetime(exp: i64) -> Duration {
    let remaining_ms = exp
        .saturating_mul(1000)
        .saturating_sub(Utc::now().timestamp_millis());
    Duration::from_millis(remaining_ms.max(0) as u64)
}
