//! JWT encoding and verification.

use chrono::{Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use super::config::{MAX_TTL_MINUTES, TokenConfig};
use super::{AuthError, SUPERADMIN_ROLE};
use crate::models::auth::{Principal, RefreshClaims, TokenClaims};

/// Signs and verifies both token kinds with the process-wide secret.
#[derive(Clone)]
pub struct TokenCodec {
    algorithm: Algorithm,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenCodec {
    /// Lifetimes are clamped to `1..=MAX_TTL_MINUTES`; [`TokenConfig::validate`]
    /// reports out-of-range values before this point.
    pub fn new(config: &TokenConfig) -> Self {
        let secret = config.secret.as_bytes();
        Self {
            algorithm: config.algorithm,
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            access_ttl: ttl_minutes(config.access_ttl_minutes),
            refresh_ttl: ttl_minutes(config.refresh_ttl_minutes),
        }
    }

    pub fn access_ttl(&self) -> Duration {
        self.access_ttl
    }

    pub fn refresh_ttl(&self) -> Duration {
        self.refresh_ttl
    }

    /// Build access claims expiring `access_ttl` from now.
    pub fn access_claims(&self, principal: &Principal) -> TokenClaims {
        TokenClaims {
            sub: principal.subject_id.clone(),
            email: principal.email.clone(),
            roles: principal.roles.clone(),
            exp: (Utc::now() + self.access_ttl).timestamp(),
            is_superuser: principal.roles.contains(SUPERADMIN_ROLE),
        }
    }

    /// Build refresh claims expiring `refresh_ttl` from now, with a fresh `jti`.
    pub fn refresh_claims(&self, principal: &Principal) -> RefreshClaims {
        RefreshClaims {
            sub: principal.subject_id.clone(),
            email: principal.email.clone(),
            exp: (Utc::now() + self.refresh_ttl).timestamp(),
            jti: Uuid::new_v4().simple().to_string(),
        }
    }

    /// Sign any claims payload.
    pub fn encode<T: Serialize>(&self, claims: &T) -> Result<String, AuthError> {
        encode(&Header::new(self.algorithm), claims, &self.encoding_key)
            .map_err(|e| AuthError::Internal(format!("jwt encode: {e}")))
    }

    /// Verify signature and expiry of an access token.
    pub fn decode_access(&self, token: &str) -> Result<TokenClaims, AuthError> {
        let claims: TokenClaims = self.decode(token, true)?;
        ensure_not_expired(claims.exp)?;
        Ok(claims)
    }

    /// Verify the signature of an access token, accepting expired ones.
    pub fn decode_access_ignoring_expiry(&self, token: &str) -> Result<TokenClaims, AuthError> {
        self.decode(token, false)
    }

    /// Verify signature and expiry of a refresh token.
    pub fn decode_refresh(&self, token: &str) -> Result<RefreshClaims, AuthError> {
        let claims: RefreshClaims = self.decode(token, true)?;
        ensure_not_expired(claims.exp)?;
        Ok(claims)
    }

    fn decode<T: DeserializeOwned>(&self, token: &str, validate_exp: bool) -> Result<T, AuthError> {
        let mut validation = Validation::new(self.algorithm);
        validation.leeway = 0;
        validation.validate_exp = validate_exp;
        decode::<T>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                _ => AuthError::InvalidToken,
            })
    }
}

fn ttl_minutes(minutes: i64) -> Duration {
    Duration::minutes(minutes.clamp(1, MAX_TTL_MINUTES))
}

/// `exp == now` leaves no remaining lifetime.
fn ensure_not_expired(exp: i64) -> Result<(), AuthError> {
    if exp <= Utc::now().timestamp() {
        return Err(AuthError::TokenExpired);
    }
    Ok(())
}

/// SHA-256 hash a serialized token for storage.
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}
