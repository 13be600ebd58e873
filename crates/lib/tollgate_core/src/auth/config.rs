//! Token signing configuration, loaded once at startup.

use std::path::PathBuf;
use std::str::FromStr;

use jsonwebtoken::Algorithm;
use rand::distr::Alphanumeric;
use rand::{Rng, rng};
use tracing::info;

use super::AuthError;

/// Default access token lifetime: 15 minutes.
pub const DEFAULT_ACCESS_TTL_MINUTES: i64 = 15;

/// Default refresh token lifetime: 30 days.
pub const DEFAULT_REFRESH_TTL_MINUTES: i64 = 30 * 24 * 60;

/// Longest accepted token lifetime: 10 years.
pub const MAX_TTL_MINUTES: i64 = 10 * 365 * 24 * 60;

/// Process-wide token settings. Immutable once built.
#[derive(Clone)]
pub struct TokenConfig {
    /// Shared HMAC secret.
    pub secret: String,
    /// Symmetric signing algorithm (HS256, HS384 or HS512).
    pub algorithm: Algorithm,
    pub access_ttl_minutes: i64,
    pub refresh_ttl_minutes: i64,
}

impl std::fmt::Debug for TokenConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenConfig")
            .field("secret", &"<redacted>")
            .field("algorithm", &self.algorithm)
            .field("access_ttl_minutes", &self.access_ttl_minutes)
            .field("refresh_ttl_minutes", &self.refresh_ttl_minutes)
            .finish()
    }
}

impl TokenConfig {
    /// HS256 config with default lifetimes.
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            algorithm: Algorithm::HS256,
            access_ttl_minutes: DEFAULT_ACCESS_TTL_MINUTES,
            refresh_ttl_minutes: DEFAULT_REFRESH_TTL_MINUTES,
        }
    }

    /// Reads configuration from environment variables.
    ///
    /// | Variable                        | Default                        |
    /// |---------------------------------|--------------------------------|
    /// | `JWT_SECRET` / `AUTH_SECRET`    | generated & persisted to file  |
    /// | `JWT_ALGORITHM`                 | `HS256`                        |
    /// | `ACCESS_TOKEN_EXPIRE_MINUTES`   | `15`                           |
    /// | `REFRESH_TOKEN_EXPIRE_MINUTES`  | `43200`                        |
    pub fn from_env() -> Result<Self, AuthError> {
        Self::from_lookup(|key| std::env::var(key).ok(), resolve_jwt_secret)
    }

    /// Builds a config from an arbitrary variable lookup.
    ///
    /// `fallback_secret` is only called when neither `JWT_SECRET` nor
    /// `AUTH_SECRET` is set.
    pub fn from_lookup<F, S>(lookup: F, fallback_secret: S) -> Result<Self, AuthError>
    where
        F: Fn(&str) -> Option<String>,
        S: FnOnce() -> String,
    {
        let secret = ["JWT_SECRET", "AUTH_SECRET"]
            .iter()
            .filter_map(|key| lookup(key))
            .find(|s| !s.is_empty())
            .unwrap_or_else(fallback_secret);

        let algorithm = match lookup("JWT_ALGORITHM") {
            Some(raw) => parse_algorithm(&raw)?,
            None => Algorithm::HS256,
        };

        let config = Self {
            secret,
            algorithm,
            access_ttl_minutes: parse_minutes(
                lookup("ACCESS_TOKEN_EXPIRE_MINUTES"),
                "ACCESS_TOKEN_EXPIRE_MINUTES",
                DEFAULT_ACCESS_TTL_MINUTES,
            )?,
            refresh_ttl_minutes: parse_minutes(
                lookup("REFRESH_TOKEN_EXPIRE_MINUTES"),
                "REFRESH_TOKEN_EXPIRE_MINUTES",
                DEFAULT_REFRESH_TTL_MINUTES,
            )?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Rejects empty secrets, non-HMAC algorithms and lifetimes outside
    /// `1..=MAX_TTL_MINUTES`.
    pub fn validate(&self) -> Result<(), AuthError> {
        if self.secret.is_empty() {
            return Err(AuthError::Config("signing secret is empty".into()));
        }
        if !is_symmetric(self.algorithm) {
            return Err(AuthError::Config(format!(
                "unsupported algorithm {:?}: only HS256, HS384 and HS512 are allowed",
                self.algorithm
            )));
        }
        for (name, minutes) in [
            ("ACCESS_TOKEN_EXPIRE_MINUTES", self.access_ttl_minutes),
            ("REFRESH_TOKEN_EXPIRE_MINUTES", self.refresh_ttl_minutes),
        ] {
            if !(1..=MAX_TTL_MINUTES).contains(&minutes) {
                return Err(AuthError::Config(format!(
                    "{name} must be between 1 and {MAX_TTL_MINUTES}, got {minutes}"
                )));
            }
        }
        Ok(())
    }
}

fn is_symmetric(algorithm: Algorithm) -> bool {
    matches!(
        algorithm,
        Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512
    )
}

fn parse_algorithm(raw: &str) -> Result<Algorithm, AuthError> {
    let algorithm = Algorithm::from_str(raw.trim().to_uppercase().as_str())
        .map_err(|_| AuthError::Config(format!("unknown JWT algorithm '{raw}'")))?;
    if !is_symmetric(algorithm) {
        return Err(AuthError::Config(format!(
            "unsupported algorithm '{raw}': only HS256, HS384 and HS512 are allowed"
        )));
    }
    Ok(algorithm)
}

fn parse_minutes(raw: Option<String>, name: &str, default: i64) -> Result<i64, AuthError> {
    match raw {
        None => Ok(default),
        Some(v) => v
            .trim()
            .parse::<i64>()
            .map_err(|_| AuthError::Config(format!("{name} must be an integer, got '{v}'"))),
    }
}

/// Resolve the JWT secret: env var `JWT_SECRET` → `AUTH_SECRET` → persisted file.
pub fn resolve_jwt_secret() -> String {
    if let Ok(secret) = std::env::var("JWT_SECRET")
        && !secret.is_empty()
    {
        return secret;
    }
    if let Ok(secret) = std::env::var("AUTH_SECRET")
        && !secret.is_empty()
    {
        return secret;
    }
    let secret_path = jwt_secret_path();
    if let Ok(existing) = std::fs::read_to_string(&secret_path) {
        let trimmed = existing.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }
    let secret: String = rng()
        .sample_iter(&Alphanumeric)
        .take(64)
        .map(char::from)
        .collect();
    if let Some(parent) = secret_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    let _ = std::fs::write(&secret_path, &secret);
    info!(path = %secret_path.display(), "generated new JWT secret");
    secret
}

/// Path to the persisted JWT secret file.
fn jwt_secret_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tollgate")
        .join("jwt-secret")
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = TokenConfig::from_lookup(lookup(&[]), || "fallback".into()).unwrap();
        assert_eq!(config.secret, "fallback");
        assert_eq!(config.algorithm, Algorithm::HS256);
        assert_eq!(config.access_ttl_minutes, 15);
        assert_eq!(config.refresh_ttl_minutes, 43_200);
    }

    #[test]
    fn jwt_secret_wins_over_auth_secret() {
        let config = TokenConfig::from_lookup(
            lookup(&[("JWT_SECRET", "primary"), ("AUTH_SECRET", "secondary")]),
            || unreachable!(),
        )
        .unwrap();
        assert_eq!(config.secret, "primary");
    }

    #[test]
    fn reads_algorithm_and_lifetimes() {
        let config = TokenConfig::from_lookup(
            lookup(&[
                ("JWT_SECRET", "s"),
                ("JWT_ALGORITHM", "hs512"),
                ("ACCESS_TOKEN_EXPIRE_MINUTES", "5"),
                ("REFRESH_TOKEN_EXPIRE_MINUTES", "60"),
            ]),
            || unreachable!(),
        )
        .unwrap();
        assert_eq!(config.algorithm, Algorithm::HS512);
        assert_eq!(config.access_ttl_minutes, 5);
        assert_eq!(config.refresh_ttl_minutes, 60);
    }

    #[test]
    fn rejects_asymmetric_algorithm() {
        let err = TokenConfig::from_lookup(
            lookup(&[("JWT_SECRET", "s"), ("JWT_ALGORITHM", "RS256")]),
            || unreachable!(),
        )
        .unwrap_err();
        assert!(matches!(err, AuthError::Config(_)));
    }

    #[test]
    fn rejects_bad_lifetimes() {
        let garbage = TokenConfig::from_lookup(
            lookup(&[("JWT_SECRET", "s"), ("ACCESS_TOKEN_EXPIRE_MINUTES", "soon")]),
            || unreachable!(),
        );
        assert!(matches!(garbage, Err(AuthError::Config(_))));

        let zero = TokenConfig::from_lookup(
            lookup(&[("JWT_SECRET", "s"), ("REFRESH_TOKEN_EXPIRE_MINUTES", "0")]),
            || unreachable!(),
        );
        assert!(matches!(zero, Err(AuthError::Config(_))));
    }

    #[test]
    fn rejects_oversized_lifetimes() {
        let huge = TokenConfig::from_lookup(
            lookup(&[
                ("JWT_SECRET", "s"),
                ("ACCESS_TOKEN_EXPIRE_MINUTES", "9223372036854775807"),
            ]),
            || unreachable!(),
        );
        assert!(matches!(huge, Err(AuthError::Config(_))));

        let just_over = (MAX_TTL_MINUTES + 1).to_string();
        let over = TokenConfig::from_lookup(
            lookup(&[
                ("JWT_SECRET", "s"),
                ("REFRESH_TOKEN_EXPIRE_MINUTES", just_over.as_str()),
            ]),
            || unreachable!(),
        );
        assert!(matches!(over, Err(AuthError::Config(_))));

        let max = MAX_TTL_MINUTES.to_string();
        let config = TokenConfig::from_lookup(
            lookup(&[
                ("JWT_SECRET", "s"),
                ("REFRESH_TOKEN_EXPIRE_MINUTES", max.as_str()),
            ]),
            || unreachable!(),
        )
        .unwrap();
        assert_eq!(config.refresh_ttl_minutes, MAX_TTL_MINUTES);
    }

    #[test]
    fn debug_redacts_secret() {
        let rendered = format!("{:?}", TokenConfig::new("super-secret"));
        assert!(!rendered.contains("super-secret"));
    }
}
