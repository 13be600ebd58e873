//! API server configuration.

use std::time::Duration;

use tollgate_core::auth::AuthError;
use tollgate_core::auth::config::TokenConfig;

/// Default per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Configuration for the API server.
#[derive(Clone, Debug)]
pub struct ApiConfig {
    /// Address to bind the HTTP listener (e.g. "127.0.0.1:3100").
    pub bind_addr: String,
    /// PostgreSQL connection URL.
    pub pg_connection_url: String,
    /// Token signing settings.
    pub token: TokenConfig,
    /// Upper bound on any single request, store round-trips included.
    pub request_timeout: Duration,
}

impl ApiConfig {
    /// Reads configuration from environment variables with sensible defaults.
    ///
    /// | Variable             | Default                              |
    /// |----------------------|--------------------------------------|
    /// | `BIND_ADDR`          | `127.0.0.1:3100`                     |
    /// | `DATABASE_URL`       | `postgres://localhost:5432/tollgate` |
    /// | `REQUEST_TIMEOUT_SECS` | `10`                               |
    ///
    /// Token settings are read by [`TokenConfig::from_env`].
    pub fn from_env() -> Result<Self, AuthError> {
        let request_timeout = match std::env::var("REQUEST_TIMEOUT_SECS") {
            Ok(raw) => raw.trim().parse::<u64>().map(Duration::from_secs).map_err(|_| {
                AuthError::Config(format!("REQUEST_TIMEOUT_SECS must be an integer, got '{raw}'"))
            })?,
            Err(_) => DEFAULT_REQUEST_TIMEOUT,
        };
        Ok(Self {
            bind_addr: std::env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:3100".into()),
            pg_connection_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgres://localhost:5432/tollgate".into()),
            token: TokenConfig::from_env()?,
            request_timeout,
        })
    }

    /// Config for tests and embedding: given secret, defaults elsewhere.
    pub fn with_secret(secret: impl Into<String>) -> Self {
        Self {
            bind_addr: "127.0.0.1:0".into(),
            pg_connection_url: String::new(),
            token: TokenConfig::new(secret),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}
