//! # tollgate_api
//!
//! HTTP API library for Tollgate.

pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;

use std::sync::Arc;

use axum::Router;
use axum::http::StatusCode;
use axum::routing::{get, post};
use sqlx::PgPool;
use tollgate_core::auth::access::AccessControlService;
use tollgate_core::auth::tokens::TokenService;
use tollgate_core::store::{
    CredentialStore, PgStore, RefreshTokenStore, RevocationCache, RolePermissionStore,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::config::ApiConfig;
use crate::handlers::auth;

/// Route paths.
pub mod routes {
    pub const POST_AUTH_LOGIN: &str = "/auth/login";
    pub const POST_AUTH_REGISTER: &str = "/auth/register";
    pub const POST_AUTH_REFRESH: &str = "/auth/refresh";
    pub const POST_AUTH_LOGOUT: &str = "/auth/logout";
    pub const GET_AUTH_CHECK_PERMISSION: &str = "/auth/check-permission";
    pub const GET_AUTH_ME: &str = "/auth/me";
}

/// Shared application state passed to all handlers.
///
/// Services are built once at startup and shared by reference.
#[derive(Clone)]
pub struct AppState {
    /// API configuration.
    pub config: ApiConfig,
    pub credentials: Arc<dyn CredentialStore>,
    pub roles: Arc<dyn RolePermissionStore>,
    pub tokens: TokenService,
    pub access: AccessControlService,
}

impl AppState {
    /// Wire the services over independent store implementations.
    pub fn new(
        config: ApiConfig,
        credentials: Arc<dyn CredentialStore>,
        refresh_tokens: Arc<dyn RefreshTokenStore>,
        revocations: Arc<dyn RevocationCache>,
        roles: Arc<dyn RolePermissionStore>,
    ) -> Self {
        let tokens = TokenService::new(&config.token, refresh_tokens, revocations);
        let access = AccessControlService::new(tokens.clone(), roles.clone());
        Self {
            config,
            credentials,
            roles,
            tokens,
            access,
        }
    }

    /// Wire the services over one store that implements every trait.
    pub fn with_store<S>(config: ApiConfig, store: Arc<S>) -> Self
    where
        S: CredentialStore + RefreshTokenStore + RevocationCache + RolePermissionStore + 'static,
    {
        Self::new(config, store.clone(), store.clone(), store.clone(), store)
    }

    /// PostgreSQL-backed state.
    pub fn postgres(config: ApiConfig, pool: PgPool) -> Self {
        Self::with_store(config, Arc::new(PgStore::new(pool)))
    }
}

/// Run embedded database migrations.
pub async fn migrate(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    tollgate_core::migrate::migrate(pool).await
}

/// Builds the Axum router with all routes and shared state.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Public routes; logout and check-permission read the bearer token themselves.
    let public = Router::new()
        .route(routes::POST_AUTH_LOGIN, post(auth::login_handler))
        .route(routes::POST_AUTH_REGISTER, post(auth::register_handler))
        .route(routes::POST_AUTH_REFRESH, post(auth::refresh_handler))
        .route(routes::POST_AUTH_LOGOUT, post(auth::logout_handler))
        .route(
            routes::GET_AUTH_CHECK_PERMISSION,
            get(auth::check_permission_handler),
        );

    // Protected routes (require a live access token)
    let protected = Router::new()
        .route(routes::GET_AUTH_ME, get(auth::me_handler))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::require_auth,
        ));

    let timeout = state.config.request_timeout;
    Router::new()
        .merge(public)
        .merge(protected)
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            timeout,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
