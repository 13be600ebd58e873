//! Authentication middleware: Bearer token extraction and access-token checks.

use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use tollgate_core::models::auth::TokenClaims;

use crate::AppState;
use crate::error::AppError;

/// Key used to store verified `TokenClaims` in request extensions.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub TokenClaims);

/// Raw token from `Authorization: Bearer <token>`.
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, AppError> {
    let header = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::Unauthorized("Missing authorization header".into()))?;

    header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AppError::Unauthorized("Invalid authorization scheme".into()))
}

/// Axum middleware: verifies the bearer token (signature, expiry and
/// revocation) and injects `AuthenticatedUser` into request extensions.
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = bearer_token(request.headers())?.to_owned();
    let claims = state.tokens.check_access_token(&token).await?;

    request.extensions_mut().insert(AuthenticatedUser(claims));

    Ok(next.run(request).await)
}
