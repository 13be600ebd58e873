//! Authentication request handlers.

use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::{Extension, Json};

use crate::AppState;
use crate::error::AppResult;
use crate::middleware::auth::{AuthenticatedUser, bearer_token};
use crate::models::{
    CheckPermissionQuery, LoginRequest, LogoutRequest, MeResponse, MessageResponse,
    RefreshRequest, RegisterRequest, TokenResponse,
};
use crate::services::auth;

/// `POST /auth/login`: authenticate with email + password.
pub async fn login_handler(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> AppResult<Json<TokenResponse>> {
    let resp = auth::login(&state, &body.email, &body.password).await?;
    Ok(Json(resp))
}

/// `POST /auth/register`: create a new user account.
pub async fn register_handler(
    State(state): State<AppState>,
    Json(body): Json<RegisterRequest>,
) -> AppResult<Json<TokenResponse>> {
    let resp = auth::register(&state, &body.email, &body.password, body.name.as_deref()).await?;
    Ok(Json(resp))
}

/// `POST /auth/refresh`: exchange a refresh token for a new token pair.
pub async fn refresh_handler(
    State(state): State<AppState>,
    Json(body): Json<RefreshRequest>,
) -> AppResult<Json<TokenResponse>> {
    let resp = auth::refresh(&state, &body.refresh_token).await?;
    Ok(Json(resp))
}

/// `POST /auth/logout`: revoke the refresh token in the body and the
/// access token in the `Authorization` header.
pub async fn logout_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<LogoutRequest>,
) -> AppResult<Json<MessageResponse>> {
    let access_token = bearer_token(&headers)?;
    let resp = auth::logout(&state, access_token, &body.refresh_token).await?;
    Ok(Json(resp))
}

/// `GET /auth/check-permission?resource=&http_method=`
pub async fn check_permission_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<CheckPermissionQuery>,
) -> AppResult<Json<MessageResponse>> {
    let access_token = bearer_token(&headers)?;
    let resp =
        auth::check_permission(&state, access_token, &query.resource, &query.http_method).await?;
    Ok(Json(resp))
}

/// `GET /auth/me`: claims of the authenticated caller.
pub async fn me_handler(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
) -> AppResult<Json<MeResponse>> {
    let resp = auth::me(&state, &user.0).await?;
    Ok(Json(resp))
}
