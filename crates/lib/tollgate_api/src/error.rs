//! Application error types.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tollgate_core::auth::AuthError;
use tracing::error;

use crate::models::ErrorResponse;

/// Convenience alias for handler return types.
pub type AppResult<T> = Result<T, AppError>;

/// Application-level errors with HTTP status mapping.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Token expired: {0}")]
    TokenExpired(String),

    #[error("Token revoked: {0}")]
    TokenRevoked(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Internal server error")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, message) = match &self {
            AppError::Validation(m) => (StatusCode::BAD_REQUEST, "validation_error", m.as_str()),
            AppError::Unauthorized(m) => (StatusCode::UNAUTHORIZED, "unauthorized", m.as_str()),
            AppError::TokenExpired(m) => (StatusCode::UNAUTHORIZED, "token_expired", m.as_str()),
            AppError::TokenRevoked(m) => (StatusCode::UNAUTHORIZED, "token_revoked", m.as_str()),
            AppError::Forbidden(m) => (StatusCode::FORBIDDEN, "forbidden", m.as_str()),
            AppError::Internal(detail) => {
                error!(%detail, "internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "Internal server error",
                )
            }
        };
        let body = Json(ErrorResponse {
            error: error.to_string(),
            message: message.to_string(),
        });
        (status, body).into_response()
    }
}

impl From<AuthError> for AppError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::InvalidCredentials
            | AuthError::InvalidToken
            | AuthError::InvalidRefreshToken => AppError::Unauthorized(e.to_string()),
            AuthError::TokenExpired => AppError::TokenExpired(e.to_string()),
            AuthError::TokenRevoked => AppError::TokenRevoked(e.to_string()),
            AuthError::PermissionDenied => AppError::Forbidden(e.to_string()),
            AuthError::Validation(msg) => AppError::Validation(msg),
            AuthError::Config(msg) | AuthError::Internal(msg) => AppError::Internal(msg),
            AuthError::Db(e) => AppError::Internal(e.to_string()),
        }
    }
}
