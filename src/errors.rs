use axum::{
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::{auth::jwt::TokenError, users::services::AccountError};

/// Everything a handler or extractor can reject with. Rendered as `{"detail": ...}`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Account(#[from] AccountError),
    #[error(transparent)]
    Token(#[from] TokenError),
    #[error("{0}")]
    Unauthorized(&'static str),
    #[error("Inactive user")]
    InactiveUser,
    #[error("The user doesn't have enough privileges")]
    Forbidden,
    #[error(transparent)]
    Json(#[from] JsonRejection),
    #[error(transparent)]
    Path(#[from] PathRejection),
    #[error(transparent)]
    Query(#[from] QueryRejection),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Account(e) => match e {
                AccountError::NotFound => StatusCode::NOT_FOUND,
                AccountError::DuplicateEmail
                | AccountError::WrongPassword
                | AccountError::SamePassword
                | AccountError::InvalidCredentials => StatusCode::BAD_REQUEST,
                AccountError::EmailConflict => StatusCode::CONFLICT,
                AccountError::SuperuserSelfDelete | AccountError::RegistrationClosed => {
                    StatusCode::FORBIDDEN
                }
                AccountError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
                AccountError::Storage(_) | AccountError::Internal(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
            ApiError::Token(TokenError::Encode(_) | TokenError::ExpiryOutOfRange) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ApiError::Token(_) | ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::InactiveUser => StatusCode::BAD_REQUEST,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::Json(r) => r.status(),
            ApiError::Path(r) => r.status(),
            ApiError::Query(r) => r.status(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let detail = if status.is_server_error() {
            error!(error = %self, "request failed");
            "Internal server error".to_string()
        } else {
            self.to_string()
        };
        let body = Json(json!({ "detail": detail }));
        if status == StatusCode::UNAUTHORIZED {
            return (status, [(header::WWW_AUTHENTICATE, "Bearer")], body).into_response();
        }
        (status, body).into_response()
    }
}
