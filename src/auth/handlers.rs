use axum::{extract::State, routing::post, Json, Router};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::{
    auth::{extractors::CurrentUser, jwt::TokenIssuer},
    errors::ApiError,
    extract::ApiJson,
    state::AppState,
    users::{dto::UserPublic, services},
};

/// Request body for login.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Response returned after a successful login.
#[derive(Debug, Serialize)]
pub struct Token {
    pub access_token: String,
    pub token_type: &'static str,
    pub expires_in: i64, // seconds
}

pub fn login_routes() -> Router<AppState> {
    Router::new()
        .route("/login/access-token", post(login_access_token))
        .route("/login/test-token", post(test_token))
}

#[instrument(skip(state, tokens, payload))]
pub async fn login_access_token(
    State(state): State<AppState>,
    State(tokens): State<TokenIssuer>,
    ApiJson(payload): ApiJson<LoginRequest>,
) -> Result<Json<Token>, ApiError> {
    let user = services::authenticate(state.repo.as_ref(), &payload.email, &payload.password).await?;
    if !user.is_active {
        warn!(user_id = user.id, "login by inactive user");
        return Err(ApiError::InactiveUser);
    }
    let access_token = tokens.issue(&user)?;
    info!(user_id = user.id, "user logged in");
    Ok(Json(Token {
        access_token,
        token_type: "bearer",
        expires_in: tokens.ttl().whole_seconds(),
    }))
}

#[instrument(skip_all)]
pub async fn test_token(CurrentUser(user): CurrentUser) -> Json<UserPublic> {
    Json(user.into())
}
