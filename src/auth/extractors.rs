use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header, request::Parts},
};
use tracing::warn;

use crate::{errors::ApiError, state::AppState, users::repo_types::User};

/// Active user resolved from the `Authorization: Bearer` token.
pub struct CurrentUser(pub User);

/// Active user that also holds the superuser capability.
pub struct SuperUser(pub User);

fn bearer(parts: &Parts) -> Result<&str, ApiError> {
    let auth = parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .ok_or(ApiError::Unauthorized("Not authenticated"))?;
    auth.strip_prefix("Bearer ")
        .or_else(|| auth.strip_prefix("bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or(ApiError::Unauthorized("Invalid authentication scheme"))
}

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = bearer(parts)?;
        let user_id = state.tokens.validate(token).map_err(|e| {
            warn!(error = %e, "rejected bearer token");
            e
        })?;

        let user = crate::users::services::get(state.repo.as_ref(), user_id).await?;
        if !user.is_active {
            return Err(ApiError::InactiveUser);
        }
        Ok(CurrentUser(user))
    }
}

#[async_trait]
impl FromRequestParts<AppState> for SuperUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let CurrentUser(user) = CurrentUser::from_request_parts(parts, state).await?;
        if !user.is_superuser {
            warn!(user_id = user.id, "superuser capability required");
            return Err(ApiError::Forbidden);
        }
        Ok(SuperUser(user))
    }
}
