use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, patch, post},
    Json, Router,
};
use tracing::{instrument, warn};

use crate::{
    auth::extractors::{CurrentUser, SuperUser},
    errors::ApiError,
    extract::{ApiJson, ApiPath, ApiQuery},
    state::AppState,
    users::{
        dto::{
            Message, Pagination, UpdatePassword, UserCreate, UserPublic, UserRegister, UserUpdate,
            UserUpdateMe, UsersPublic,
        },
        services::{self, AccountError},
    },
};

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users).post(create_user))
        .route("/users/signup", post(register_user))
        .route(
            "/users/me",
            get(read_user_me).patch(update_user_me).delete(delete_user_me),
        )
        .route("/users/me/password", patch(update_password_me))
        .route(
            "/users/:user_id",
            get(read_user)
                .patch(update_user)
                .put(update_user)
                .delete(delete_user),
        )
}

#[instrument(skip(state, payload))]
pub async fn register_user(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<UserRegister>,
) -> Result<(StatusCode, Json<UserPublic>), ApiError> {
    let user = services::register(state.repo.as_ref(), &state.config.users, payload).await?;
    Ok((StatusCode::CREATED, Json(user.into())))
}

#[instrument(skip(state, payload, admin), fields(admin_id = admin.id))]
pub async fn create_user(
    State(state): State<AppState>,
    SuperUser(admin): SuperUser,
    ApiJson(payload): ApiJson<UserCreate>,
) -> Result<(StatusCode, Json<UserPublic>), ApiError> {
    let user = services::create_by_admin(state.repo.as_ref(), payload).await?;
    Ok((StatusCode::CREATED, Json(user.into())))
}

#[instrument(skip(state, _admin))]
pub async fn list_users(
    State(state): State<AppState>,
    SuperUser(_admin): SuperUser,
    ApiQuery(p): ApiQuery<Pagination>,
) -> Result<Json<UsersPublic>, ApiError> {
    let (users, count) = services::list(state.repo.as_ref(), p.skip, p.limit).await?;
    Ok(Json(UsersPublic {
        data: users.into_iter().map(UserPublic::from).collect(),
        count,
    }))
}

#[instrument(skip_all)]
pub async fn read_user_me(CurrentUser(user): CurrentUser) -> Json<UserPublic> {
    Json(user.into())
}

#[instrument(skip(state, user, payload), fields(user_id = user.id))]
pub async fn update_user_me(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ApiJson(payload): ApiJson<UserUpdateMe>,
) -> Result<Json<UserPublic>, ApiError> {
    let user = services::update_self(state.repo.as_ref(), &user, payload).await?;
    Ok(Json(user.into()))
}

#[instrument(skip(state, user, payload), fields(user_id = user.id))]
pub async fn update_password_me(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ApiJson(payload): ApiJson<UpdatePassword>,
) -> Result<Json<Message>, ApiError> {
    services::change_password(
        state.repo.as_ref(),
        &user,
        &payload.current_password,
        &payload.new_password,
    )
    .await?;
    Ok(Json(Message::new("Password updated successfully")))
}

#[instrument(skip(state, user), fields(user_id = user.id))]
pub async fn delete_user_me(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<Message>, ApiError> {
    services::delete_self(state.repo.as_ref(), &user).await?;
    Ok(Json(Message::new("User deleted successfully")))
}

/// Users may read themselves; anyone else needs the superuser capability.
#[instrument(skip(state, caller), fields(caller_id = caller.id))]
pub async fn read_user(
    State(state): State<AppState>,
    CurrentUser(caller): CurrentUser,
    ApiPath(user_id): ApiPath<i64>,
) -> Result<Json<UserPublic>, ApiError> {
    if caller.id == user_id {
        return Ok(Json(caller.into()));
    }
    if !caller.is_superuser {
        warn!(user_id, "read of another user without privileges");
        return Err(ApiError::Forbidden);
    }
    let user = services::get(state.repo.as_ref(), user_id).await?;
    Ok(Json(user.into()))
}

#[instrument(skip(state, admin, payload), fields(admin_id = admin.id))]
pub async fn update_user(
    State(state): State<AppState>,
    SuperUser(admin): SuperUser,
    ApiPath(user_id): ApiPath<i64>,
    ApiJson(payload): ApiJson<UserUpdate>,
) -> Result<Json<UserPublic>, ApiError> {
    let user = services::update_by_admin(state.repo.as_ref(), user_id, payload).await?;
    Ok(Json(user.into()))
}

#[instrument(skip(state, admin), fields(admin_id = admin.id))]
pub async fn delete_user(
    State(state): State<AppState>,
    SuperUser(admin): SuperUser,
    ApiPath(user_id): ApiPath<i64>,
) -> Result<Json<Message>, ApiError> {
    // Same rule as DELETE /users/me.
    if admin.id == user_id {
        return Err(AccountError::SuperuserSelfDelete.into());
    }
    services::delete_by_admin(state.repo.as_ref(), user_id).await?;
    Ok(Json(Message::new("User deleted successfully")))
}
