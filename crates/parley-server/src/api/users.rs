//! User endpoints.

use axum::Json;
use axum::extract::{Path, State};
use serde::Deserialize;
use tracing::info;

use parley_core::ids::UserId;
use parley_core::models::User;

use crate::error::{ApiError, ApiResult};
use crate::server::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUser {
    pub username: String,
}

/// `POST /api/users`
pub async fn create(
    State(state): State<AppState>,
    Json(body): Json<CreateUser>,
) -> ApiResult<Json<User>> {
    let username = body.username.trim();
    if username.is_empty() {
        return Err(ApiError::BadRequest("username must not be empty".into()));
    }
    let user = state.store.create_user(username)?;
    info!(user_id = %user.id, username = %user.username, "user created");
    Ok(Json(user))
}

/// `GET /api/users`
pub async fn list(State(state): State<AppState>) -> ApiResult<Json<Vec<User>>> {
    Ok(Json(state.store.list_users()?))
}

/// `GET /api/users/{id}`
pub async fn get(
    State(state): State<AppState>,
    Path(id): Path<UserId>,
) -> ApiResult<Json<User>> {
    let user = state
        .store
        .get_user(&id)?
        .ok_or_else(|| ApiError::NotFound(format!("user {id}")))?;
    Ok(Json(user))
}
