//! User administration handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use shared::{PaginatedResponse, Pagination, Role, User};

use crate::error::AppError;
use crate::middleware::CurrentUser;
use crate::services::user::CreateUserInput;
use crate::services::UserService;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct UserListQuery {
    pub role: Option<Role>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct SetActiveRequest {
    pub is_active: bool,
}

pub async fn list_users(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<UserListQuery>,
) -> Result<Json<PaginatedResponse<User>>, AppError> {
    let pagination = Pagination::normalized(query.page, query.per_page);
    let users = UserService::new(state.db.clone())
        .list(&user.actor(), query.role, pagination)
        .await?;
    Ok(Json(users))
}

/// Create a staff account with a role
pub async fn create_user(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(input): Json<CreateUserInput>,
) -> Result<(StatusCode, Json<User>), AppError> {
    let created = UserService::new(state.db.clone())
        .create(&user.actor(), input)
        .await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// PUT /users/:id/active
pub async fn set_user_active(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(user_id): Path<Uuid>,
    Json(body): Json<SetActiveRequest>,
) -> Result<Json<User>, AppError> {
    let updated = UserService::new(state.db.clone())
        .set_active(&user.actor(), user_id, body.is_active)
        .await?;
    Ok(Json(updated))
}
