//! Authentication handlers

use axum::{extract::State, http::StatusCode, Json};
use serde::Deserialize;

use shared::User;

use crate::error::AppError;
use crate::middleware::CurrentUser;
use crate::services::auth::{AuthSession, AuthTokens, RegisterCustomerInput};
use crate::services::{AuthService, UserService};
use crate::AppState;

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Customer self-registration
/// POST /auth/register
pub async fn register(
    State(state): State<AppState>,
    Json(body): Json<RegisterCustomerInput>,
) -> Result<(StatusCode, Json<AuthSession>), AppError> {
    let auth_service = AuthService::new(state.db.clone(), &state.config);
    let session = auth_service.register_customer(body).await?;

    Ok((StatusCode::CREATED, Json(session)))
}

/// Login endpoint handler
pub async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> Result<Json<AuthSession>, AppError> {
    let auth_service = AuthService::new(state.db.clone(), &state.config);
    let session = auth_service.login(&body.email, &body.password).await?;

    Ok(Json(session))
}

/// Refresh token endpoint handler
pub async fn refresh(
    State(state): State<AppState>,
    Json(body): Json<RefreshRequest>,
) -> Result<Json<AuthTokens>, AppError> {
    let auth_service = AuthService::new(state.db.clone(), &state.config);
    let tokens = auth_service.refresh_token(&body.refresh_token).await?;

    Ok(Json(tokens))
}

/// Profile of the signed-in user
pub async fn me(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<User>, AppError> {
    let user = UserService::new(state.db.clone()).get(user.user_id).await?;
    Ok(Json(user))
}
