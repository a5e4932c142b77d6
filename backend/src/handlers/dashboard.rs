//! Dashboard handler

use axum::{extract::State, Json};

use crate::error::AppError;
use crate::middleware::CurrentUser;
use crate::services::dashboard::DashboardSummary;
use crate::services::DashboardService;
use crate::AppState;

pub async fn get_dashboard(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<DashboardSummary>, AppError> {
    let summary = DashboardService::new(state.db.clone())
        .summary(&user.actor())
        .await?;
    Ok(Json(summary))
}
