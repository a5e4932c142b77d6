//! Shipment HTTP handlers

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use shared::{PaginatedResponse, Pagination, ShipmentDetail, ShipmentOutcome};

use crate::error::AppError;
use crate::middleware::{AuthUser, CurrentUser};
use crate::services::ShipmentService;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ShipmentListQuery {
    #[serde(default)]
    pub open_only: bool,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

pub async fn list_shipments(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<ShipmentListQuery>,
) -> Result<Json<PaginatedResponse<ShipmentDetail>>, AppError> {
    let pagination = Pagination::normalized(query.page, query.per_page);
    let shipments = ShipmentService::new(state.store.clone())
        .list(&user.actor(), query.open_only, pagination)
        .await?;
    Ok(Json(shipments))
}

pub async fn get_shipment(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(shipment_id): Path<Uuid>,
) -> Result<Json<ShipmentDetail>, AppError> {
    let detail = ShipmentService::new(state.store.clone())
        .get(&user.actor(), shipment_id)
        .await?;
    Ok(Json(detail))
}

async fn resolve(
    state: AppState,
    user: AuthUser,
    shipment_id: Uuid,
    outcome: ShipmentOutcome,
) -> Result<Json<ShipmentDetail>, AppError> {
    let detail = ShipmentService::new(state.store.clone())
        .resolve(&user.actor(), shipment_id, outcome)
        .await?;
    Ok(Json(detail))
}

/// POST /shipments/:id/deliver
pub async fn deliver_shipment(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(shipment_id): Path<Uuid>,
) -> Result<Json<ShipmentDetail>, AppError> {
    resolve(state, user, shipment_id, ShipmentOutcome::Delivered).await
}

/// POST /shipments/:id/cancel
pub async fn cancel_shipment(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(shipment_id): Path<Uuid>,
) -> Result<Json<ShipmentDetail>, AppError> {
    resolve(state, user, shipment_id, ShipmentOutcome::Cancelled).await
}
