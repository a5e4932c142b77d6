//! Order HTTP handlers

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use shared::{Order, OrderDetail, OrderStatus, PaginatedResponse, Pagination, ShipmentDetail};

use crate::error::AppError;
use crate::middleware::CurrentUser;
use crate::services::order::CreateOrderInput;
use crate::services::shipment::ClaimInput;
use crate::services::{OrderService, ReceiptService, ShipmentService};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct OrderListQuery {
    pub status: Option<OrderStatus>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

/// Orders within the caller's scope
/// GET /orders
pub async fn list_orders(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<OrderListQuery>,
) -> Result<Json<PaginatedResponse<Order>>, AppError> {
    let pagination = Pagination::normalized(query.page, query.per_page);
    let orders = OrderService::new(state.store.clone())
        .list(&user.actor(), query.status, pagination)
        .await?;
    Ok(Json(orders))
}

/// Staff order entry
/// POST /orders
pub async fn create_order(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(input): Json<CreateOrderInput>,
) -> Result<(StatusCode, Json<OrderDetail>), AppError> {
    let detail = OrderService::new(state.store.clone())
        .create(&user.actor(), input)
        .await?;
    Ok((StatusCode::CREATED, Json(detail)))
}

pub async fn get_order(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(order_id): Path<Uuid>,
) -> Result<Json<OrderDetail>, AppError> {
    let detail = OrderService::new(state.store.clone())
        .get(&user.actor(), order_id)
        .await?;
    Ok(Json(detail))
}

/// CSV receipt download
/// GET /orders/:id/receipt
pub async fn get_receipt(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(order_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let receipt = ReceiptService::new(state.db.clone(), state.store.clone())
        .render(&user.actor(), order_id)
        .await?;

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", receipt.filename),
            ),
        ],
        receipt.body,
    ))
}

/// Factory worker takes the order into production
pub async fn take_order(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(order_id): Path<Uuid>,
) -> Result<Json<Order>, AppError> {
    let order = OrderService::new(state.store.clone())
        .take(&user.actor(), order_id)
        .await?;
    Ok(Json(order))
}

pub async fn mark_ready(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(order_id): Path<Uuid>,
) -> Result<Json<Order>, AppError> {
    let order = OrderService::new(state.store.clone())
        .mark_ready(&user.actor(), order_id)
        .await?;
    Ok(Json(order))
}

/// Driver claims a ready order, opening a shipment
/// POST /orders/:id/claim
///
/// The body is optional; when one is sent it must be a valid claim.
pub async fn claim_order(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(order_id): Path<Uuid>,
    body: Bytes,
) -> Result<(StatusCode, Json<ShipmentDetail>), AppError> {
    let input = claim_input(&body)?;
    let detail = ShipmentService::new(state.store.clone())
        .claim(&user.actor(), order_id, input)
        .await?;
    Ok((StatusCode::CREATED, Json(detail)))
}

pub async fn cancel_order(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(order_id): Path<Uuid>,
) -> Result<Json<Order>, AppError> {
    let order = OrderService::new(state.store.clone())
        .cancel(&user.actor(), order_id)
        .await?;
    Ok(Json(order))
}

fn claim_input(body: &[u8]) -> Result<ClaimInput, AppError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(ClaimInput::default());
    }
    serde_json::from_slice(body)
        .map_err(|e| AppError::ValidationError(format!("Invalid claim body: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_claim_body_uses_defaults() {
        for body in [&b""[..], b"  \n"] {
            let input = claim_input(body).unwrap();
            assert!(input.route_hint.is_none());
            assert!(input.comment.is_none());
        }
    }

    #[test]
    fn test_claim_body_parsed() {
        let input = claim_input(br#"{"route_hint": "Podil", "comment": "fragile"}"#).unwrap();
        assert_eq!(input.route_hint.as_deref(), Some("Podil"));
        assert_eq!(input.comment.as_deref(), Some("fragile"));
    }

    #[test]
    fn test_malformed_claim_body_rejected() {
        for body in [&br#"{"route_hint": "#[..], b"route_hint=Podil", br#"{"route_hint": 7}"#] {
            assert!(matches!(claim_input(body), Err(AppError::ValidationError(_))));
        }
    }
}
