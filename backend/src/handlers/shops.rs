//! Shop and shop-stock HTTP handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use shared::{PaginatedResponse, Pagination, Shop, ShopManager, ShopStockEntry, StockMove};

use crate::error::AppError;
use crate::middleware::CurrentUser;
use crate::services::shop::{CreateShopInput, UpdateShopInput};
use crate::services::stock::AdjustStockInput;
use crate::services::{ShopService, StockService};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct AssignManagerRequest {
    pub user_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

/// Active shops (public, used for pickup selection)
pub async fn list_shops(State(state): State<AppState>) -> Result<Json<Vec<Shop>>, AppError> {
    let shops = ShopService::new(state.db.clone()).list_active().await?;
    Ok(Json(shops))
}

pub async fn create_shop(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(input): Json<CreateShopInput>,
) -> Result<(StatusCode, Json<Shop>), AppError> {
    let shop = ShopService::new(state.db.clone())
        .create(&user.actor(), input)
        .await?;
    Ok((StatusCode::CREATED, Json(shop)))
}

pub async fn update_shop(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(shop_id): Path<Uuid>,
    Json(input): Json<UpdateShopInput>,
) -> Result<Json<Shop>, AppError> {
    let shop = ShopService::new(state.db.clone())
        .update(&user.actor(), shop_id, input)
        .await?;
    Ok(Json(shop))
}

pub async fn list_managers(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(shop_id): Path<Uuid>,
) -> Result<Json<Vec<ShopManager>>, AppError> {
    let managers = ShopService::new(state.db.clone())
        .managers(&user.actor(), shop_id)
        .await?;
    Ok(Json(managers))
}

pub async fn assign_manager(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(shop_id): Path<Uuid>,
    Json(body): Json<AssignManagerRequest>,
) -> Result<(StatusCode, Json<ShopManager>), AppError> {
    let assignment = ShopService::new(state.db.clone())
        .assign_manager(&user.actor(), shop_id, body.user_id)
        .await?;
    Ok((StatusCode::CREATED, Json(assignment)))
}

pub async fn unassign_manager(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path((shop_id, user_id)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode, AppError> {
    ShopService::new(state.db.clone())
        .unassign_manager(&user.actor(), shop_id, user_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /shops/:id/stock
pub async fn get_stock(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(shop_id): Path<Uuid>,
) -> Result<Json<Vec<ShopStockEntry>>, AppError> {
    let levels = StockService::new(state.store.clone())
        .levels(&user.actor(), shop_id)
        .await?;
    Ok(Json(levels))
}

/// GET /shops/:id/stock/moves
pub async fn list_stock_moves(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(shop_id): Path<Uuid>,
    Query(query): Query<PageQuery>,
) -> Result<Json<PaginatedResponse<StockMove>>, AppError> {
    let pagination = Pagination::normalized(query.page, query.per_page);
    let moves = StockService::new(state.store.clone())
        .moves(&user.actor(), shop_id, pagination)
        .await?;
    Ok(Json(moves))
}

/// POST /shops/:id/stock/adjust
pub async fn adjust_stock(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(shop_id): Path<Uuid>,
    Json(input): Json<AdjustStockInput>,
) -> Result<Json<ShopStockEntry>, AppError> {
    let entry = StockService::new(state.store.clone())
        .adjust(&user.actor(), shop_id, input)
        .await?;
    Ok(Json(entry))
}
