//! Catalog HTTP handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use shared::{Material, Product, ProductVariant, ProductWithVariants};

use crate::error::AppError;
use crate::middleware::CurrentUser;
use crate::services::catalog::{
    CatalogService, CreateProductInput, CreateVariantInput, MaterialInput, UpdateProductInput,
    UpdateVariantInput,
};
use crate::AppState;

/// Active products with their variants
pub async fn list_products(
    State(state): State<AppState>,
) -> Result<Json<Vec<ProductWithVariants>>, AppError> {
    let products = CatalogService::new(state.db.clone()).list_products().await?;
    Ok(Json(products))
}

pub async fn get_product(
    State(state): State<AppState>,
    Path(product_id): Path<Uuid>,
) -> Result<Json<ProductWithVariants>, AppError> {
    let product = CatalogService::new(state.db.clone()).get_product(product_id).await?;
    Ok(Json(product))
}

pub async fn create_product(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(input): Json<CreateProductInput>,
) -> Result<(StatusCode, Json<Product>), AppError> {
    let service = CatalogService::new(state.db.clone());
    let product = service.create_product(&user.actor(), input).await?;
    Ok((StatusCode::CREATED, Json(product)))
}

pub async fn update_product(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(product_id): Path<Uuid>,
    Json(input): Json<UpdateProductInput>,
) -> Result<Json<Product>, AppError> {
    let service = CatalogService::new(state.db.clone());
    let product = service.update_product(&user.actor(), product_id, input).await?;
    Ok(Json(product))
}

pub async fn create_variant(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(product_id): Path<Uuid>,
    Json(input): Json<CreateVariantInput>,
) -> Result<(StatusCode, Json<ProductVariant>), AppError> {
    let service = CatalogService::new(state.db.clone());
    let variant = service.create_variant(&user.actor(), product_id, input).await?;
    Ok((StatusCode::CREATED, Json(variant)))
}

pub async fn update_variant(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(variant_id): Path<Uuid>,
    Json(input): Json<UpdateVariantInput>,
) -> Result<Json<ProductVariant>, AppError> {
    let service = CatalogService::new(state.db.clone());
    let variant = service.update_variant(&user.actor(), variant_id, input).await?;
    Ok(Json(variant))
}

pub async fn list_materials(State(state): State<AppState>) -> Result<Json<Vec<Material>>, AppError> {
    let materials = CatalogService::new(state.db.clone()).list_materials().await?;
    Ok(Json(materials))
}

pub async fn create_material(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(input): Json<MaterialInput>,
) -> Result<(StatusCode, Json<Material>), AppError> {
    let service = CatalogService::new(state.db.clone());
    let material = service.create_material(&user.actor(), input).await?;
    Ok((StatusCode::CREATED, Json(material)))
}

pub async fn update_material(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(material_id): Path<Uuid>,
    Json(input): Json<MaterialInput>,
) -> Result<Json<Material>, AppError> {
    let service = CatalogService::new(state.db.clone());
    let material = service.update_material(&user.actor(), material_id, input).await?;
    Ok(Json(material))
}
