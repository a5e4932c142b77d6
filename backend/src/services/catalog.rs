//! Product catalog service: products, variants and materials

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use sqlx::PgPool;
use uuid::Uuid;

use shared::{
    validate_price, Actor, Capability, Entity, Material, Product, ProductVariant,
    ProductWithVariants, WorkflowError,
};

use crate::error::{AppError, AppResult};

const PRODUCT_COLUMNS: &str = "id, name, description, category, is_active, created_at, updated_at";
const VARIANT_COLUMNS: &str = "id, product_id, sku, name, material_id, color, dimensions, price, is_active, created_at, updated_at";

#[derive(Debug, sqlx::FromRow)]
struct ProductRow {
    id: Uuid,
    name: String,
    description: Option<String>,
    category: Option<String>,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ProductRow> for Product {
    fn from(row: ProductRow) -> Self {
        Product {
            id: row.id,
            name: row.name,
            description: row.description,
            category: row.category,
            is_active: row.is_active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct VariantRow {
    id: Uuid,
    product_id: Uuid,
    sku: String,
    name: String,
    material_id: Option<Uuid>,
    color: Option<String>,
    dimensions: Option<String>,
    price: Decimal,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<VariantRow> for ProductVariant {
    fn from(row: VariantRow) -> Self {
        ProductVariant {
            id: row.id,
            product_id: row.product_id,
            sku: row.sku,
            name: row.name,
            material_id: row.material_id,
            color: row.color,
            dimensions: row.dimensions,
            price: row.price,
            is_active: row.is_active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct MaterialRow {
    id: Uuid,
    name: String,
    kind: String,
    description: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<MaterialRow> for Material {
    fn from(row: MaterialRow) -> Self {
        Material {
            id: row.id,
            name: row.name,
            kind: row.kind,
            description: row.description,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateProductInput {
    pub name: String,
    pub description: Option<String>,
    pub category: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateProductInput {
    pub name: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct CreateVariantInput {
    pub sku: String,
    pub name: String,
    pub material_id: Option<Uuid>,
    pub color: Option<String>,
    pub dimensions: Option<String>,
    pub price: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct UpdateVariantInput {
    pub name: Option<String>,
    pub material_id: Option<Uuid>,
    pub color: Option<String>,
    pub dimensions: Option<String>,
    pub price: Option<Decimal>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct MaterialInput {
    pub name: String,
    pub kind: String,
    pub description: Option<String>,
}

/// Live name and price of a variant, as used when pricing a cart
#[derive(Debug, Clone)]
pub struct VariantQuote {
    pub label: String,
    pub price: Decimal,
}

fn non_empty(field: &str, value: &str) -> AppResult<()> {
    if value.trim().is_empty() {
        return Err(AppError::Validation {
            field: field.to_string(),
            message: format!("{} cannot be empty", field),
        });
    }
    Ok(())
}

fn check_price(price: Decimal) -> AppResult<()> {
    validate_price(price).map_err(|msg| AppError::Validation {
        field: "price".to_string(),
        message: msg.to_string(),
    })
}

fn sku_conflict(e: sqlx::Error, sku: &str) -> AppError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => AppError::Conflict {
            resource: "product_variant".to_string(),
            message: format!("SKU {} already exists", sku),
        },
        _ => AppError::DatabaseError(e),
    }
}

#[derive(Clone)]
pub struct CatalogService {
    db: PgPool,
}

impl CatalogService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Active products with their active variants
    pub async fn list_products(&self) -> AppResult<Vec<ProductWithVariants>> {
        let products = sqlx::query_as::<_, ProductRow>(&format!(
            "SELECT {} FROM products WHERE is_active = TRUE ORDER BY name",
            PRODUCT_COLUMNS
        ))
        .fetch_all(&self.db)
        .await?;

        let ids: Vec<Uuid> = products.iter().map(|p| p.id).collect();
        let variants = sqlx::query_as::<_, VariantRow>(&format!(
            "SELECT {} FROM product_variants WHERE product_id = ANY($1) AND is_active = TRUE ORDER BY price",
            VARIANT_COLUMNS
        ))
        .bind(&ids)
        .fetch_all(&self.db)
        .await?;

        let mut by_product: HashMap<Uuid, Vec<ProductVariant>> = HashMap::new();
        for variant in variants {
            by_product
                .entry(variant.product_id)
                .or_default()
                .push(variant.into());
        }

        Ok(products
            .into_iter()
            .map(|row| {
                let variants = by_product.remove(&row.id).unwrap_or_default();
                ProductWithVariants {
                    product: row.into(),
                    variants,
                }
            })
            .collect())
    }

    pub async fn get_product(&self, product_id: Uuid) -> AppResult<ProductWithVariants> {
        let product = sqlx::query_as::<_, ProductRow>(&format!(
            "SELECT {} FROM products WHERE id = $1",
            PRODUCT_COLUMNS
        ))
        .bind(product_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| WorkflowError::not_found(Entity::Product, product_id))?;

        let variants = sqlx::query_as::<_, VariantRow>(&format!(
            "SELECT {} FROM product_variants WHERE product_id = $1 ORDER BY price",
            VARIANT_COLUMNS
        ))
        .bind(product_id)
        .fetch_all(&self.db)
        .await?;

        Ok(ProductWithVariants {
            product: product.into(),
            variants: variants.into_iter().map(ProductVariant::from).collect(),
        })
    }

    pub async fn create_product(&self, actor: &Actor, input: CreateProductInput) -> AppResult<Product> {
        actor.require(Capability::ManageCatalog)?;
        non_empty("name", &input.name)?;

        let row = sqlx::query_as::<_, ProductRow>(&format!(
            "INSERT INTO products (name, description, category) VALUES ($1, $2, $3) RETURNING {}",
            PRODUCT_COLUMNS
        ))
        .bind(input.name.trim())
        .bind(&input.description)
        .bind(&input.category)
        .fetch_one(&self.db)
        .await?;

        tracing::info!(product_id = %row.id, "Product created");
        Ok(row.into())
    }

    pub async fn update_product(
        &self,
        actor: &Actor,
        product_id: Uuid,
        input: UpdateProductInput,
    ) -> AppResult<Product> {
        actor.require(Capability::ManageCatalog)?;
        if let Some(name) = &input.name {
            non_empty("name", name)?;
        }

        sqlx::query_as::<_, ProductRow>(&format!(
            r#"
            UPDATE products
            SET name = COALESCE($2, name),
                description = COALESCE($3, description),
                category = COALESCE($4, category),
                is_active = COALESCE($5, is_active),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            PRODUCT_COLUMNS
        ))
        .bind(product_id)
        .bind(input.name.as_deref().map(str::trim))
        .bind(&input.description)
        .bind(&input.category)
        .bind(input.is_active)
        .fetch_optional(&self.db)
        .await?
        .map(Product::from)
        .ok_or_else(|| WorkflowError::not_found(Entity::Product, product_id).into())
    }

    pub async fn create_variant(
        &self,
        actor: &Actor,
        product_id: Uuid,
        input: CreateVariantInput,
    ) -> AppResult<ProductVariant> {
        actor.require(Capability::ManageCatalog)?;
        non_empty("sku", &input.sku)?;
        non_empty("name", &input.name)?;
        check_price(input.price)?;

        let exists = sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM products WHERE id = $1)")
            .bind(product_id)
            .fetch_one(&self.db)
            .await?;
        if !exists {
            return Err(WorkflowError::not_found(Entity::Product, product_id).into());
        }

        let sku = input.sku.trim();
        let row = sqlx::query_as::<_, VariantRow>(&format!(
            r#"
            INSERT INTO product_variants (product_id, sku, name, material_id, color, dimensions, price)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {}
            "#,
            VARIANT_COLUMNS
        ))
        .bind(product_id)
        .bind(sku)
        .bind(input.name.trim())
        .bind(input.material_id)
        .bind(&input.color)
        .bind(&input.dimensions)
        .bind(input.price)
        .fetch_one(&self.db)
        .await
        .map_err(|e| sku_conflict(e, sku))?;

        tracing::info!(variant_id = %row.id, %product_id, "Variant created");
        Ok(row.into())
    }

    /// Update a variant. A new price applies to future orders only; order
    /// items keep the price captured when they were created.
    pub async fn update_variant(
        &self,
        actor: &Actor,
        variant_id: Uuid,
        input: UpdateVariantInput,
    ) -> AppResult<ProductVariant> {
        actor.require(Capability::ManageCatalog)?;
        if let Some(name) = &input.name {
            non_empty("name", name)?;
        }
        if let Some(price) = input.price {
            check_price(price)?;
        }

        let row = sqlx::query_as::<_, VariantRow>(&format!(
            r#"
            UPDATE product_variants
            SET name = COALESCE($2, name),
                material_id = COALESCE($3, material_id),
                color = COALESCE($4, color),
                dimensions = COALESCE($5, dimensions),
                price = COALESCE($6, price),
                is_active = COALESCE($7, is_active),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            VARIANT_COLUMNS
        ))
        .bind(variant_id)
        .bind(input.name.as_deref().map(str::trim))
        .bind(input.material_id)
        .bind(&input.color)
        .bind(&input.dimensions)
        .bind(input.price)
        .bind(input.is_active)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| WorkflowError::not_found(Entity::ProductVariant, variant_id))?;

        if let Some(price) = input.price {
            tracing::info!(%variant_id, %price, "Variant price changed");
        }
        Ok(row.into())
    }

    /// Live labels and prices of the active variants among `ids`
    pub async fn quotes(&self, ids: &[Uuid]) -> AppResult<HashMap<Uuid, VariantQuote>> {
        let rows = sqlx::query_as::<_, (Uuid, String, String, Decimal)>(
            r#"
            SELECT v.id, p.name, v.name, v.price
            FROM product_variants v
            JOIN products p ON p.id = v.product_id
            WHERE v.id = ANY($1) AND v.is_active = TRUE AND p.is_active = TRUE
            "#,
        )
        .bind(ids)
        .fetch_all(&self.db)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(id, product, variant, price)| {
                (
                    id,
                    VariantQuote {
                        label: format!("{} ({})", product, variant),
                        price,
                    },
                )
            })
            .collect())
    }

    /// Display labels for variants, including inactive ones
    pub async fn variant_labels(&self, ids: &[Uuid]) -> AppResult<HashMap<Uuid, String>> {
        let rows = sqlx::query_as::<_, (Uuid, String, String, String)>(
            r#"
            SELECT v.id, p.name, v.name, v.sku
            FROM product_variants v
            JOIN products p ON p.id = v.product_id
            WHERE v.id = ANY($1)
            "#,
        )
        .bind(ids)
        .fetch_all(&self.db)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(id, product, variant, sku)| (id, format!("{} ({}) [{}]", product, variant, sku)))
            .collect())
    }

    pub async fn list_materials(&self) -> AppResult<Vec<Material>> {
        let rows = sqlx::query_as::<_, MaterialRow>(
            "SELECT id, name, kind, description, created_at FROM materials ORDER BY kind, name",
        )
        .fetch_all(&self.db)
        .await?;

        Ok(rows.into_iter().map(Material::from).collect())
    }

    pub async fn create_material(&self, actor: &Actor, input: MaterialInput) -> AppResult<Material> {
        actor.require(Capability::ManageCatalog)?;
        non_empty("name", &input.name)?;
        non_empty("kind", &input.kind)?;

        let row = sqlx::query_as::<_, MaterialRow>(
            r#"
            INSERT INTO materials (name, kind, description)
            VALUES ($1, $2, $3)
            RETURNING id, name, kind, description, created_at
            "#,
        )
        .bind(input.name.trim())
        .bind(input.kind.trim())
        .bind(&input.description)
        .fetch_one(&self.db)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => AppError::Conflict {
                resource: "material".to_string(),
                message: format!("Material {} already exists", input.name.trim()),
            },
            _ => AppError::DatabaseError(e),
        })?;

        Ok(row.into())
    }

    pub async fn update_material(
        &self,
        actor: &Actor,
        material_id: Uuid,
        input: MaterialInput,
    ) -> AppResult<Material> {
        actor.require(Capability::ManageCatalog)?;
        non_empty("name", &input.name)?;
        non_empty("kind", &input.kind)?;

        sqlx::query_as::<_, MaterialRow>(
            r#"
            UPDATE materials
            SET name = $2, kind = $3, description = $4
            WHERE id = $1
            RETURNING id, name, kind, description, created_at
            "#,
        )
        .bind(material_id)
        .bind(input.name.trim())
        .bind(input.kind.trim())
        .bind(&input.description)
        .fetch_optional(&self.db)
        .await?
        .map(Material::from)
        .ok_or_else(|| WorkflowError::not_found(Entity::Material, material_id).into())
    }
}
