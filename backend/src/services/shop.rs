//! Shop and shop-manager service

use chrono::{DateTime, Utc};
use serde::Deserialize;
use sqlx::PgPool;
use uuid::Uuid;

use shared::{Actor, Capability, Entity, Role, Shop, ShopManager, WorkflowError};

use crate::error::{AppError, AppResult};

#[derive(Debug, sqlx::FromRow)]
struct ShopRow {
    id: Uuid,
    city: String,
    street: String,
    is_active: bool,
    created_at: DateTime<Utc>,
}

impl From<ShopRow> for Shop {
    fn from(row: ShopRow) -> Self {
        Shop {
            id: row.id,
            city: row.city,
            street: row.street,
            is_active: row.is_active,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateShopInput {
    pub city: String,
    pub street: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateShopInput {
    pub city: Option<String>,
    pub street: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Clone)]
pub struct ShopService {
    db: PgPool,
}

fn required(field: &str, value: &str) -> AppResult<()> {
    if value.trim().is_empty() {
        return Err(AppError::Validation {
            field: field.to_string(),
            message: format!("{} is required", field),
        });
    }
    Ok(())
}

impl ShopService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Active shops, as offered for pickup
    pub async fn list_active(&self) -> AppResult<Vec<Shop>> {
        let rows = sqlx::query_as::<_, ShopRow>(
            "SELECT id, city, street, is_active, created_at FROM shops WHERE is_active = TRUE ORDER BY city, street",
        )
        .fetch_all(&self.db)
        .await?;

        Ok(rows.into_iter().map(Shop::from).collect())
    }

    pub async fn get(&self, shop_id: Uuid) -> AppResult<Shop> {
        sqlx::query_as::<_, ShopRow>(
            "SELECT id, city, street, is_active, created_at FROM shops WHERE id = $1",
        )
        .bind(shop_id)
        .fetch_optional(&self.db)
        .await?
        .map(Shop::from)
        .ok_or_else(|| WorkflowError::not_found(Entity::Shop, shop_id).into())
    }

    pub async fn create(&self, actor: &Actor, input: CreateShopInput) -> AppResult<Shop> {
        actor.require(Capability::ManageShops)?;
        required("city", &input.city)?;
        required("street", &input.street)?;

        let row = sqlx::query_as::<_, ShopRow>(
            r#"
            INSERT INTO shops (city, street)
            VALUES ($1, $2)
            RETURNING id, city, street, is_active, created_at
            "#,
        )
        .bind(input.city.trim())
        .bind(input.street.trim())
        .fetch_one(&self.db)
        .await?;

        tracing::info!(shop_id = %row.id, "Shop created");
        Ok(Shop::from(row))
    }

    pub async fn update(&self, actor: &Actor, shop_id: Uuid, input: UpdateShopInput) -> AppResult<Shop> {
        actor.require(Capability::ManageShops)?;
        if let Some(city) = &input.city {
            required("city", city)?;
        }
        if let Some(street) = &input.street {
            required("street", street)?;
        }

        sqlx::query_as::<_, ShopRow>(
            r#"
            UPDATE shops
            SET city = COALESCE($2, city),
                street = COALESCE($3, street),
                is_active = COALESCE($4, is_active)
            WHERE id = $1
            RETURNING id, city, street, is_active, created_at
            "#,
        )
        .bind(shop_id)
        .bind(input.city.as_deref().map(str::trim))
        .bind(input.street.as_deref().map(str::trim))
        .bind(input.is_active)
        .fetch_optional(&self.db)
        .await?
        .map(Shop::from)
        .ok_or_else(|| WorkflowError::not_found(Entity::Shop, shop_id).into())
    }

    pub async fn managers(&self, actor: &Actor, shop_id: Uuid) -> AppResult<Vec<ShopManager>> {
        actor.require(Capability::ManageShops)?;
        let rows = sqlx::query_as::<_, (Uuid, Uuid, DateTime<Utc>)>(
            "SELECT shop_id, user_id, assigned_at FROM shop_managers WHERE shop_id = $1 ORDER BY assigned_at",
        )
        .bind(shop_id)
        .fetch_all(&self.db)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(shop_id, user_id, assigned_at)| ShopManager {
                shop_id,
                user_id,
                assigned_at,
            })
            .collect())
    }

    /// Assign a manager-role user to a shop
    pub async fn assign_manager(&self, actor: &Actor, shop_id: Uuid, user_id: Uuid) -> AppResult<ShopManager> {
        actor.require(Capability::ManageShops)?;
        self.get(shop_id).await?;

        let role = sqlx::query_scalar::<_, String>("SELECT role FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| WorkflowError::not_found(Entity::User, user_id))?;

        if role != Role::Manager.as_str() {
            return Err(AppError::Validation {
                field: "user_id".to_string(),
                message: "Only users with the manager role can be assigned to a shop".to_string(),
            });
        }

        let (shop_id, user_id, assigned_at) = sqlx::query_as::<_, (Uuid, Uuid, DateTime<Utc>)>(
            r#"
            INSERT INTO shop_managers (shop_id, user_id)
            VALUES ($1, $2)
            ON CONFLICT (shop_id, user_id) DO UPDATE SET shop_id = EXCLUDED.shop_id
            RETURNING shop_id, user_id, assigned_at
            "#,
        )
        .bind(shop_id)
        .bind(user_id)
        .fetch_one(&self.db)
        .await?;

        tracing::info!(%shop_id, %user_id, "Manager assigned to shop");
        Ok(ShopManager {
            shop_id,
            user_id,
            assigned_at,
        })
    }

    pub async fn unassign_manager(&self, actor: &Actor, shop_id: Uuid, user_id: Uuid) -> AppResult<()> {
        actor.require(Capability::ManageShops)?;

        let result = sqlx::query("DELETE FROM shop_managers WHERE shop_id = $1 AND user_id = $2")
            .bind(shop_id)
            .bind(user_id)
            .execute(&self.db)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Shop manager assignment".to_string()));
        }

        tracing::info!(%shop_id, %user_id, "Manager unassigned from shop");
        Ok(())
    }
}
