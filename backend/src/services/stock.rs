//! Shop stock ledger service

use std::sync::Arc;

use serde::Deserialize;
use uuid::Uuid;

use shared::workflow::check_shop_authority;
use shared::{
    validate_adjustment_amount, Actor, Capability, PaginatedResponse, Pagination, PaginationMeta,
    Role, ShopStockEntry, StockAdjustment, StockMove, StockOperation, StockReason,
};

use crate::error::{AppError, AppResult};
use crate::store::FulfillmentStore;

/// Manual stock correction as entered on the dashboard
#[derive(Debug, Clone, Deserialize)]
pub struct AdjustStockInput {
    pub product_variant_id: Uuid,
    pub operation: StockOperation,
    pub amount: i32,
    pub note: Option<String>,
}

#[derive(Clone)]
pub struct StockService {
    store: Arc<dyn FulfillmentStore>,
}

impl StockService {
    pub fn new(store: Arc<dyn FulfillmentStore>) -> Self {
        Self { store }
    }

    /// Admins act on every shop, managers on the shops they manage
    async fn authorize(&self, actor: &Actor, shop_id: Uuid) -> AppResult<()> {
        actor.require(Capability::AdjustStock)?;
        let manages = match actor.role {
            Role::Manager => self.store.manages_shop(actor.user_id, shop_id).await?,
            _ => false,
        };
        check_shop_authority(actor, shop_id, manages)?;
        Ok(())
    }

    pub async fn adjust(
        &self,
        actor: &Actor,
        shop_id: Uuid,
        input: AdjustStockInput,
    ) -> AppResult<ShopStockEntry> {
        self.authorize(actor, shop_id).await?;
        validate_adjustment_amount(input.amount).map_err(|msg| AppError::Validation {
            field: "amount".to_string(),
            message: msg.to_string(),
        })?;

        let delta = input.operation.delta(input.amount);
        let entry = self
            .store
            .adjust_stock(StockAdjustment {
                shop_id,
                product_variant_id: input.product_variant_id,
                delta,
                reason: StockReason::ManualAdjustment,
                note: input.note,
                actor_id: actor.user_id,
            })
            .await?;

        tracing::info!(
            %shop_id,
            variant_id = %input.product_variant_id,
            delta,
            quantity = entry.quantity,
            actor_id = %actor.user_id,
            "Stock adjusted"
        );
        Ok(entry)
    }

    pub async fn levels(&self, actor: &Actor, shop_id: Uuid) -> AppResult<Vec<ShopStockEntry>> {
        self.authorize(actor, shop_id).await?;
        self.store.stock_entries(shop_id).await
    }

    pub async fn moves(
        &self,
        actor: &Actor,
        shop_id: Uuid,
        pagination: Pagination,
    ) -> AppResult<PaginatedResponse<StockMove>> {
        self.authorize(actor, shop_id).await?;
        let page = self.store.stock_moves(shop_id, pagination).await?;
        Ok(PaginatedResponse {
            data: page.items,
            pagination: PaginationMeta::new(pagination, page.total),
        })
    }
}
