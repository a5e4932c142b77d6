//! Transactional persistence for the fulfillment workflow
//!
//! Every state-changing method is one unit of work: it either commits all of
//! its writes or none of them. Precondition checks run inside the unit of
//! work against freshly read rows, using the rules in `shared::workflow`.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use uuid::Uuid;

use shared::{
    Order, OrderCreation, OrderDetail, OrderDraft, OrderScope, OrderStatus, Pagination,
    ShipmentClaim, ShipmentDetail, ShipmentOutcome, ShopStockEntry, StockAdjustment, StockMove,
};

use crate::error::AppResult;

pub use memory::{FaultPoint, MemoryFulfillmentStore};
pub use postgres::PgFulfillmentStore;

/// Which orders to list
#[derive(Debug, Clone, Copy)]
pub struct OrderFilter {
    pub scope: OrderScope,
    pub status: Option<OrderStatus>,
    pub pagination: Pagination,
}

/// Which shipments to list. `driver_id = None` lists every driver's shipments.
#[derive(Debug, Clone, Copy)]
pub struct ShipmentFilter {
    pub driver_id: Option<Uuid>,
    pub open_only: bool,
    pub pagination: Pagination,
}

/// A page of rows plus the total row count
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
}

#[async_trait]
pub trait FulfillmentStore: Send + Sync {
    /// Whether `user_id` is assigned as manager of `shop_id`
    async fn manages_shop(&self, user_id: Uuid, shop_id: Uuid) -> AppResult<bool>;

    async fn stock_entries(&self, shop_id: Uuid) -> AppResult<Vec<ShopStockEntry>>;

    async fn stock_moves(&self, shop_id: Uuid, pagination: Pagination) -> AppResult<Page<StockMove>>;

    /// Apply a signed delta and append a move, rejecting levels below zero
    async fn adjust_stock(&self, adjustment: StockAdjustment) -> AppResult<ShopStockEntry>;

    /// Price the draft from live prices, reserve its shop-stock lines and
    /// insert the order with its items.
    ///
    /// A draft carrying a `payment_session_id` that was already materialized
    /// returns the existing order instead.
    async fn create_order(&self, draft: OrderDraft) -> AppResult<OrderCreation>;

    async fn find_order(&self, order_id: Uuid) -> AppResult<Option<OrderDetail>>;

    async fn list_orders(&self, filter: OrderFilter) -> AppResult<Page<Order>>;

    /// created → in_production
    async fn take_order(&self, order_id: Uuid, worker_id: Uuid) -> AppResult<Order>;

    /// in_production → ready_to_ship
    async fn mark_ready(&self, order_id: Uuid, worker_id: Uuid) -> AppResult<Order>;

    /// Any non-terminal status → cancelled. An order in transit takes its
    /// whole shipment with it.
    async fn cancel_order(&self, order_id: Uuid) -> AppResult<Order>;

    /// ready_to_ship → in_transit, opening a new shipment for the driver
    async fn claim_order(&self, claim: ShipmentClaim) -> AppResult<ShipmentDetail>;

    /// Resolve an in-transit shipment and every order in it
    async fn resolve_shipment(
        &self,
        shipment_id: Uuid,
        driver_id: Uuid,
        outcome: ShipmentOutcome,
    ) -> AppResult<ShipmentDetail>;

    async fn find_shipment(&self, shipment_id: Uuid) -> AppResult<Option<ShipmentDetail>>;

    async fn list_shipments(&self, filter: ShipmentFilter) -> AppResult<Page<ShipmentDetail>>;
}
