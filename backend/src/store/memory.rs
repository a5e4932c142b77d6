//! In-process fulfillment store
//!
//! Backs the test-suite and local demos. Every operation runs under the
//! write lock on a staged copy of the data, which replaces the published
//! copy only when the operation succeeds, so a failing operation leaves no
//! trace. Faults can be injected at the points where a partial write would
//! otherwise be observable.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::sync::RwLock;
use uuid::Uuid;

use shared::pricing::price_lines;
use shared::stock::{aggregate_requirements, apply_delta, plan_reservation};
use shared::workflow::{
    cascade_status, check_cancel, check_claim, check_mark_ready, check_resolve, check_take,
};
use shared::{
    validate_order_draft, Entity, Order, OrderCreation, OrderDetail, OrderDraft, OrderItem,
    OrderScope, OrderStatus, Pagination, Shipment, ShipmentClaim, ShipmentDetail, ShipmentOrder,
    ShipmentOutcome, ShipmentStatus, ShopStockEntry, StockAdjustment, StockMove, StockReason,
    WorkflowError,
};

use super::{FulfillmentStore, OrderFilter, Page, ShipmentFilter};
use crate::error::{AppError, AppResult};

/// Where an injected fault aborts an operation. Each fault fires once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultPoint {
    /// Fail a shipment cascade after this many orders were updated
    ResolveCascade { after_orders: usize },
    /// Fail order creation after stock rows were decremented
    StockReservation,
}

#[derive(Debug, Clone, Default)]
struct Data {
    shops: HashSet<Uuid>,
    /// (shop_id, user_id)
    shop_managers: HashSet<(Uuid, Uuid)>,
    /// variant id → (live price, active)
    variants: HashMap<Uuid, (Decimal, bool)>,
    stock: HashMap<(Uuid, Uuid), ShopStockEntry>,
    moves: Vec<StockMove>,
    orders: HashMap<Uuid, Order>,
    items: HashMap<Uuid, Vec<OrderItem>>,
    sessions: HashMap<String, Uuid>,
    shipments: HashMap<Uuid, Shipment>,
    shipment_orders: Vec<ShipmentOrder>,
}

#[derive(Debug, Default)]
struct Inner {
    data: Data,
    faults: Vec<FaultPoint>,
}

impl Inner {
    fn take_fault(&mut self, matches: impl Fn(&FaultPoint) -> bool) -> Option<FaultPoint> {
        let index = self.faults.iter().position(matches)?;
        Some(self.faults.remove(index))
    }
}

#[derive(Debug, Default)]
pub struct MemoryFulfillmentStore {
    inner: RwLock<Inner>,
}

fn injected(point: FaultPoint) -> AppError {
    AppError::Internal(format!("injected fault at {:?}", point))
}

impl Data {
    fn order(&self, order_id: Uuid) -> AppResult<&Order> {
        self.orders
            .get(&order_id)
            .ok_or_else(|| WorkflowError::not_found(Entity::Order, order_id).into())
    }

    fn order_mut(&mut self, order_id: Uuid) -> AppResult<&mut Order> {
        self.orders
            .get_mut(&order_id)
            .ok_or_else(|| WorkflowError::not_found(Entity::Order, order_id).into())
    }

    fn order_detail(&self, order_id: Uuid) -> Option<OrderDetail> {
        let order = self.orders.get(&order_id)?.clone();
        let items = self.items.get(&order_id).cloned().unwrap_or_default();
        Some(OrderDetail { order, items })
    }

    fn order_ids_of(&self, shipment_id: Uuid) -> Vec<Uuid> {
        let mut ids: Vec<Uuid> = self
            .shipment_orders
            .iter()
            .filter(|link| link.shipment_id == shipment_id)
            .map(|link| link.order_id)
            .collect();
        ids.sort();
        ids
    }

    fn shipment_detail(&self, shipment_id: Uuid) -> Option<ShipmentDetail> {
        let shipment = self.shipments.get(&shipment_id)?.clone();
        Some(ShipmentDetail {
            order_ids: self.order_ids_of(shipment_id),
            shipment,
        })
    }

    /// The non-terminal shipment currently carrying `order_id`
    fn open_shipment_of(&self, order_id: Uuid) -> Option<Uuid> {
        self.shipment_orders
            .iter()
            .filter(|link| link.order_id == order_id)
            .map(|link| link.shipment_id)
            .find(|id| {
                self.shipments
                    .get(id)
                    .map_or(false, |shipment| !shipment.status.is_terminal())
            })
    }

    fn managed_shops(&self, user_id: Uuid) -> Vec<Uuid> {
        self.shop_managers
            .iter()
            .filter(|(_, manager)| *manager == user_id)
            .map(|(shop, _)| *shop)
            .collect()
    }

    fn stock_level(&self, shop_id: Uuid, variant_id: Uuid) -> i32 {
        self.stock
            .get(&(shop_id, variant_id))
            .map_or(0, |entry| entry.quantity)
    }

    fn set_stock_level(
        &mut self,
        shop_id: Uuid,
        variant_id: Uuid,
        quantity: i32,
        now: DateTime<Utc>,
    ) -> ShopStockEntry {
        let entry = ShopStockEntry {
            shop_id,
            product_variant_id: variant_id,
            quantity,
            updated_at: now,
        };
        self.stock.insert((shop_id, variant_id), entry.clone());
        entry
    }

    /// Apply a terminal outcome to a shipment and every order it carries
    fn cascade(
        &mut self,
        shipment_id: Uuid,
        outcome: ShipmentOutcome,
        now: DateTime<Utc>,
        fail_after: Option<usize>,
    ) -> AppResult<()> {
        if let Some(shipment) = self.shipments.get_mut(&shipment_id) {
            shipment.status = outcome.shipment_status();
            shipment.finished_at = Some(now);
        }

        for (updated, order_id) in self.order_ids_of(shipment_id).into_iter().enumerate() {
            if fail_after == Some(updated) {
                return Err(injected(FaultPoint::ResolveCascade {
                    after_orders: updated,
                }));
            }
            let order = self.order_mut(order_id)?;
            if let Some(next) = cascade_status(order, outcome) {
                order.status = next;
                order.updated_at = now;
            }
        }
        Ok(())
    }
}

impl MemoryFulfillmentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm a fault for the next operation passing `point`
    pub async fn inject_fault(&self, point: FaultPoint) {
        self.inner.write().await.faults.push(point);
    }

    pub async fn seed_shop(&self, shop_id: Uuid) {
        self.inner.write().await.data.shops.insert(shop_id);
    }

    pub async fn assign_manager(&self, shop_id: Uuid, user_id: Uuid) {
        self.inner
            .write()
            .await
            .data
            .shop_managers
            .insert((shop_id, user_id));
    }

    /// Register an active variant at its live price
    pub async fn seed_variant(&self, variant_id: Uuid, price: Decimal) {
        self.inner
            .write()
            .await
            .data
            .variants
            .insert(variant_id, (price, true));
    }

    /// Change the live catalog price of a variant
    pub async fn set_variant_price(&self, variant_id: Uuid, price: Decimal) {
        if let Some(entry) = self.inner.write().await.data.variants.get_mut(&variant_id) {
            entry.0 = price;
        }
    }

    pub async fn set_variant_active(&self, variant_id: Uuid, is_active: bool) {
        if let Some(entry) = self.inner.write().await.data.variants.get_mut(&variant_id) {
            entry.1 = is_active;
        }
    }

    pub async fn seed_stock(&self, shop_id: Uuid, variant_id: Uuid, quantity: i32) {
        let mut inner = self.inner.write().await;
        inner.data.shops.insert(shop_id);
        inner
            .data
            .set_stock_level(shop_id, variant_id, quantity, Utc::now());
    }

    /// Claim a ready order into an existing shipment, for multi-order fixtures.
    ///
    /// The order must be claimable and is handed to the shipment's driver.
    pub async fn attach_to_shipment(&self, shipment_id: Uuid, order_id: Uuid) -> AppResult<()> {
        let mut inner = self.inner.write().await;
        let data = &mut inner.data;
        let driver_id = data
            .shipments
            .get(&shipment_id)
            .filter(|shipment| !shipment.status.is_terminal())
            .map(|shipment| shipment.driver_id)
            .ok_or_else(|| WorkflowError::not_found(Entity::Shipment, shipment_id))?;

        let order = data.order_mut(order_id)?;
        let next = check_claim(order)?;
        order.status = next;
        order.driver_id = Some(driver_id);
        order.updated_at = Utc::now();

        data.shipment_orders.push(ShipmentOrder {
            shipment_id,
            order_id,
        });
        Ok(())
    }

    pub async fn stock_level(&self, shop_id: Uuid, variant_id: Uuid) -> i32 {
        self.inner.read().await.data.stock_level(shop_id, variant_id)
    }

    pub async fn order_count(&self) -> usize {
        self.inner.read().await.data.orders.len()
    }
}

#[async_trait]
impl FulfillmentStore for MemoryFulfillmentStore {
    async fn manages_shop(&self, user_id: Uuid, shop_id: Uuid) -> AppResult<bool> {
        Ok(self
            .inner
            .read()
            .await
            .data
            .shop_managers
            .contains(&(shop_id, user_id)))
    }

    async fn stock_entries(&self, shop_id: Uuid) -> AppResult<Vec<ShopStockEntry>> {
        let inner = self.inner.read().await;
        let mut entries: Vec<ShopStockEntry> = inner
            .data
            .stock
            .values()
            .filter(|entry| entry.shop_id == shop_id)
            .cloned()
            .collect();
        entries.sort_by_key(|entry| entry.product_variant_id);
        Ok(entries)
    }

    async fn stock_moves(&self, shop_id: Uuid, pagination: Pagination) -> AppResult<Page<StockMove>> {
        let inner = self.inner.read().await;
        let moves: Vec<&StockMove> = inner
            .data
            .moves
            .iter()
            .rev()
            .filter(|m| m.shop_id == shop_id)
            .collect();
        Ok(Page {
            total: moves.len() as u64,
            items: paginate(moves.into_iter().cloned(), pagination),
        })
    }

    async fn adjust_stock(&self, adjustment: StockAdjustment) -> AppResult<ShopStockEntry> {
        let mut inner = self.inner.write().await;
        let mut data = inner.data.clone();
        let now = Utc::now();

        if !data.shops.contains(&adjustment.shop_id) {
            return Err(WorkflowError::not_found(Entity::Shop, adjustment.shop_id).into());
        }
        if !data.variants.contains_key(&adjustment.product_variant_id) {
            return Err(
                WorkflowError::not_found(Entity::ProductVariant, adjustment.product_variant_id).into(),
            );
        }

        let current = data.stock_level(adjustment.shop_id, adjustment.product_variant_id);
        let next = apply_delta(adjustment.product_variant_id, current, adjustment.delta)?;
        let entry = data.set_stock_level(
            adjustment.shop_id,
            adjustment.product_variant_id,
            next,
            now,
        );
        data.moves.push(StockMove {
            id: Uuid::new_v4(),
            shop_id: adjustment.shop_id,
            product_variant_id: adjustment.product_variant_id,
            delta: adjustment.delta,
            reason: adjustment.reason,
            note: adjustment.note,
            order_id: None,
            actor_id: Some(adjustment.actor_id),
            created_at: now,
        });

        inner.data = data;
        Ok(entry)
    }

    async fn create_order(&self, draft: OrderDraft) -> AppResult<OrderCreation> {
        validate_order_draft(&draft)?;

        let mut inner = self.inner.write().await;
        if let Some(session) = &draft.payment_session_id {
            if let Some(existing) = inner
                .data
                .sessions
                .get(session)
                .and_then(|order_id| inner.data.order_detail(*order_id))
            {
                return Ok(OrderCreation::AlreadyExists(existing));
            }
        }

        let mut data = inner.data.clone();
        let now = Utc::now();
        let order_id = Uuid::new_v4();

        if let Some(shop_id) = draft.shop_id {
            if !data.shops.contains(&shop_id) {
                return Err(WorkflowError::not_found(Entity::Shop, shop_id).into());
            }
        }

        let live_prices: HashMap<Uuid, Decimal> = data
            .variants
            .iter()
            .filter(|(_, (_, active))| *active)
            .map(|(id, (price, _))| (*id, *price))
            .collect();
        let priced = price_lines(&draft.items, &live_prices)?;

        let required = aggregate_requirements(draft.stock_lines());
        if let (Some(shop_id), false) = (draft.shop_id, required.is_empty()) {
            let available: HashMap<Uuid, i32> = required
                .keys()
                .map(|variant_id| (*variant_id, data.stock_level(shop_id, *variant_id)))
                .collect();
            let plan = plan_reservation(&required, &available)?;

            for (variant_id, level) in plan {
                data.set_stock_level(shop_id, variant_id, level, now);
                let reserved = required.get(&variant_id).copied().unwrap_or(0);
                data.moves.push(StockMove {
                    id: Uuid::new_v4(),
                    shop_id,
                    product_variant_id: variant_id,
                    delta: -(reserved as i32),
                    reason: StockReason::OrderReservation,
                    note: None,
                    order_id: Some(order_id),
                    actor_id: draft.created_by,
                    created_at: now,
                });
            }

            if let Some(point) = inner.take_fault(|f| *f == FaultPoint::StockReservation) {
                return Err(injected(point));
            }
        }

        let order = Order {
            id: order_id,
            status: OrderStatus::Created,
            delivery_type: draft.delivery_type,
            customer_name: draft.customer_name,
            customer_phone: draft.customer_phone,
            customer_email: draft.customer_email,
            total_amount: priced.total,
            note: draft.note,
            shop_id: draft.shop_id,
            address: draft.address,
            factory_worker_id: None,
            driver_id: None,
            created_by: draft.created_by,
            payment_session_id: draft.payment_session_id.clone(),
            created_at: now,
            updated_at: now,
        };
        let items: Vec<OrderItem> = priced
            .lines
            .into_iter()
            .map(|line| OrderItem {
                id: Uuid::new_v4(),
                order_id,
                product_variant_id: line.product_variant_id,
                quantity: line.quantity,
                unit_price: line.unit_price,
                line_total: line.line_total,
                is_from_shop_stock: line.is_from_shop_stock,
            })
            .collect();

        data.orders.insert(order_id, order.clone());
        data.items.insert(order_id, items.clone());
        if let Some(session) = draft.payment_session_id {
            data.sessions.insert(session, order_id);
        }

        inner.data = data;
        Ok(OrderCreation::Created(OrderDetail { order, items }))
    }

    async fn find_order(&self, order_id: Uuid) -> AppResult<Option<OrderDetail>> {
        Ok(self.inner.read().await.data.order_detail(order_id))
    }

    async fn list_orders(&self, filter: OrderFilter) -> AppResult<Page<Order>> {
        let inner = self.inner.read().await;
        let managed = match filter.scope {
            OrderScope::ManagedBy(user_id) => inner.data.managed_shops(user_id),
            _ => Vec::new(),
        };

        let mut orders: Vec<&Order> = inner
            .data
            .orders
            .values()
            .filter(|order| filter.scope.admits(order, &managed))
            .filter(|order| filter.status.map_or(true, |status| order.status == status))
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));

        Ok(Page {
            total: orders.len() as u64,
            items: paginate(orders.into_iter().cloned(), filter.pagination),
        })
    }

    async fn take_order(&self, order_id: Uuid, worker_id: Uuid) -> AppResult<Order> {
        let mut inner = self.inner.write().await;
        let order = inner.data.order_mut(order_id)?;
        let next = check_take(order)?;
        order.status = next;
        order.factory_worker_id = Some(worker_id);
        order.updated_at = Utc::now();
        Ok(order.clone())
    }

    async fn mark_ready(&self, order_id: Uuid, worker_id: Uuid) -> AppResult<Order> {
        let mut inner = self.inner.write().await;
        let order = inner.data.order_mut(order_id)?;
        let next = check_mark_ready(order, worker_id)?;
        order.status = next;
        order.updated_at = Utc::now();
        Ok(order.clone())
    }

    async fn cancel_order(&self, order_id: Uuid) -> AppResult<Order> {
        let mut inner = self.inner.write().await;
        let mut data = inner.data.clone();
        let now = Utc::now();

        let order = data.order(order_id)?;
        check_cancel(order)?;

        let carrying = if order.status == OrderStatus::InTransit {
            data.open_shipment_of(order_id)
        } else {
            None
        };

        match carrying {
            Some(shipment_id) => {
                let fail_after = inner
                    .take_fault(|f| matches!(f, FaultPoint::ResolveCascade { .. }))
                    .and_then(|f| match f {
                        FaultPoint::ResolveCascade { after_orders } => Some(after_orders),
                        _ => None,
                    });
                data.cascade(shipment_id, ShipmentOutcome::Cancelled, now, fail_after)?;
            }
            None => {
                let order = data.order_mut(order_id)?;
                order.status = OrderStatus::Cancelled;
                order.updated_at = now;
            }
        }

        let cancelled = data.order(order_id)?.clone();
        inner.data = data;
        Ok(cancelled)
    }

    async fn claim_order(&self, claim: ShipmentClaim) -> AppResult<ShipmentDetail> {
        let mut inner = self.inner.write().await;
        let now = Utc::now();

        let order = inner.data.order_mut(claim.order_id)?;
        let next = check_claim(order)?;
        order.status = next;
        order.driver_id = Some(claim.driver_id);
        order.updated_at = now;

        let shipment = Shipment {
            id: Uuid::new_v4(),
            driver_id: claim.driver_id,
            status: ShipmentStatus::InTransit,
            planned_at: now,
            started_at: Some(now),
            finished_at: None,
            route_hint: claim.route_hint,
            comment: claim.comment,
        };
        inner.data.shipment_orders.push(ShipmentOrder {
            shipment_id: shipment.id,
            order_id: claim.order_id,
        });
        inner.data.shipments.insert(shipment.id, shipment.clone());

        Ok(ShipmentDetail {
            shipment,
            order_ids: vec![claim.order_id],
        })
    }

    async fn resolve_shipment(
        &self,
        shipment_id: Uuid,
        driver_id: Uuid,
        outcome: ShipmentOutcome,
    ) -> AppResult<ShipmentDetail> {
        let mut inner = self.inner.write().await;
        let mut data = inner.data.clone();

        let shipment = data
            .shipments
            .get(&shipment_id)
            .ok_or_else(|| WorkflowError::not_found(Entity::Shipment, shipment_id))?;
        check_resolve(shipment, driver_id)?;

        let fail_after = inner
            .take_fault(|f| matches!(f, FaultPoint::ResolveCascade { .. }))
            .and_then(|f| match f {
                FaultPoint::ResolveCascade { after_orders } => Some(after_orders),
                _ => None,
            });
        data.cascade(shipment_id, outcome, Utc::now(), fail_after)?;

        let detail = data
            .shipment_detail(shipment_id)
            .ok_or_else(|| WorkflowError::not_found(Entity::Shipment, shipment_id))?;
        inner.data = data;
        Ok(detail)
    }

    async fn find_shipment(&self, shipment_id: Uuid) -> AppResult<Option<ShipmentDetail>> {
        Ok(self.inner.read().await.data.shipment_detail(shipment_id))
    }

    async fn list_shipments(&self, filter: ShipmentFilter) -> AppResult<Page<ShipmentDetail>> {
        let inner = self.inner.read().await;
        let mut shipments: Vec<&Shipment> = inner
            .data
            .shipments
            .values()
            .filter(|s| filter.driver_id.map_or(true, |driver| s.driver_id == driver))
            .filter(|s| !filter.open_only || !s.status.is_terminal())
            .collect();
        shipments.sort_by(|a, b| b.planned_at.cmp(&a.planned_at).then(a.id.cmp(&b.id)));

        let total = shipments.len() as u64;
        let items = paginate(shipments.into_iter(), filter.pagination)
            .into_iter()
            .filter_map(|s| inner.data.shipment_detail(s.id))
            .collect();
        Ok(Page { items, total })
    }
}

fn paginate<T>(rows: impl Iterator<Item = T>, pagination: Pagination) -> Vec<T> {
    rows.skip(pagination.offset() as usize)
        .take(pagination.limit() as usize)
        .collect()
}
