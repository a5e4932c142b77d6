//! PostgreSQL fulfillment store
//!
//! Each operation runs in one transaction. Stock rows are locked in variant
//! order before they are read, so concurrent reservations on the same shop
//! serialize without deadlocking. Single-order transitions are conditional
//! updates; when no row matches, the order is re-read to report why.

use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::types::Json;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use shared::pricing::price_lines;
use shared::stock::{aggregate_requirements, apply_delta, plan_reservation};
use shared::workflow::{check_cancel, check_claim, check_mark_ready, check_resolve, check_take};
use shared::{
    validate_order_draft, DeliveryAddress, Entity, Order, OrderCreation, OrderDetail, OrderDraft,
    OrderItem, OrderScope, OrderStatus, Pagination, Shipment, ShipmentClaim, ShipmentDetail,
    ShipmentOutcome, ShipmentStatus, ShopStockEntry, StockAdjustment, StockMove, StockReason,
    WorkflowError,
};

use super::{FulfillmentStore, OrderFilter, Page, ShipmentFilter};
use crate::error::{AppError, AppResult};

const ORDER_COLUMNS: &str = r#"
    id, status, delivery_type, customer_name, customer_phone, customer_email,
    total_amount, note, shop_id, address, factory_worker_id, driver_id,
    created_by, payment_session_id, created_at, updated_at
"#;

const SHIPMENT_COLUMNS: &str =
    "id, driver_id, status, planned_at, started_at, finished_at, route_hint, comment";

const STOCK_MOVE_COLUMNS: &str =
    "id, shop_id, product_variant_id, delta, reason, note, order_id, actor_id, created_at";

#[derive(Debug, sqlx::FromRow)]
struct OrderRow {
    id: Uuid,
    status: String,
    delivery_type: String,
    customer_name: String,
    customer_phone: String,
    customer_email: Option<String>,
    total_amount: Decimal,
    note: Option<String>,
    shop_id: Option<Uuid>,
    address: Option<Json<DeliveryAddress>>,
    factory_worker_id: Option<Uuid>,
    driver_id: Option<Uuid>,
    created_by: Option<Uuid>,
    payment_session_id: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<OrderRow> for Order {
    type Error = AppError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        Ok(Order {
            id: row.id,
            status: parse_column(&row.status)?,
            delivery_type: parse_column(&row.delivery_type)?,
            customer_name: row.customer_name,
            customer_phone: row.customer_phone,
            customer_email: row.customer_email,
            total_amount: row.total_amount,
            note: row.note,
            shop_id: row.shop_id,
            address: row.address.map(|Json(address)| address),
            factory_worker_id: row.factory_worker_id,
            driver_id: row.driver_id,
            created_by: row.created_by,
            payment_session_id: row.payment_session_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct OrderItemRow {
    id: Uuid,
    order_id: Uuid,
    product_variant_id: Uuid,
    quantity: i32,
    unit_price: Decimal,
    line_total: Decimal,
    is_from_shop_stock: bool,
}

impl From<OrderItemRow> for OrderItem {
    fn from(row: OrderItemRow) -> Self {
        OrderItem {
            id: row.id,
            order_id: row.order_id,
            product_variant_id: row.product_variant_id,
            quantity: row.quantity,
            unit_price: row.unit_price,
            line_total: row.line_total,
            is_from_shop_stock: row.is_from_shop_stock,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ShipmentRow {
    id: Uuid,
    driver_id: Uuid,
    status: String,
    planned_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
    route_hint: Option<String>,
    comment: Option<String>,
}

impl TryFrom<ShipmentRow> for Shipment {
    type Error = AppError;

    fn try_from(row: ShipmentRow) -> Result<Self, Self::Error> {
        Ok(Shipment {
            id: row.id,
            driver_id: row.driver_id,
            status: parse_column(&row.status)?,
            planned_at: row.planned_at,
            started_at: row.started_at,
            finished_at: row.finished_at,
            route_hint: row.route_hint,
            comment: row.comment,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct StockMoveRow {
    id: Uuid,
    shop_id: Uuid,
    product_variant_id: Uuid,
    delta: i32,
    reason: String,
    note: Option<String>,
    order_id: Option<Uuid>,
    actor_id: Option<Uuid>,
    created_at: DateTime<Utc>,
}

impl TryFrom<StockMoveRow> for StockMove {
    type Error = AppError;

    fn try_from(row: StockMoveRow) -> Result<Self, Self::Error> {
        Ok(StockMove {
            id: row.id,
            shop_id: row.shop_id,
            product_variant_id: row.product_variant_id,
            delta: row.delta,
            reason: parse_column(&row.reason)?,
            note: row.note,
            order_id: row.order_id,
            actor_id: row.actor_id,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct StockRow {
    shop_id: Uuid,
    product_variant_id: Uuid,
    quantity: i32,
    updated_at: DateTime<Utc>,
}

impl From<StockRow> for ShopStockEntry {
    fn from(row: StockRow) -> Self {
        ShopStockEntry {
            shop_id: row.shop_id,
            product_variant_id: row.product_variant_id,
            quantity: row.quantity,
            updated_at: row.updated_at,
        }
    }
}

/// Parse a TEXT status column into its enum
fn parse_column<T: FromStr<Err = String>>(value: &str) -> AppResult<T> {
    value.parse().map_err(AppError::Internal)
}

/// Scope predicate over `orders`, with `$2` bound to the scope's user id
fn scope_condition(scope: OrderScope) -> (&'static str, Option<Uuid>) {
    match scope {
        OrderScope::All => ("$2::uuid IS NULL", None),
        OrderScope::ManagedBy(user_id) => (
            "(created_by = $2 OR shop_id IN (SELECT shop_id FROM shop_managers WHERE user_id = $2))",
            Some(user_id),
        ),
        OrderScope::ProductionQueue(worker_id) => (
            "(status = 'created' OR factory_worker_id = $2)",
            Some(worker_id),
        ),
        OrderScope::DeliveryQueue(driver_id) => (
            "((status = 'ready_to_ship' AND driver_id IS NULL) OR driver_id = $2)",
            Some(driver_id),
        ),
        OrderScope::CreatedBy(user_id) => ("created_by = $2", Some(user_id)),
    }
}

#[derive(Clone)]
pub struct PgFulfillmentStore {
    pool: PgPool,
}

impl PgFulfillmentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_order(conn: &mut PgConnection, order_id: Uuid) -> AppResult<Option<Order>> {
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {} FROM orders WHERE id = $1",
            ORDER_COLUMNS
        ))
        .bind(order_id)
        .fetch_optional(&mut *conn)
        .await?;

        row.map(Order::try_from).transpose()
    }

    async fn require_order(conn: &mut PgConnection, order_id: Uuid) -> AppResult<Order> {
        Self::fetch_order(conn, order_id)
            .await?
            .ok_or_else(|| WorkflowError::not_found(Entity::Order, order_id).into())
    }

    async fn fetch_order_detail(
        conn: &mut PgConnection,
        order_id: Uuid,
    ) -> AppResult<Option<OrderDetail>> {
        let Some(order) = Self::fetch_order(conn, order_id).await? else {
            return Ok(None);
        };

        let items = sqlx::query_as::<_, OrderItemRow>(
            r#"
            SELECT id, order_id, product_variant_id, quantity, unit_price, line_total, is_from_shop_stock
            FROM order_items
            WHERE order_id = $1
            ORDER BY id
            "#,
        )
        .bind(order_id)
        .fetch_all(&mut *conn)
        .await?
        .into_iter()
        .map(OrderItem::from)
        .collect();

        Ok(Some(OrderDetail { order, items }))
    }

    async fn fetch_shipment_detail(
        conn: &mut PgConnection,
        shipment_id: Uuid,
    ) -> AppResult<Option<ShipmentDetail>> {
        let Some(row) = sqlx::query_as::<_, ShipmentRow>(&format!(
            "SELECT {} FROM shipments WHERE id = $1",
            SHIPMENT_COLUMNS
        ))
        .bind(shipment_id)
        .fetch_optional(&mut *conn)
        .await?
        else {
            return Ok(None);
        };

        let order_ids = sqlx::query_scalar::<_, Uuid>(
            "SELECT order_id FROM shipment_orders WHERE shipment_id = $1 ORDER BY order_id",
        )
        .bind(shipment_id)
        .fetch_all(&mut *conn)
        .await?;

        Ok(Some(ShipmentDetail {
            shipment: Shipment::try_from(row)?,
            order_ids,
        }))
    }

    async fn ensure_exists(
        conn: &mut PgConnection,
        table: &str,
        entity: Entity,
        id: Uuid,
    ) -> AppResult<()> {
        let exists = sqlx::query_scalar::<_, bool>(&format!(
            "SELECT EXISTS(SELECT 1 FROM {} WHERE id = $1)",
            table
        ))
        .bind(id)
        .fetch_one(&mut *conn)
        .await?;

        if exists {
            Ok(())
        } else {
            Err(WorkflowError::not_found(entity, id).into())
        }
    }

    /// Set a terminal outcome on a locked shipment and on its orders in transit
    async fn cascade(
        conn: &mut PgConnection,
        shipment_id: Uuid,
        outcome: ShipmentOutcome,
    ) -> AppResult<u64> {
        sqlx::query("UPDATE shipments SET status = $2, finished_at = NOW() WHERE id = $1")
            .bind(shipment_id)
            .bind(outcome.shipment_status().as_str())
            .execute(&mut *conn)
            .await?;

        let result = sqlx::query(
            r#"
            UPDATE orders
            SET status = $2, updated_at = NOW()
            WHERE id IN (SELECT order_id FROM shipment_orders WHERE shipment_id = $1)
              AND status = $3
            "#,
        )
        .bind(shipment_id)
        .bind(outcome.order_status().as_str())
        .bind(OrderStatus::InTransit.as_str())
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected())
    }

    /// Reserve shop stock for a new order. Rows are locked before reading.
    async fn reserve_stock(
        conn: &mut PgConnection,
        shop_id: Uuid,
        order_id: Uuid,
        actor_id: Option<Uuid>,
        required: &BTreeMap<Uuid, i64>,
    ) -> AppResult<()> {
        let variant_ids: Vec<Uuid> = required.keys().copied().collect();
        let available: HashMap<Uuid, i32> = sqlx::query_as::<_, (Uuid, i32)>(
            r#"
            SELECT product_variant_id, quantity
            FROM shop_stock
            WHERE shop_id = $1 AND product_variant_id = ANY($2)
            ORDER BY product_variant_id
            FOR UPDATE
            "#,
        )
        .bind(shop_id)
        .bind(&variant_ids)
        .fetch_all(&mut *conn)
        .await?
        .into_iter()
        .collect();

        let plan = plan_reservation(required, &available)?;

        for (variant_id, level) in plan {
            let reserved = required.get(&variant_id).copied().unwrap_or(0) as i32;

            sqlx::query(
                r#"
                UPDATE shop_stock
                SET quantity = $3, updated_at = NOW()
                WHERE shop_id = $1 AND product_variant_id = $2
                "#,
            )
            .bind(shop_id)
            .bind(variant_id)
            .bind(level)
            .execute(&mut *conn)
            .await?;

            sqlx::query(
                r#"
                INSERT INTO stock_moves (shop_id, product_variant_id, delta, reason, order_id, actor_id)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(shop_id)
            .bind(variant_id)
            .bind(-reserved)
            .bind(StockReason::OrderReservation.as_str())
            .bind(order_id)
            .bind(actor_id)
            .execute(&mut *conn)
            .await?;
        }

        Ok(())
    }
}

#[async_trait]
impl FulfillmentStore for PgFulfillmentStore {
    async fn manages_shop(&self, user_id: Uuid, shop_id: Uuid) -> AppResult<bool> {
        let manages = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM shop_managers WHERE shop_id = $1 AND user_id = $2)",
        )
        .bind(shop_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(manages)
    }

    async fn stock_entries(&self, shop_id: Uuid) -> AppResult<Vec<ShopStockEntry>> {
        let rows = sqlx::query_as::<_, StockRow>(
            r#"
            SELECT shop_id, product_variant_id, quantity, updated_at
            FROM shop_stock
            WHERE shop_id = $1
            ORDER BY product_variant_id
            "#,
        )
        .bind(shop_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(ShopStockEntry::from).collect())
    }

    async fn stock_moves(&self, shop_id: Uuid, pagination: Pagination) -> AppResult<Page<StockMove>> {
        let total = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM stock_moves WHERE shop_id = $1")
            .bind(shop_id)
            .fetch_one(&self.pool)
            .await?;

        let items = sqlx::query_as::<_, StockMoveRow>(&format!(
            r#"
            SELECT {}
            FROM stock_moves
            WHERE shop_id = $1
            ORDER BY created_at DESC, id
            LIMIT $2 OFFSET $3
            "#,
            STOCK_MOVE_COLUMNS
        ))
        .bind(shop_id)
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(StockMove::try_from)
        .collect::<AppResult<Vec<_>>>()?;

        Ok(Page {
            items,
            total: total as u64,
        })
    }

    async fn adjust_stock(&self, adjustment: StockAdjustment) -> AppResult<ShopStockEntry> {
        let mut tx = self.pool.begin().await?;

        Self::ensure_exists(&mut tx, "shops", Entity::Shop, adjustment.shop_id).await?;
        Self::ensure_exists(
            &mut tx,
            "product_variants",
            Entity::ProductVariant,
            adjustment.product_variant_id,
        )
        .await?;

        // Make sure there is a row to lock
        sqlx::query(
            r#"
            INSERT INTO shop_stock (shop_id, product_variant_id, quantity)
            VALUES ($1, $2, 0)
            ON CONFLICT (shop_id, product_variant_id) DO NOTHING
            "#,
        )
        .bind(adjustment.shop_id)
        .bind(adjustment.product_variant_id)
        .execute(&mut *tx)
        .await?;

        let current = sqlx::query_scalar::<_, i32>(
            r#"
            SELECT quantity FROM shop_stock
            WHERE shop_id = $1 AND product_variant_id = $2
            FOR UPDATE
            "#,
        )
        .bind(adjustment.shop_id)
        .bind(adjustment.product_variant_id)
        .fetch_one(&mut *tx)
        .await?;

        let next = apply_delta(adjustment.product_variant_id, current, adjustment.delta)?;

        let row = sqlx::query_as::<_, StockRow>(
            r#"
            UPDATE shop_stock
            SET quantity = $3, updated_at = NOW()
            WHERE shop_id = $1 AND product_variant_id = $2
            RETURNING shop_id, product_variant_id, quantity, updated_at
            "#,
        )
        .bind(adjustment.shop_id)
        .bind(adjustment.product_variant_id)
        .bind(next)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO stock_moves (shop_id, product_variant_id, delta, reason, note, actor_id)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(adjustment.shop_id)
        .bind(adjustment.product_variant_id)
        .bind(adjustment.delta)
        .bind(adjustment.reason.as_str())
        .bind(&adjustment.note)
        .bind(adjustment.actor_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(ShopStockEntry::from(row))
    }

    async fn create_order(&self, draft: OrderDraft) -> AppResult<OrderCreation> {
        validate_order_draft(&draft)?;

        let mut tx = self.pool.begin().await?;

        if let Some(session) = &draft.payment_session_id {
            let existing = sqlx::query_scalar::<_, Uuid>(
                "SELECT id FROM orders WHERE payment_session_id = $1",
            )
            .bind(session)
            .fetch_optional(&mut *tx)
            .await?;

            if let Some(order_id) = existing {
                let detail = Self::fetch_order_detail(&mut tx, order_id)
                    .await?
                    .ok_or_else(|| WorkflowError::not_found(Entity::Order, order_id))?;
                return Ok(OrderCreation::AlreadyExists(detail));
            }
        }

        if let Some(shop_id) = draft.shop_id {
            Self::ensure_exists(&mut tx, "shops", Entity::Shop, shop_id).await?;
        }

        let variant_ids: Vec<Uuid> = draft.items.iter().map(|i| i.product_variant_id).collect();
        let live_prices: HashMap<Uuid, Decimal> = sqlx::query_as::<_, (Uuid, Decimal)>(
            "SELECT id, price FROM product_variants WHERE id = ANY($1) AND is_active = TRUE",
        )
        .bind(&variant_ids)
        .fetch_all(&mut *tx)
        .await?
        .into_iter()
        .collect();

        let priced = price_lines(&draft.items, &live_prices)?;
        let order_id = Uuid::new_v4();

        let inserted = sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO orders (
                id, status, delivery_type, customer_name, customer_phone, customer_email,
                total_amount, note, shop_id, address, created_by, payment_session_id
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ON CONFLICT (payment_session_id) DO NOTHING
            RETURNING id
            "#,
        )
        .bind(order_id)
        .bind(OrderStatus::Created.as_str())
        .bind(draft.delivery_type.as_str())
        .bind(&draft.customer_name)
        .bind(&draft.customer_phone)
        .bind(&draft.customer_email)
        .bind(priced.total)
        .bind(&draft.note)
        .bind(draft.shop_id)
        .bind(draft.address.clone().map(Json))
        .bind(draft.created_by)
        .bind(&draft.payment_session_id)
        .fetch_optional(&mut *tx)
        .await?;

        if inserted.is_none() {
            // A concurrent delivery of the same payment session won the insert
            tx.rollback().await?;
            let mut conn = self.pool.acquire().await?;
            let session = draft.payment_session_id.as_deref().unwrap_or_default();
            let existing = sqlx::query_scalar::<_, Uuid>(
                "SELECT id FROM orders WHERE payment_session_id = $1",
            )
            .bind(session)
            .fetch_one(&mut *conn)
            .await?;
            let detail = Self::fetch_order_detail(&mut conn, existing)
                .await?
                .ok_or_else(|| WorkflowError::not_found(Entity::Order, existing))?;
            return Ok(OrderCreation::AlreadyExists(detail));
        }

        for line in &priced.lines {
            sqlx::query(
                r#"
                INSERT INTO order_items (
                    order_id, product_variant_id, quantity, unit_price, line_total, is_from_shop_stock
                )
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(order_id)
            .bind(line.product_variant_id)
            .bind(line.quantity)
            .bind(line.unit_price)
            .bind(line.line_total)
            .bind(line.is_from_shop_stock)
            .execute(&mut *tx)
            .await?;
        }

        let required = aggregate_requirements(draft.stock_lines());
        if let (Some(shop_id), false) = (draft.shop_id, required.is_empty()) {
            Self::reserve_stock(&mut tx, shop_id, order_id, draft.created_by, &required).await?;
        }

        let detail = Self::fetch_order_detail(&mut tx, order_id)
            .await?
            .ok_or_else(|| WorkflowError::not_found(Entity::Order, order_id))?;

        tx.commit().await?;

        Ok(OrderCreation::Created(detail))
    }

    async fn find_order(&self, order_id: Uuid) -> AppResult<Option<OrderDetail>> {
        let mut conn = self.pool.acquire().await?;
        Self::fetch_order_detail(&mut conn, order_id).await
    }

    async fn list_orders(&self, filter: OrderFilter) -> AppResult<Page<Order>> {
        let (condition, scope_user) = scope_condition(filter.scope);
        let status = filter.status.map(|s| s.as_str());

        let total = sqlx::query_scalar::<_, i64>(&format!(
            "SELECT COUNT(*) FROM orders WHERE ($1::text IS NULL OR status = $1) AND {}",
            condition
        ))
        .bind(status)
        .bind(scope_user)
        .fetch_one(&self.pool)
        .await?;

        let items = sqlx::query_as::<_, OrderRow>(&format!(
            r#"
            SELECT {}
            FROM orders
            WHERE ($1::text IS NULL OR status = $1) AND {}
            ORDER BY created_at DESC, id
            LIMIT $3 OFFSET $4
            "#,
            ORDER_COLUMNS, condition
        ))
        .bind(status)
        .bind(scope_user)
        .bind(filter.pagination.limit())
        .bind(filter.pagination.offset())
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(Order::try_from)
        .collect::<AppResult<Vec<_>>>()?;

        Ok(Page {
            items,
            total: total as u64,
        })
    }

    async fn take_order(&self, order_id: Uuid, worker_id: Uuid) -> AppResult<Order> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE orders
            SET status = $3, factory_worker_id = $2, updated_at = NOW()
            WHERE id = $1 AND status = $4
            "#,
        )
        .bind(order_id)
        .bind(worker_id)
        .bind(OrderStatus::InProduction.as_str())
        .bind(OrderStatus::Created.as_str())
        .execute(&mut *tx)
        .await?;

        let order = Self::require_order(&mut tx, order_id).await?;
        if result.rows_affected() != 1 {
            check_take(&order)?;
            return Err(AppError::Internal(format!(
                "take of order {} matched no row",
                order_id
            )));
        }

        tx.commit().await?;
        Ok(order)
    }

    async fn mark_ready(&self, order_id: Uuid, worker_id: Uuid) -> AppResult<Order> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE orders
            SET status = $3, updated_at = NOW()
            WHERE id = $1 AND status = $4 AND factory_worker_id = $2
            "#,
        )
        .bind(order_id)
        .bind(worker_id)
        .bind(OrderStatus::ReadyToShip.as_str())
        .bind(OrderStatus::InProduction.as_str())
        .execute(&mut *tx)
        .await?;

        let order = Self::require_order(&mut tx, order_id).await?;
        if result.rows_affected() != 1 {
            check_mark_ready(&order, worker_id)?;
            return Err(AppError::Internal(format!(
                "mark-ready of order {} matched no row",
                order_id
            )));
        }

        tx.commit().await?;
        Ok(order)
    }

    async fn cancel_order(&self, order_id: Uuid) -> AppResult<Order> {
        let mut tx = self.pool.begin().await?;

        let order = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {} FROM orders WHERE id = $1 FOR UPDATE",
            ORDER_COLUMNS
        ))
        .bind(order_id)
        .fetch_optional(&mut *tx)
        .await?
        .map(Order::try_from)
        .transpose()?
        .ok_or_else(|| WorkflowError::not_found(Entity::Order, order_id))?;

        check_cancel(&order)?;

        let carrying = if order.status == OrderStatus::InTransit {
            sqlx::query_scalar::<_, Uuid>(
                r#"
                SELECT s.id
                FROM shipments s
                JOIN shipment_orders so ON so.shipment_id = s.id
                WHERE so.order_id = $1 AND s.status IN ('planned', 'in_transit')
                FOR UPDATE OF s
                "#,
            )
            .bind(order_id)
            .fetch_optional(&mut *tx)
            .await?
        } else {
            None
        };

        match carrying {
            Some(shipment_id) => {
                Self::cascade(&mut tx, shipment_id, ShipmentOutcome::Cancelled).await?;
            }
            None => {
                sqlx::query("UPDATE orders SET status = $2, updated_at = NOW() WHERE id = $1")
                    .bind(order_id)
                    .bind(OrderStatus::Cancelled.as_str())
                    .execute(&mut *tx)
                    .await?;
            }
        }

        let cancelled = Self::require_order(&mut tx, order_id).await?;
        tx.commit().await?;
        Ok(cancelled)
    }

    async fn claim_order(&self, claim: ShipmentClaim) -> AppResult<ShipmentDetail> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE orders
            SET status = $3, driver_id = $2, updated_at = NOW()
            WHERE id = $1 AND status = $4 AND driver_id IS NULL
            "#,
        )
        .bind(claim.order_id)
        .bind(claim.driver_id)
        .bind(OrderStatus::InTransit.as_str())
        .bind(OrderStatus::ReadyToShip.as_str())
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() != 1 {
            let order = Self::require_order(&mut tx, claim.order_id).await?;
            check_claim(&order)?;
            return Err(AppError::Internal(format!(
                "claim of order {} matched no row",
                claim.order_id
            )));
        }

        let row = sqlx::query_as::<_, ShipmentRow>(&format!(
            r#"
            INSERT INTO shipments (driver_id, status, planned_at, started_at, route_hint, comment)
            VALUES ($1, $2, NOW(), NOW(), $3, $4)
            RETURNING {}
            "#,
            SHIPMENT_COLUMNS
        ))
        .bind(claim.driver_id)
        .bind(ShipmentStatus::InTransit.as_str())
        .bind(&claim.route_hint)
        .bind(&claim.comment)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query("INSERT INTO shipment_orders (shipment_id, order_id) VALUES ($1, $2)")
            .bind(row.id)
            .bind(claim.order_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(ShipmentDetail {
            shipment: Shipment::try_from(row)?,
            order_ids: vec![claim.order_id],
        })
    }

    async fn resolve_shipment(
        &self,
        shipment_id: Uuid,
        driver_id: Uuid,
        outcome: ShipmentOutcome,
    ) -> AppResult<ShipmentDetail> {
        let mut tx = self.pool.begin().await?;

        let shipment = sqlx::query_as::<_, ShipmentRow>(&format!(
            "SELECT {} FROM shipments WHERE id = $1 FOR UPDATE",
            SHIPMENT_COLUMNS
        ))
        .bind(shipment_id)
        .fetch_optional(&mut *tx)
        .await?
        .map(Shipment::try_from)
        .transpose()?
        .ok_or_else(|| WorkflowError::not_found(Entity::Shipment, shipment_id))?;

        check_resolve(&shipment, driver_id)?;
        Self::cascade(&mut tx, shipment_id, outcome).await?;

        let detail = Self::fetch_shipment_detail(&mut tx, shipment_id)
            .await?
            .ok_or_else(|| WorkflowError::not_found(Entity::Shipment, shipment_id))?;

        tx.commit().await?;
        Ok(detail)
    }

    async fn find_shipment(&self, shipment_id: Uuid) -> AppResult<Option<ShipmentDetail>> {
        let mut conn = self.pool.acquire().await?;
        Self::fetch_shipment_detail(&mut conn, shipment_id).await
    }

    async fn list_shipments(&self, filter: ShipmentFilter) -> AppResult<Page<ShipmentDetail>> {
        let total = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM shipments
            WHERE ($1::uuid IS NULL OR driver_id = $1)
              AND (NOT $2 OR status IN ('planned', 'in_transit'))
            "#,
        )
        .bind(filter.driver_id)
        .bind(filter.open_only)
        .fetch_one(&self.pool)
        .await?;

        let shipments = sqlx::query_as::<_, ShipmentRow>(&format!(
            r#"
            SELECT {}
            FROM shipments
            WHERE ($1::uuid IS NULL OR driver_id = $1)
              AND (NOT $2 OR status IN ('planned', 'in_transit'))
            ORDER BY planned_at DESC, id
            LIMIT $3 OFFSET $4
            "#,
            SHIPMENT_COLUMNS
        ))
        .bind(filter.driver_id)
        .bind(filter.open_only)
        .bind(filter.pagination.limit())
        .bind(filter.pagination.offset())
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(Shipment::try_from)
        .collect::<AppResult<Vec<_>>>()?;

        let ids: Vec<Uuid> = shipments.iter().map(|s| s.id).collect();
        let mut links: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
        for (shipment_id, order_id) in sqlx::query_as::<_, (Uuid, Uuid)>(
            r#"
            SELECT shipment_id, order_id FROM shipment_orders
            WHERE shipment_id = ANY($1)
            ORDER BY order_id
            "#,
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?
        {
            links.entry(shipment_id).or_default().push(order_id);
        }

        let items = shipments
            .into_iter()
            .map(|shipment| ShipmentDetail {
                order_ids: links.remove(&shipment.id).unwrap_or_default(),
                shipment,
            })
            .collect();

        Ok(Page {
            items,
            total: total as u64,
        })
    }
}
