//! Admin and manager dashboard figures
//!
//! Admins see every shop. Managers see the shops they manage.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use shared::{Actor, Capability, OrderStatus, Role};

use crate::error::AppResult;

/// Stock at or below this level is reported as low
pub const LOW_STOCK_THRESHOLD: i32 = 2;

/// Shop filter shared by every dashboard query; `$1` is the manager id or NULL
const SHOP_SCOPE: &str =
    "($1::uuid IS NULL OR shop_id IN (SELECT shop_id FROM shop_managers WHERE user_id = $1))";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusCount {
    pub status: OrderStatus,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct LowStockEntry {
    pub shop_id: Uuid,
    pub product_variant_id: Uuid,
    pub quantity: i32,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DashboardSummary {
    pub orders_by_status: Vec<StatusCount>,
    pub open_shipments: i64,
    pub low_stock: Vec<LowStockEntry>,
    pub delivered_revenue: Decimal,
}

/// One count per status, in lifecycle order, zero where nothing matched
pub fn fold_status_counts(rows: Vec<(String, i64)>) -> Vec<StatusCount> {
    OrderStatus::ALL
        .into_iter()
        .map(|status| StatusCount {
            status,
            count: rows
                .iter()
                .filter(|(s, _)| s == status.as_str())
                .map(|(_, c)| *c)
                .sum(),
        })
        .collect()
}

#[derive(Clone)]
pub struct DashboardService {
    db: PgPool,
}

impl DashboardService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    pub async fn summary(&self, actor: &Actor) -> AppResult<DashboardSummary> {
        actor.require(Capability::ViewDashboard)?;
        let manager_id = match actor.role {
            Role::Manager => Some(actor.user_id),
            _ => None,
        };

        let rows = sqlx::query_as::<_, (String, i64)>(&format!(
            "SELECT status, COUNT(*) FROM orders WHERE {} GROUP BY status",
            SHOP_SCOPE
        ))
        .bind(manager_id)
        .fetch_all(&self.db)
        .await?;

        let open_shipments = sqlx::query_scalar::<_, i64>(&format!(
            r#"
            SELECT COUNT(DISTINCT s.id)
            FROM shipments s
            JOIN shipment_orders so ON so.shipment_id = s.id
            WHERE s.status IN ('planned', 'in_transit')
              AND so.order_id IN (SELECT id FROM orders WHERE {})
            "#,
            SHOP_SCOPE
        ))
        .bind(manager_id)
        .fetch_one(&self.db)
        .await?;

        let low_stock = sqlx::query_as::<_, LowStockEntry>(&format!(
            r#"
            SELECT shop_id, product_variant_id, quantity, updated_at
            FROM shop_stock
            WHERE quantity <= $2 AND {}
            ORDER BY quantity, shop_id, product_variant_id
            "#,
            SHOP_SCOPE
        ))
        .bind(manager_id)
        .bind(LOW_STOCK_THRESHOLD)
        .fetch_all(&self.db)
        .await?;

        let delivered_revenue = sqlx::query_scalar::<_, Decimal>(&format!(
            "SELECT COALESCE(SUM(total_amount), 0) FROM orders WHERE status = 'delivered' AND {}",
            SHOP_SCOPE
        ))
        .bind(manager_id)
        .fetch_one(&self.db)
        .await?;

        Ok(DashboardSummary {
            orders_by_status: fold_status_counts(rows),
            open_shipments,
            low_stock,
            delivered_revenue,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fold_status_counts() {
        let counts = fold_status_counts(vec![
            ("in_transit".to_string(), 3),
            ("created".to_string(), 5),
        ]);

        assert_eq!(counts.len(), OrderStatus::ALL.len());
        assert_eq!(counts[0], StatusCount { status: OrderStatus::Created, count: 5 });
        assert_eq!(counts[1].count, 0);
        assert_eq!(counts[3], StatusCount { status: OrderStatus::InTransit, count: 3 });
    }
}
