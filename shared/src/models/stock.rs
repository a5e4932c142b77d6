//! Shop stock ledger models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Quantity of one variant held by one shop. Never negative.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ShopStockEntry {
    pub shop_id: Uuid,
    pub product_variant_id: Uuid,
    pub quantity: i32,
    pub updated_at: DateTime<Utc>,
}

/// Append-only audit record of a stock quantity change
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StockMove {
    pub id: Uuid,
    pub shop_id: Uuid,
    pub product_variant_id: Uuid,
    /// Signed quantity change
    pub delta: i32,
    pub reason: StockReason,
    pub note: Option<String>,
    pub order_id: Option<Uuid>,
    /// None when the move was caused by an anonymous checkout
    pub actor_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StockReason {
    ManualAdjustment,
    OrderReservation,
}

impl StockReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            StockReason::ManualAdjustment => "manual_adjustment",
            StockReason::OrderReservation => "order_reservation",
        }
    }
}

impl std::str::FromStr for StockReason {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "manual_adjustment" => Ok(StockReason::ManualAdjustment),
            "order_reservation" => Ok(StockReason::OrderReservation),
            other => Err(format!("unknown stock reason: {}", other)),
        }
    }
}

/// Direction of a manual adjustment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StockOperation {
    In,
    Out,
}

impl StockOperation {
    /// Signed delta for a positive amount
    pub fn delta(&self, amount: i32) -> i32 {
        match self {
            StockOperation::In => amount,
            StockOperation::Out => -amount,
        }
    }
}

/// A validated manual adjustment request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockAdjustment {
    pub shop_id: Uuid,
    pub product_variant_id: Uuid,
    pub delta: i32,
    pub reason: StockReason,
    pub note: Option<String>,
    pub actor_id: Uuid,
}
