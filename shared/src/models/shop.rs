//! Shop models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A physical shop: pickup point and stock-holding location
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Shop {
    pub id: Uuid,
    pub city: String,
    pub street: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Shop {
    /// Single-line label used on receipts and dashboards
    pub fn label(&self) -> String {
        format!("{}, {}", self.city, self.street)
    }
}

/// Assignment of a manager user to a shop
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShopManager {
    pub shop_id: Uuid,
    pub user_id: Uuid,
    pub assigned_at: DateTime<Utc>,
}
