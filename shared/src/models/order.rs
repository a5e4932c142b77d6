//! Order models

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A customer order tracked through the fulfillment lifecycle
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Order {
    pub id: Uuid,
    pub status: OrderStatus,
    pub delivery_type: DeliveryType,
    pub customer_name: String,
    pub customer_phone: String,
    pub customer_email: Option<String>,
    pub total_amount: Decimal,
    pub note: Option<String>,
    /// Pickup shop, or the shop stock is drawn from for home delivery
    pub shop_id: Option<Uuid>,
    pub address: Option<DeliveryAddress>,
    pub factory_worker_id: Option<Uuid>,
    pub driver_id: Option<Uuid>,
    /// None for anonymous checkout orders materialized by the payment webhook
    pub created_by: Option<Uuid>,
    pub payment_session_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// A driver may claim the order only while it waits for pickup and nobody holds it
    pub fn is_claimable(&self) -> bool {
        self.status == OrderStatus::ReadyToShip && self.driver_id.is_none()
    }
}

/// Order lifecycle status.
///
/// Progression is strictly left to right:
/// created → in_production → ready_to_ship → in_transit → delivered | cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Created,
    InProduction,
    ReadyToShip,
    InTransit,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 6] = [
        OrderStatus::Created,
        OrderStatus::InProduction,
        OrderStatus::ReadyToShip,
        OrderStatus::InTransit,
        OrderStatus::Delivered,
        OrderStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Created => "created",
            OrderStatus::InProduction => "in_production",
            OrderStatus::ReadyToShip => "ready_to_ship",
            OrderStatus::InTransit => "in_transit",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    /// Position along the fulfillment chain. Both terminal states share the last rank.
    pub fn rank(&self) -> u8 {
        match self {
            OrderStatus::Created => 0,
            OrderStatus::InProduction => 1,
            OrderStatus::ReadyToShip => 2,
            OrderStatus::InTransit => 3,
            OrderStatus::Delivered | OrderStatus::Cancelled => 4,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Delivered | OrderStatus::Cancelled)
    }

    /// Whether `next` is a legal successor of `self`
    pub fn can_advance_to(&self, next: OrderStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        match next {
            OrderStatus::Cancelled => true,
            OrderStatus::Delivered => *self == OrderStatus::InTransit,
            _ => next.rank() == self.rank() + 1,
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OrderStatus::ALL
            .into_iter()
            .find(|st| st.as_str() == s)
            .ok_or_else(|| format!("unknown order status: {}", s))
    }
}

/// How the order reaches the customer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryType {
    Pickup,
    HomeDelivery,
}

impl DeliveryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryType::Pickup => "pickup",
            DeliveryType::HomeDelivery => "home_delivery",
        }
    }
}

impl std::fmt::Display for DeliveryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DeliveryType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pickup" => Ok(DeliveryType::Pickup),
            "home_delivery" => Ok(DeliveryType::HomeDelivery),
            other => Err(format!("unknown delivery type: {}", other)),
        }
    }
}

/// Home delivery address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryAddress {
    pub city: String,
    pub street: String,
    pub building: Option<String>,
    pub apartment: Option<String>,
}

impl std::fmt::Display for DeliveryAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}, {}", self.city, self.street)?;
        if let Some(building) = &self.building {
            write!(f, " {}", building)?;
        }
        if let Some(apartment) = &self.apartment {
            write!(f, ", apt. {}", apartment)?;
        }
        Ok(())
    }
}

/// A line of an order with its price snapshot
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_variant_id: Uuid,
    pub quantity: i32,
    /// Variant price captured when the order was created
    pub unit_price: Decimal,
    pub line_total: Decimal,
    pub is_from_shop_stock: bool,
}

/// An order together with its lines
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderDetail {
    #[serde(flatten)]
    pub order: Order,
    pub items: Vec<OrderItem>,
}

/// Requested line of a new order, before pricing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftItem {
    pub product_variant_id: Uuid,
    pub quantity: i32,
    #[serde(default)]
    pub is_from_shop_stock: bool,
}

/// Everything needed to materialize a new order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderDraft {
    pub delivery_type: DeliveryType,
    pub customer_name: String,
    pub customer_phone: String,
    pub customer_email: Option<String>,
    pub note: Option<String>,
    pub shop_id: Option<Uuid>,
    pub address: Option<DeliveryAddress>,
    pub items: Vec<DraftItem>,
    pub created_by: Option<Uuid>,
    /// Idempotency key for orders created from a payment session
    pub payment_session_id: Option<String>,
}

impl OrderDraft {
    /// Lines that must be reserved from the shop's stock
    pub fn stock_lines(&self) -> impl Iterator<Item = (Uuid, i32)> + '_ {
        self.items
            .iter()
            .filter(|item| item.is_from_shop_stock)
            .map(|item| (item.product_variant_id, item.quantity))
    }
}

/// Result of materializing an order that may already exist
#[derive(Debug, Clone, PartialEq)]
pub enum OrderCreation {
    Created(OrderDetail),
    /// The payment session was already materialized earlier
    AlreadyExists(OrderDetail),
}

impl OrderCreation {
    pub fn detail(&self) -> &OrderDetail {
        match self {
            OrderCreation::Created(detail) | OrderCreation::AlreadyExists(detail) => detail,
        }
    }

    pub fn into_detail(self) -> OrderDetail {
        match self {
            OrderCreation::Created(detail) | OrderCreation::AlreadyExists(detail) => detail,
        }
    }

    pub fn is_new(&self) -> bool {
        matches!(self, OrderCreation::Created(_))
    }
}
