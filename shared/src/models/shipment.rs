//! Shipment models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::OrderStatus;

/// A driver's working unit: one or more orders carried and resolved together
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Shipment {
    pub id: Uuid,
    pub driver_id: Uuid,
    pub status: ShipmentStatus,
    pub planned_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub route_hint: Option<String>,
    pub comment: Option<String>,
}

/// Join row between a shipment and one of its orders
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ShipmentOrder {
    pub shipment_id: Uuid,
    pub order_id: Uuid,
}

/// Shipment with the ids of the orders it carries
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ShipmentDetail {
    #[serde(flatten)]
    pub shipment: Shipment,
    pub order_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShipmentStatus {
    Planned,
    InTransit,
    Delivered,
    Cancelled,
}

impl ShipmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShipmentStatus::Planned => "planned",
            ShipmentStatus::InTransit => "in_transit",
            ShipmentStatus::Delivered => "delivered",
            ShipmentStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ShipmentStatus::Delivered | ShipmentStatus::Cancelled)
    }
}

impl std::fmt::Display for ShipmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ShipmentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "planned" => Ok(ShipmentStatus::Planned),
            "in_transit" => Ok(ShipmentStatus::InTransit),
            "delivered" => Ok(ShipmentStatus::Delivered),
            "cancelled" => Ok(ShipmentStatus::Cancelled),
            other => Err(format!("unknown shipment status: {}", other)),
        }
    }
}

/// How a driver resolves a shipment. Applied to the shipment and every order in it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShipmentOutcome {
    Delivered,
    Cancelled,
}

impl ShipmentOutcome {
    pub fn shipment_status(&self) -> ShipmentStatus {
        match self {
            ShipmentOutcome::Delivered => ShipmentStatus::Delivered,
            ShipmentOutcome::Cancelled => ShipmentStatus::Cancelled,
        }
    }

    pub fn order_status(&self) -> OrderStatus {
        match self {
            ShipmentOutcome::Delivered => OrderStatus::Delivered,
            ShipmentOutcome::Cancelled => OrderStatus::Cancelled,
        }
    }
}

impl std::fmt::Display for ShipmentOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.shipment_status().as_str())
    }
}

/// A driver's request to take a ready order on the road.
///
/// Every claim opens a new shipment; batching several orders per claim
/// would extend this with a target shipment id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShipmentClaim {
    pub order_id: Uuid,
    pub driver_id: Uuid,
    pub route_hint: Option<String>,
    pub comment: Option<String>,
}
