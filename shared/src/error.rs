//! Workflow error taxonomy
//!
//! Every variant is recoverable and reported to the acting user. Storage
//! failures are not represented here; they belong to the persistence layer.

use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{Role, ShipmentStatus};
use crate::stock::Shortfall;
use crate::workflow::Capability;

/// Kinds of records a workflow error can point at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Entity {
    Order,
    Shipment,
    Shop,
    ProductVariant,
    Product,
    Material,
    User,
}

impl Entity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Entity::Order => "order",
            Entity::Shipment => "shipment",
            Entity::Shop => "shop",
            Entity::ProductVariant => "product variant",
            Entity::Product => "product",
            Entity::Material => "material",
            Entity::User => "user",
        }
    }
}

impl std::fmt::Display for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkflowError {
    #[error("{field}: {message}")]
    Validation { field: String, message: String },

    #[error("insufficient stock for {} variant(s)", .shortfalls.len())]
    InsufficientStock { shortfalls: Vec<Shortfall> },

    #[error("{entity} {id} is {current}, expected {expected}")]
    WrongStatus {
        entity: Entity,
        id: Uuid,
        current: String,
        expected: String,
    },

    #[error("{entity} {id} is not assigned to the acting user")]
    NotOwner { entity: Entity, id: Uuid },

    #[error("order {order_id} was already claimed by another driver")]
    AlreadyClaimed { order_id: Uuid },

    #[error("shipment {shipment_id} is already {status}")]
    AlreadyResolved {
        shipment_id: Uuid,
        status: ShipmentStatus,
    },

    #[error("{entity} {id} not found")]
    NotFound { entity: Entity, id: String },

    #[error("role {role} may not {capability}")]
    Forbidden { role: Role, capability: Capability },
}

impl WorkflowError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        WorkflowError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn not_found(entity: Entity, id: impl ToString) -> Self {
        WorkflowError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn wrong_status(
        entity: Entity,
        id: Uuid,
        current: impl ToString,
        expected: impl ToString,
    ) -> Self {
        WorkflowError::WrongStatus {
            entity,
            id,
            current: current.to_string(),
            expected: expected.to_string(),
        }
    }
}

pub type WorkflowResult<T> = Result<T, WorkflowError>;
