//! Order fulfillment workflow rules
//!
//! Two layers guard every mutating action:
//!
//! 1. A coarse role filter ([`Role::can`]) deciding whether the role may
//!    request the action at all.
//! 2. A fine-grained precondition (`check_*`) deciding whether this record,
//!    in its current state, may be acted on by this actor.
//!
//! Storage backends call the `check_*` functions inside their transaction,
//! against freshly read rows, so both the HTTP layer and the data layer
//! enforce the same table.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Entity, WorkflowError, WorkflowResult};
use crate::models::{Actor, Order, OrderStatus, Role, Shipment, ShipmentOutcome, ShipmentStatus};

/// Privileged actions, gated by role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    CreateOrder,
    TakeOrder,
    MarkReady,
    ClaimOrder,
    ResolveShipment,
    CancelOrder,
    AdjustStock,
    ManageCatalog,
    ManageShops,
    ManageUsers,
    ViewAllOrders,
    ViewAllShipments,
    ViewDashboard,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::CreateOrder => "create_order",
            Capability::TakeOrder => "take_order",
            Capability::MarkReady => "mark_ready",
            Capability::ClaimOrder => "claim_order",
            Capability::ResolveShipment => "resolve_shipment",
            Capability::CancelOrder => "cancel_order",
            Capability::AdjustStock => "adjust_stock",
            Capability::ManageCatalog => "manage_catalog",
            Capability::ManageShops => "manage_shops",
            Capability::ManageUsers => "manage_users",
            Capability::ViewAllOrders => "view_all_orders",
            Capability::ViewAllShipments => "view_all_shipments",
            Capability::ViewDashboard => "view_dashboard",
        }
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Role {
    /// The role/capability table
    pub fn can(&self, capability: Capability) -> bool {
        use Capability::*;

        match self {
            Role::Customer => false,
            Role::Manager => matches!(
                capability,
                CreateOrder | CancelOrder | AdjustStock | ViewDashboard
            ),
            Role::FactoryWorker => matches!(capability, TakeOrder | MarkReady),
            Role::Driver => matches!(capability, ClaimOrder | ResolveShipment),
            Role::Admin => matches!(
                capability,
                CreateOrder
                    | CancelOrder
                    | AdjustStock
                    | ManageCatalog
                    | ManageShops
                    | ManageUsers
                    | ViewAllOrders
                    | ViewAllShipments
                    | ViewDashboard
            ),
        }
    }
}

impl Actor {
    pub fn require(&self, capability: Capability) -> WorkflowResult<()> {
        if self.role.can(capability) {
            Ok(())
        } else {
            Err(WorkflowError::Forbidden {
                role: self.role,
                capability,
            })
        }
    }
}

/// created → in_production, by any factory worker
pub fn check_take(order: &Order) -> WorkflowResult<OrderStatus> {
    if order.status != OrderStatus::Created {
        return Err(WorkflowError::wrong_status(
            Entity::Order,
            order.id,
            order.status,
            OrderStatus::Created,
        ));
    }
    Ok(OrderStatus::InProduction)
}

/// in_production → ready_to_ship, only by the worker who took the order
pub fn check_mark_ready(order: &Order, worker_id: Uuid) -> WorkflowResult<OrderStatus> {
    if order.status != OrderStatus::InProduction {
        return Err(WorkflowError::wrong_status(
            Entity::Order,
            order.id,
            order.status,
            OrderStatus::InProduction,
        ));
    }
    if order.factory_worker_id != Some(worker_id) {
        return Err(WorkflowError::NotOwner {
            entity: Entity::Order,
            id: order.id,
        });
    }
    Ok(OrderStatus::ReadyToShip)
}

/// ready_to_ship → in_transit, only while no driver holds the order.
///
/// Also classifies a claim whose conditional update matched no row: once a
/// driver is set the loser gets `AlreadyClaimed`, otherwise the status was wrong.
pub fn check_claim(order: &Order) -> WorkflowResult<OrderStatus> {
    if order.is_claimable() {
        return Ok(OrderStatus::InTransit);
    }
    if order.driver_id.is_some() {
        return Err(WorkflowError::AlreadyClaimed { order_id: order.id });
    }
    Err(WorkflowError::wrong_status(
        Entity::Order,
        order.id,
        order.status,
        OrderStatus::ReadyToShip,
    ))
}

/// in_transit → delivered | cancelled, only by the shipment's driver
pub fn check_resolve(shipment: &Shipment, driver_id: Uuid) -> WorkflowResult<()> {
    if shipment.driver_id != driver_id {
        return Err(WorkflowError::NotOwner {
            entity: Entity::Shipment,
            id: shipment.id,
        });
    }
    if shipment.status.is_terminal() {
        return Err(WorkflowError::AlreadyResolved {
            shipment_id: shipment.id,
            status: shipment.status,
        });
    }
    if shipment.status != ShipmentStatus::InTransit {
        return Err(WorkflowError::wrong_status(
            Entity::Shipment,
            shipment.id,
            shipment.status,
            ShipmentStatus::InTransit,
        ));
    }
    Ok(())
}

/// Status a shipment outcome moves `order` to.
///
/// Only orders on the road follow their shipment; any other order in it is
/// left where it is.
pub fn cascade_status(order: &Order, outcome: ShipmentOutcome) -> Option<OrderStatus> {
    let next = outcome.order_status();
    (order.status == OrderStatus::InTransit && order.status.can_advance_to(next)).then_some(next)
}

/// Explicit cancellation, allowed from any non-terminal status
pub fn check_cancel(order: &Order) -> WorkflowResult<OrderStatus> {
    if order.status.is_terminal() {
        return Err(WorkflowError::wrong_status(
            Entity::Order,
            order.id,
            order.status,
            "a non-terminal status",
        ));
    }
    Ok(OrderStatus::Cancelled)
}

/// Admins act on every shop, managers only on the shops assigned to them
pub fn check_shop_authority(actor: &Actor, shop_id: Uuid, manages_shop: bool) -> WorkflowResult<()> {
    match actor.role {
        Role::Admin => Ok(()),
        Role::Manager if manages_shop => Ok(()),
        Role::Manager => Err(WorkflowError::NotOwner {
            entity: Entity::Shop,
            id: shop_id,
        }),
        role => Err(WorkflowError::Forbidden {
            role,
            capability: Capability::AdjustStock,
        }),
    }
}

/// Drivers see their own shipments, admins see all
pub fn check_shipment_visibility(actor: &Actor, shipment: &Shipment) -> WorkflowResult<()> {
    if actor.role.can(Capability::ViewAllShipments) || shipment.driver_id == actor.user_id {
        return Ok(());
    }
    Err(WorkflowError::NotOwner {
        entity: Entity::Shipment,
        id: shipment.id,
    })
}

/// Which orders an actor may list and read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderScope {
    All,
    /// Orders of shops the manager runs, plus orders they entered themselves
    ManagedBy(Uuid),
    /// The `created` queue plus orders this worker is producing
    ProductionQueue(Uuid),
    /// Unclaimed ready orders plus orders this driver carries
    DeliveryQueue(Uuid),
    CreatedBy(Uuid),
}

impl OrderScope {
    pub fn for_actor(actor: &Actor) -> Self {
        if actor.role.can(Capability::ViewAllOrders) {
            return OrderScope::All;
        }
        match actor.role {
            Role::Manager => OrderScope::ManagedBy(actor.user_id),
            Role::FactoryWorker => OrderScope::ProductionQueue(actor.user_id),
            Role::Driver => OrderScope::DeliveryQueue(actor.user_id),
            Role::Admin | Role::Customer => OrderScope::CreatedBy(actor.user_id),
        }
    }

    /// `managed_shops` only matters for [`OrderScope::ManagedBy`]
    pub fn admits(&self, order: &Order, managed_shops: &[Uuid]) -> bool {
        match *self {
            OrderScope::All => true,
            OrderScope::ManagedBy(user_id) => {
                order.created_by == Some(user_id)
                    || order
                        .shop_id
                        .map_or(false, |shop_id| managed_shops.contains(&shop_id))
            }
            OrderScope::ProductionQueue(worker_id) => {
                order.status == OrderStatus::Created || order.factory_worker_id == Some(worker_id)
            }
            OrderScope::DeliveryQueue(driver_id) => {
                order.is_claimable() || order.driver_id == Some(driver_id)
            }
            OrderScope::CreatedBy(user_id) => order.created_by == Some(user_id),
        }
    }
}
