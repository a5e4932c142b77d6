//! Driver shipment service

use std::sync::Arc;

use serde::Deserialize;
use uuid::Uuid;

use shared::workflow::check_shipment_visibility;
use shared::{
    Actor, Capability, Entity, PaginatedResponse, Pagination, PaginationMeta, Role, ShipmentClaim,
    ShipmentDetail, ShipmentOutcome, WorkflowError,
};

use crate::error::{AppError, AppResult};
use crate::store::{FulfillmentStore, ShipmentFilter};

/// Optional notes a driver attaches when claiming an order
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClaimInput {
    pub route_hint: Option<String>,
    pub comment: Option<String>,
}

#[derive(Clone)]
pub struct ShipmentService {
    store: Arc<dyn FulfillmentStore>,
}

impl ShipmentService {
    pub fn new(store: Arc<dyn FulfillmentStore>) -> Self {
        Self { store }
    }

    /// Claim a ready order. Each claim opens its own shipment.
    pub async fn claim(
        &self,
        actor: &Actor,
        order_id: Uuid,
        input: ClaimInput,
    ) -> AppResult<ShipmentDetail> {
        actor.require(Capability::ClaimOrder)?;

        let result = self
            .store
            .claim_order(ShipmentClaim {
                order_id,
                driver_id: actor.user_id,
                route_hint: input.route_hint,
                comment: input.comment,
            })
            .await;

        match result {
            Ok(detail) => {
                tracing::info!(
                    %order_id,
                    shipment_id = %detail.shipment.id,
                    driver_id = %actor.user_id,
                    "Order claimed"
                );
                Ok(detail)
            }
            Err(AppError::AlreadyClaimed(_)) => {
                tracing::warn!(%order_id, driver_id = %actor.user_id, "Claim lost to another driver");
                Err(AppError::AlreadyClaimed(order_id))
            }
            Err(e) => Err(e),
        }
    }

    pub async fn resolve(
        &self,
        actor: &Actor,
        shipment_id: Uuid,
        outcome: ShipmentOutcome,
    ) -> AppResult<ShipmentDetail> {
        actor.require(Capability::ResolveShipment)?;

        let detail = self
            .store
            .resolve_shipment(shipment_id, actor.user_id, outcome)
            .await?;

        tracing::info!(
            %shipment_id,
            %outcome,
            orders = detail.order_ids.len(),
            driver_id = %actor.user_id,
            "Shipment resolved"
        );
        Ok(detail)
    }

    pub async fn get(&self, actor: &Actor, shipment_id: Uuid) -> AppResult<ShipmentDetail> {
        let detail = self
            .store
            .find_shipment(shipment_id)
            .await?
            .ok_or_else(|| WorkflowError::not_found(Entity::Shipment, shipment_id))?;

        check_shipment_visibility(actor, &detail.shipment)?;
        Ok(detail)
    }

    /// Drivers list their own shipments, admins everyone's
    pub async fn list(
        &self,
        actor: &Actor,
        open_only: bool,
        pagination: Pagination,
    ) -> AppResult<PaginatedResponse<ShipmentDetail>> {
        let driver_id = match actor.role {
            Role::Driver => Some(actor.user_id),
            _ => {
                actor.require(Capability::ViewAllShipments)?;
                None
            }
        };

        let page = self
            .store
            .list_shipments(ShipmentFilter {
                driver_id,
                open_only,
                pagination,
            })
            .await?;

        Ok(PaginatedResponse {
            data: page.items,
            pagination: PaginationMeta::new(pagination, page.total),
        })
    }
}
