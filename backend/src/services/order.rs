//! Order lifecycle service
//!
//! Every action passes the role filter first and then the record-level
//! precondition, which the store evaluates inside its transaction.

use std::sync::Arc;

use serde::Deserialize;
use uuid::Uuid;

use shared::workflow::check_shop_authority;
use shared::{
    Actor, Capability, DeliveryAddress, DeliveryType, DraftItem, Entity, Order, OrderCreation,
    OrderDetail, OrderDraft, OrderScope, OrderStatus, PaginatedResponse, Pagination,
    PaginationMeta, Role, WorkflowError,
};

use crate::error::AppResult;
use crate::store::{FulfillmentStore, OrderFilter};

/// Order entered by staff at a shop
#[derive(Debug, Clone, Deserialize)]
pub struct CreateOrderInput {
    pub delivery_type: DeliveryType,
    pub customer_name: String,
    pub customer_phone: String,
    pub customer_email: Option<String>,
    pub note: Option<String>,
    pub shop_id: Option<Uuid>,
    pub address: Option<DeliveryAddress>,
    pub items: Vec<DraftItem>,
}

#[derive(Clone)]
pub struct OrderService {
    store: Arc<dyn FulfillmentStore>,
}

impl OrderService {
    pub fn new(store: Arc<dyn FulfillmentStore>) -> Self {
        Self { store }
    }

    async fn manages(&self, actor: &Actor, shop_id: Option<Uuid>) -> AppResult<bool> {
        match (actor.role, shop_id) {
            (Role::Manager, Some(shop_id)) => self.store.manages_shop(actor.user_id, shop_id).await,
            _ => Ok(false),
        }
    }

    /// Whether the order falls inside the actor's order scope
    async fn is_visible(&self, actor: &Actor, order: &Order) -> AppResult<bool> {
        let managed = if self.manages(actor, order.shop_id).await? {
            order.shop_id.into_iter().collect()
        } else {
            Vec::new()
        };
        Ok(OrderScope::for_actor(actor).admits(order, &managed))
    }

    /// Staff order creation, with stock reservation for shop-stock lines
    pub async fn create(&self, actor: &Actor, input: CreateOrderInput) -> AppResult<OrderDetail> {
        actor.require(Capability::CreateOrder)?;
        if let Some(shop_id) = input.shop_id {
            let manages = self.manages(actor, Some(shop_id)).await?;
            check_shop_authority(actor, shop_id, manages)?;
        }

        let draft = OrderDraft {
            delivery_type: input.delivery_type,
            customer_name: input.customer_name,
            customer_phone: input.customer_phone,
            customer_email: input.customer_email,
            note: input.note,
            shop_id: input.shop_id,
            address: input.address,
            items: input.items,
            created_by: Some(actor.user_id),
            payment_session_id: None,
        };

        let detail = self.store.create_order(draft).await?.into_detail();
        tracing::info!(
            order_id = %detail.order.id,
            total = %detail.order.total_amount,
            created_by = %actor.user_id,
            "Order created"
        );
        Ok(detail)
    }

    /// Materialize a paid checkout. Replays of the same payment session
    /// return the order created the first time.
    pub async fn materialize_checkout(&self, draft: OrderDraft) -> AppResult<OrderCreation> {
        if draft.payment_session_id.is_none() {
            return Err(WorkflowError::validation(
                "payment_session_id",
                "Checkout orders require a payment session",
            )
            .into());
        }

        let creation = self.store.create_order(draft).await?;
        match &creation {
            OrderCreation::Created(detail) => tracing::info!(
                order_id = %detail.order.id,
                session = ?detail.order.payment_session_id,
                "Checkout order created"
            ),
            OrderCreation::AlreadyExists(detail) => tracing::info!(
                order_id = %detail.order.id,
                session = ?detail.order.payment_session_id,
                "Checkout session already materialized"
            ),
        }
        Ok(creation)
    }

    pub async fn take(&self, actor: &Actor, order_id: Uuid) -> AppResult<Order> {
        actor.require(Capability::TakeOrder)?;
        let order = self.store.take_order(order_id, actor.user_id).await?;
        tracing::info!(%order_id, worker_id = %actor.user_id, "Order taken into production");
        Ok(order)
    }

    pub async fn mark_ready(&self, actor: &Actor, order_id: Uuid) -> AppResult<Order> {
        actor.require(Capability::MarkReady)?;
        let order = self.store.mark_ready(order_id, actor.user_id).await?;
        tracing::info!(%order_id, worker_id = %actor.user_id, "Order ready to ship");
        Ok(order)
    }

    /// Explicit cancellation by an admin, or by a manager within their scope
    pub async fn cancel(&self, actor: &Actor, order_id: Uuid) -> AppResult<Order> {
        actor.require(Capability::CancelOrder)?;

        if actor.role == Role::Manager {
            let order = self.find(order_id).await?.order;
            if !self.is_visible(actor, &order).await? {
                return Err(WorkflowError::NotOwner {
                    entity: Entity::Order,
                    id: order_id,
                }
                .into());
            }
        }

        let order = self.store.cancel_order(order_id).await?;
        tracing::info!(%order_id, actor_id = %actor.user_id, "Order cancelled");
        Ok(order)
    }

    async fn find(&self, order_id: Uuid) -> AppResult<OrderDetail> {
        self.store
            .find_order(order_id)
            .await?
            .ok_or_else(|| WorkflowError::not_found(Entity::Order, order_id).into())
    }

    /// Orders outside the actor's scope are reported as missing
    pub async fn get(&self, actor: &Actor, order_id: Uuid) -> AppResult<OrderDetail> {
        let detail = self.find(order_id).await?;
        if !self.is_visible(actor, &detail.order).await? {
            return Err(WorkflowError::not_found(Entity::Order, order_id).into());
        }
        Ok(detail)
    }

    pub async fn list(
        &self,
        actor: &Actor,
        status: Option<OrderStatus>,
        pagination: Pagination,
    ) -> AppResult<PaginatedResponse<Order>> {
        let page = self
            .store
            .list_orders(OrderFilter {
                scope: OrderScope::for_actor(actor),
                status,
                pagination,
            })
            .await?;

        Ok(PaginatedResponse {
            data: page.items,
            pagination: PaginationMeta::new(pagination, page.total),
        })
    }
}
