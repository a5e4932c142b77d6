//! Fixtures shared by the integration tests

#![allow(dead_code)]

use std::str::FromStr;
use std::sync::Arc;

use rust_decimal::Decimal;
use uuid::Uuid;

use shared::{Actor, DeliveryAddress, DeliveryType, DraftItem, Role};
use timber_grain_backend::services::order::CreateOrderInput;
use timber_grain_backend::services::OrderService;
use timber_grain_backend::store::MemoryFulfillmentStore;
use timber_grain_backend::FulfillmentStore;

pub fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

/// A seeded store with one shop, two variants and one user per role
pub struct Fixture {
    pub store: Arc<MemoryFulfillmentStore>,
    pub shop_id: Uuid,
    pub sofa: Uuid,
    pub armchair: Uuid,
    pub admin: Actor,
    pub manager: Actor,
    pub worker: Actor,
    pub other_worker: Actor,
    pub driver: Actor,
    pub other_driver: Actor,
    pub customer: Actor,
}

impl Fixture {
    pub async fn new() -> Self {
        let store = Arc::new(MemoryFulfillmentStore::new());
        let shop_id = Uuid::new_v4();
        let sofa = Uuid::new_v4();
        let armchair = Uuid::new_v4();
        let manager = Actor::new(Uuid::new_v4(), Role::Manager);

        store.seed_shop(shop_id).await;
        store.assign_manager(shop_id, manager.user_id).await;
        store.seed_variant(sofa, dec("1200.00")).await;
        store.seed_variant(armchair, dec("450.50")).await;

        Self {
            store,
            shop_id,
            sofa,
            armchair,
            admin: Actor::new(Uuid::new_v4(), Role::Admin),
            manager,
            worker: Actor::new(Uuid::new_v4(), Role::FactoryWorker),
            other_worker: Actor::new(Uuid::new_v4(), Role::FactoryWorker),
            driver: Actor::new(Uuid::new_v4(), Role::Driver),
            other_driver: Actor::new(Uuid::new_v4(), Role::Driver),
            customer: Actor::new(Uuid::new_v4(), Role::Customer),
        }
    }

    pub fn dyn_store(&self) -> Arc<dyn FulfillmentStore> {
        self.store.clone()
    }

    pub fn orders(&self) -> OrderService {
        OrderService::new(self.dyn_store())
    }

    /// Pickup order at the fixture shop, made to order (no stock lines)
    pub fn pickup(&self, items: Vec<DraftItem>) -> CreateOrderInput {
        CreateOrderInput {
            delivery_type: DeliveryType::Pickup,
            customer_name: "Taras Shevchuk".to_string(),
            customer_phone: "+380 50 123 4567".to_string(),
            customer_email: Some("taras@example.com".to_string()),
            note: None,
            shop_id: Some(self.shop_id),
            address: None,
            items,
        }
    }

    pub fn home_delivery(&self, items: Vec<DraftItem>) -> CreateOrderInput {
        CreateOrderInput {
            delivery_type: DeliveryType::HomeDelivery,
            customer_name: "Iryna Bondar".to_string(),
            customer_phone: "0671234567".to_string(),
            customer_email: None,
            note: Some("Call before arrival".to_string()),
            shop_id: None,
            address: Some(DeliveryAddress {
                city: "Kyiv".to_string(),
                street: "Sahaidachnoho".to_string(),
                building: Some("10".to_string()),
                apartment: Some("4".to_string()),
            }),
            items,
        }
    }

    /// Create an order and push it through production to ready_to_ship
    pub async fn ready_order(&self) -> Uuid {
        let orders = self.orders();
        let detail = orders
            .create(&self.admin, self.pickup(vec![line(self.sofa, 1)]))
            .await
            .unwrap();
        let order_id = detail.order.id;
        orders.take(&self.worker, order_id).await.unwrap();
        orders.mark_ready(&self.worker, order_id).await.unwrap();
        order_id
    }
}

pub fn line(variant_id: Uuid, quantity: i32) -> DraftItem {
    DraftItem {
        product_variant_id: variant_id,
        quantity,
        is_from_shop_stock: false,
    }
}

pub fn stock_line(variant_id: Uuid, quantity: i32) -> DraftItem {
    DraftItem {
        product_variant_id: variant_id,
        quantity,
        is_from_shop_stock: true,
    }
}
