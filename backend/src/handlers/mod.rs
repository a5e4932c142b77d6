//! HTTP handlers

pub mod auth;
pub mod catalog;
pub mod checkout;
pub mod dashboard;
pub mod health;
pub mod orders;
pub mod shipments;
pub mod shops;
pub mod users;

pub use auth::{login, me, refresh, register};
pub use catalog::{
    create_material, create_product, create_variant, get_product, list_materials, list_products,
    update_material, update_product, update_variant,
};
pub use checkout::{create_checkout, stripe_webhook};
pub use dashboard::get_dashboard;
pub use health::health_check;
pub use orders::{
    cancel_order, claim_order, create_order, get_order, get_receipt, list_orders, mark_ready,
    take_order,
};
pub use shipments::{cancel_shipment, deliver_shipment, get_shipment, list_shipments};
pub use shops::{
    adjust_stock, assign_manager, create_shop, get_stock, list_managers, list_shops,
    list_stock_moves, unassign_manager, update_shop,
};
pub use users::{create_user, list_users, set_user_active};
