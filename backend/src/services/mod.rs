//! Business logic services for the Timber&Grain fulfillment platform

pub mod auth;
pub mod catalog;
pub mod checkout;
pub mod dashboard;
pub mod order;
pub mod payment_webhook;
pub mod receipt;
pub mod shipment;
pub mod shop;
pub mod stock;
pub mod user;

pub use auth::AuthService;
pub use catalog::CatalogService;
pub use checkout::CheckoutService;
pub use dashboard::DashboardService;
pub use order::OrderService;
pub use payment_webhook::PaymentWebhookService;
pub use receipt::ReceiptService;
pub use shipment::ShipmentService;
pub use shop::ShopService;
pub use stock::StockService;
pub use user::UserService;
