//! Domain models for the Timber&Grain platform

mod catalog;
mod order;
mod shipment;
mod shop;
mod stock;
mod user;

pub use catalog::*;
pub use order::*;
pub use shipment::*;
pub use shop::*;
pub use stock::*;
pub use user::*;
