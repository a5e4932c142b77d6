//! WebAssembly module for the Timber&Grain dashboards and storefront
//!
//! Provides client-side computation for:
//! - Which order actions to offer a role
//! - Status labels
//! - Cart totals from catalog prices
//! - Checkout form validation before submission

use std::collections::HashMap;

use js_sys::Array;
use rust_decimal::Decimal;
use uuid::Uuid;
use wasm_bindgen::prelude::*;

use shared::pricing::price_lines;
use shared::{validate_order_draft, Capability, DraftItem, OrderDraft, OrderStatus, Role};

// Re-export shared types for use in JavaScript
pub use shared::models::*;
pub use shared::types::*;

/// Order actions a role may attempt in the given status.
///
/// Ownership (the assigned worker or driver) is checked by the server.
pub fn order_actions(role: Role, status: OrderStatus) -> Vec<Capability> {
    let candidates = [
        (Capability::TakeOrder, status == OrderStatus::Created),
        (Capability::MarkReady, status == OrderStatus::InProduction),
        (Capability::ClaimOrder, status == OrderStatus::ReadyToShip),
        (Capability::CancelOrder, !status.is_terminal()),
    ];

    candidates
        .into_iter()
        .filter(|(capability, applies)| *applies && role.can(*capability))
        .map(|(capability, _)| capability)
        .collect()
}

/// Allowed actions as an array of action names
#[wasm_bindgen]
pub fn allowed_actions(role: &str, status: &str) -> Result<Array, JsValue> {
    let role: Role = role.parse().map_err(|e: String| JsValue::from_str(&e))?;
    let status: OrderStatus = status.parse().map_err(|e: String| JsValue::from_str(&e))?;

    Ok(order_actions(role, status)
        .iter()
        .map(|capability| JsValue::from_str(capability.as_str()))
        .collect())
}

/// Human readable order status
#[wasm_bindgen]
pub fn order_status_label(status: &str) -> String {
    match status.parse::<OrderStatus>() {
        Ok(OrderStatus::Created) => "New".to_string(),
        Ok(OrderStatus::InProduction) => "In production".to_string(),
        Ok(OrderStatus::ReadyToShip) => "Ready to ship".to_string(),
        Ok(OrderStatus::InTransit) => "On the way".to_string(),
        Ok(OrderStatus::Delivered) => "Delivered".to_string(),
        Ok(OrderStatus::Cancelled) => "Cancelled".to_string(),
        Err(_) => status.to_string(),
    }
}

/// Cart total from draft lines and a `{variant_id: price}` map.
///
/// Returns the total as a decimal string.
#[wasm_bindgen]
pub fn cart_total(items_json: &str, prices_json: &str) -> Result<String, JsValue> {
    let items: Vec<DraftItem> = serde_json::from_str(items_json)
        .map_err(|e| JsValue::from_str(&format!("Invalid items JSON: {}", e)))?;
    let prices: HashMap<Uuid, Decimal> = serde_json::from_str(prices_json)
        .map_err(|e| JsValue::from_str(&format!("Invalid prices JSON: {}", e)))?;

    let priced = price_lines(&items, &prices).map_err(|e| JsValue::from_str(&e.to_string()))?;
    Ok(priced.total.to_string())
}

/// Validate a checkout form. Returns the first problem, or `None` if valid.
#[wasm_bindgen]
pub fn validate_checkout(draft_json: &str) -> Option<String> {
    match serde_json::from_str::<OrderDraft>(draft_json) {
        Ok(draft) => validate_order_draft(&draft).err().map(|e| e.to_string()),
        Err(e) => Some(format!("Invalid checkout JSON: {}", e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_actions() {
        assert_eq!(
            order_actions(Role::FactoryWorker, OrderStatus::Created),
            vec![Capability::TakeOrder]
        );
        assert_eq!(
            order_actions(Role::Driver, OrderStatus::ReadyToShip),
            vec![Capability::ClaimOrder]
        );
        assert!(order_actions(Role::Driver, OrderStatus::Created).is_empty());
        assert_eq!(
            order_actions(Role::Admin, OrderStatus::InTransit),
            vec![Capability::CancelOrder]
        );
        assert!(order_actions(Role::Admin, OrderStatus::Delivered).is_empty());
        assert!(order_actions(Role::Customer, OrderStatus::Created).is_empty());
    }

    #[test]
    fn test_status_label() {
        assert_eq!(order_status_label("ready_to_ship"), "Ready to ship");
        assert_eq!(order_status_label("unknown"), "unknown");
    }

    #[test]
    fn test_cart_total() {
        let variant = Uuid::from_u128(7);
        let items = format!(
            r#"[{{"product_variant_id":"{}","quantity":3}}]"#,
            variant
        );
        let prices = format!(r#"{{"{}":"199.90"}}"#, variant);
        assert_eq!(cart_total(&items, &prices).unwrap(), "599.70");
    }

    #[test]
    fn test_validate_checkout() {
        let draft = r#"{
            "delivery_type": "pickup",
            "customer_name": "Marta",
            "customer_phone": "+380501112233",
            "customer_email": null,
            "note": null,
            "shop_id": null,
            "address": null,
            "items": [],
            "created_by": null,
            "payment_session_id": null
        }"#;
        assert!(validate_checkout(draft).is_some());
        assert!(validate_checkout("not json").is_some());
    }
}
