//! Validation utilities for the Timber&Grain platform

use rust_decimal::Decimal;
use uuid::Uuid;

use crate::error::{WorkflowError, WorkflowResult};
use crate::models::{DeliveryAddress, DeliveryType, DraftItem, OrderDraft};

/// Upper bound for a single order line, to catch typos like 1000 sofas
pub const MAX_LINE_QUANTITY: i32 = 999;

// ============================================================================
// General Validations
// ============================================================================

/// Validate email format (basic check)
pub fn validate_email(email: &str) -> Result<(), &'static str> {
    let Some((local, domain)) = email.split_once('@') else {
        return Err("Invalid email format");
    };
    if local.is_empty() || !domain.contains('.') || domain.starts_with('.') || domain.ends_with('.') {
        return Err("Invalid email format");
    }
    Ok(())
}

/// Validate password strength
pub fn validate_password(password: &str) -> Result<(), &'static str> {
    if password.len() < 8 {
        return Err("Password must be at least 8 characters");
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Err("Password must contain a digit");
    }
    Ok(())
}

/// Validate phone number: optional leading `+`, 10 to 15 digits, common separators allowed
pub fn validate_phone(phone: &str) -> Result<(), &'static str> {
    let trimmed = phone.trim();
    if trimmed.is_empty() {
        return Err("Phone number is required");
    }
    let body = trimmed.strip_prefix('+').unwrap_or(trimmed);
    if !body
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, ' ' | '-' | '(' | ')'))
    {
        return Err("Phone number contains invalid characters");
    }
    let digits = body.chars().filter(|c| c.is_ascii_digit()).count();
    if !(10..=15).contains(&digits) {
        return Err("Phone number must have 10 to 15 digits");
    }
    Ok(())
}

/// Validate a money amount used as a catalog price
pub fn validate_price(price: Decimal) -> Result<(), &'static str> {
    if price <= Decimal::ZERO {
        return Err("Price must be positive");
    }
    if price.scale() > 2 {
        return Err("Price must have at most two decimal places");
    }
    Ok(())
}

/// Validate a requested line quantity
pub fn validate_quantity(quantity: i32) -> Result<(), &'static str> {
    if quantity <= 0 {
        return Err("Quantity must be positive");
    }
    if quantity > MAX_LINE_QUANTITY {
        return Err("Quantity is too large");
    }
    Ok(())
}

/// Validate a manual stock adjustment amount
pub fn validate_adjustment_amount(amount: i32) -> Result<(), &'static str> {
    if amount <= 0 {
        return Err("Amount must be positive");
    }
    Ok(())
}

// ============================================================================
// Order Validations
// ============================================================================

/// Pickup orders name a shop and no address; home delivery needs an address
/// and may name a shop as the stock source.
pub fn validate_delivery_target(
    delivery_type: DeliveryType,
    shop_id: Option<Uuid>,
    address: Option<&DeliveryAddress>,
) -> WorkflowResult<()> {
    match delivery_type {
        DeliveryType::Pickup => {
            if shop_id.is_none() {
                return Err(WorkflowError::validation(
                    "shop_id",
                    "Pickup orders require a shop",
                ));
            }
            if address.is_some() {
                return Err(WorkflowError::validation(
                    "address",
                    "Pickup orders must not carry a delivery address",
                ));
            }
        }
        DeliveryType::HomeDelivery => {
            let Some(address) = address else {
                return Err(WorkflowError::validation(
                    "address",
                    "Home delivery requires an address",
                ));
            };
            if address.city.trim().is_empty() || address.street.trim().is_empty() {
                return Err(WorkflowError::validation(
                    "address",
                    "City and street are required",
                ));
            }
        }
    }
    Ok(())
}

fn validate_items(items: &[DraftItem], shop_id: Option<Uuid>) -> WorkflowResult<()> {
    if items.is_empty() {
        return Err(WorkflowError::validation(
            "items",
            "Order must contain at least one item",
        ));
    }
    for (index, item) in items.iter().enumerate() {
        validate_quantity(item.quantity)
            .map_err(|msg| WorkflowError::validation(format!("items[{}].quantity", index), msg))?;
        if item.is_from_shop_stock && shop_id.is_none() {
            return Err(WorkflowError::validation(
                format!("items[{}].is_from_shop_stock", index),
                "Items taken from shop stock require a shop",
            ));
        }
    }
    Ok(())
}

/// Validate a complete order draft before it reaches storage
pub fn validate_order_draft(draft: &OrderDraft) -> WorkflowResult<()> {
    if draft.customer_name.trim().is_empty() {
        return Err(WorkflowError::validation(
            "customer_name",
            "Customer name is required",
        ));
    }
    validate_phone(&draft.customer_phone)
        .map_err(|msg| WorkflowError::validation("customer_phone", msg))?;
    if let Some(email) = &draft.customer_email {
        validate_email(email).map_err(|msg| WorkflowError::validation("customer_email", msg))?;
    }
    validate_delivery_target(draft.delivery_type, draft.shop_id, draft.address.as_ref())?;
    validate_items(&draft.items, draft.shop_id)?;
    if let Some(session) = &draft.payment_session_id {
        if session.trim().is_empty() {
            return Err(WorkflowError::validation(
                "payment_session_id",
                "Payment session id must not be blank",
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn address() -> DeliveryAddress {
        DeliveryAddress {
            city: "Kyiv".to_string(),
            street: "Khreshchatyk".to_string(),
            building: Some("1".to_string()),
            apartment: None,
        }
    }

    fn draft() -> OrderDraft {
        OrderDraft {
            delivery_type: DeliveryType::Pickup,
            customer_name: "Taras".to_string(),
            customer_phone: "+380 50 123 4567".to_string(),
            customer_email: Some("taras@example.com".to_string()),
            note: None,
            shop_id: Some(Uuid::from_u128(1)),
            address: None,
            items: vec![DraftItem {
                product_variant_id: Uuid::from_u128(2),
                quantity: 1,
                is_from_shop_stock: true,
            }],
            created_by: None,
            payment_session_id: None,
        }
    }

    #[test]
    fn test_email() {
        assert!(validate_email("user@example.com").is_ok());
        assert!(validate_email("user@localhost").is_err());
        assert!(validate_email("@example.com").is_err());
        assert!(validate_email("user.example.com").is_err());
    }

    #[test]
    fn test_password() {
        assert!(validate_password("sofa2024!").is_ok());
        assert!(validate_password("short1").is_err());
        assert!(validate_password("nodigitshere").is_err());
    }

    #[test]
    fn test_phone() {
        assert!(validate_phone("+380501234567").is_ok());
        assert!(validate_phone("(050) 123-45-67").is_ok());
        assert!(validate_phone("12345").is_err());
        assert!(validate_phone("call me").is_err());
        assert!(validate_phone("").is_err());
    }

    #[test]
    fn test_price() {
        assert!(validate_price(Decimal::new(129999, 2)).is_ok());
        assert!(validate_price(Decimal::ZERO).is_err());
        assert!(validate_price(Decimal::new(1, 3)).is_err());
    }

    #[test]
    fn test_delivery_target() {
        let shop = Some(Uuid::from_u128(1));
        assert!(validate_delivery_target(DeliveryType::Pickup, shop, None).is_ok());
        assert!(validate_delivery_target(DeliveryType::Pickup, None, None).is_err());
        assert!(validate_delivery_target(DeliveryType::Pickup, shop, Some(&address())).is_err());
        assert!(validate_delivery_target(DeliveryType::HomeDelivery, None, Some(&address())).is_ok());
        assert!(validate_delivery_target(DeliveryType::HomeDelivery, shop, Some(&address())).is_ok());
        assert!(validate_delivery_target(DeliveryType::HomeDelivery, shop, None).is_err());
    }

    #[test]
    fn test_draft_ok() {
        assert!(validate_order_draft(&draft()).is_ok());
    }

    #[test]
    fn test_draft_without_items() {
        let mut d = draft();
        d.items.clear();
        assert_eq!(
            validate_order_draft(&d),
            Err(WorkflowError::validation(
                "items",
                "Order must contain at least one item"
            ))
        );
    }

    #[test]
    fn test_stock_items_need_shop() {
        let mut d = draft();
        d.delivery_type = DeliveryType::HomeDelivery;
        d.address = Some(address());
        d.shop_id = None;
        match validate_order_draft(&d) {
            Err(WorkflowError::Validation { field, .. }) => {
                assert_eq!(field, "items[0].is_from_shop_stock")
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_zero_quantity() {
        let mut d = draft();
        d.items[0].quantity = 0;
        assert!(matches!(
            validate_order_draft(&d),
            Err(WorkflowError::Validation { .. })
        ));
    }
}
