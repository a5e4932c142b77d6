//! Order pricing with price snapshots

use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Entity, WorkflowError, WorkflowResult};
use crate::models::DraftItem;

/// A draft line resolved against the live catalog price
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricedLine {
    pub product_variant_id: Uuid,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub line_total: Decimal,
    pub is_from_shop_stock: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricedOrder {
    pub lines: Vec<PricedLine>,
    pub total: Decimal,
}

pub fn line_total(unit_price: Decimal, quantity: i32) -> Decimal {
    unit_price * Decimal::from(quantity)
}

/// Price every draft line from `live_prices` (active variants only).
///
/// The resulting unit prices are the snapshot stored on the order items;
/// later catalog changes never touch them.
pub fn price_lines(
    items: &[DraftItem],
    live_prices: &HashMap<Uuid, Decimal>,
) -> WorkflowResult<PricedOrder> {
    let mut lines = Vec::with_capacity(items.len());
    let mut total = Decimal::ZERO;

    for item in items {
        let unit_price = live_prices
            .get(&item.product_variant_id)
            .copied()
            .ok_or_else(|| WorkflowError::not_found(Entity::ProductVariant, item.product_variant_id))?;
        let line_total = line_total(unit_price, item.quantity);
        total += line_total;
        lines.push(PricedLine {
            product_variant_id: item.product_variant_id,
            quantity: item.quantity,
            unit_price,
            line_total,
            is_from_shop_stock: item.is_from_shop_stock,
        });
    }

    Ok(PricedOrder { lines, total })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn item(n: u128, quantity: i32) -> DraftItem {
        DraftItem {
            product_variant_id: Uuid::from_u128(n),
            quantity,
            is_from_shop_stock: false,
        }
    }

    #[test]
    fn test_totals() {
        let prices = HashMap::from([
            (Uuid::from_u128(1), dec("1299.99")),
            (Uuid::from_u128(2), dec("250.00")),
        ]);
        let priced = price_lines(&[item(1, 2), item(2, 3)], &prices).unwrap();

        assert_eq!(priced.lines[0].line_total, dec("2599.98"));
        assert_eq!(priced.lines[1].line_total, dec("750.00"));
        assert_eq!(priced.total, dec("3349.98"));
    }

    #[test]
    fn test_unknown_variant_is_not_found() {
        let err = price_lines(&[item(7, 1)], &HashMap::new()).unwrap_err();
        assert!(matches!(
            err,
            WorkflowError::NotFound {
                entity: Entity::ProductVariant,
                ..
            }
        ));
    }
}
