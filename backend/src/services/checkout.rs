//! Customer checkout through Stripe
//!
//! The cart is priced from live catalog prices, checked against shop stock
//! and sent to Stripe. The order itself only exists once the payment
//! webhook confirms the session; until then the cart travels in the session
//! metadata.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use shared::pricing::price_lines;
use shared::stock::{aggregate_requirements, find_shortfalls};
use shared::{validate_order_draft, DeliveryAddress, DeliveryType, DraftItem, OrderDraft};

use crate::config::PaymentsConfig;
use crate::error::{AppError, AppResult};
use crate::external::{CheckoutLine, CheckoutSessionRequest, StripeClient};
use crate::middleware::AuthUser;
use crate::services::catalog::CatalogService;
use crate::store::FulfillmentStore;

/// Stripe limits a metadata value to 500 characters
pub const METADATA_CHUNK_LEN: usize = 500;
/// Stripe allows at most 50 metadata keys per object
pub const METADATA_MAX_KEYS: usize = 50;

const CART_CHUNKS_KEY: &str = "cart_chunks";
const CART_KEY_PREFIX: &str = "cart_";

/// Cart submitted from the storefront
#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutInput {
    pub delivery_type: DeliveryType,
    pub customer_name: String,
    pub customer_phone: String,
    pub customer_email: Option<String>,
    pub note: Option<String>,
    pub shop_id: Option<Uuid>,
    pub address: Option<DeliveryAddress>,
    pub items: Vec<DraftItem>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckoutResponse {
    pub session_id: String,
    pub checkout_url: Option<String>,
    pub total_amount: Decimal,
}

/// Split the serialized draft over as many metadata values as it needs
pub fn encode_cart_metadata(draft: &OrderDraft) -> AppResult<BTreeMap<String, String>> {
    let json = serde_json::to_string(draft)
        .map_err(|e| AppError::Internal(format!("Failed to serialize cart: {}", e)))?;

    let chars: Vec<char> = json.chars().collect();
    let chunks: Vec<String> = chars
        .chunks(METADATA_CHUNK_LEN)
        .map(|chunk| chunk.iter().collect())
        .collect();

    // One key is taken by the chunk count
    if chunks.len() >= METADATA_MAX_KEYS {
        return Err(AppError::Validation {
            field: "items".to_string(),
            message: "Cart is too large for online checkout".to_string(),
        });
    }

    let mut metadata = BTreeMap::new();
    metadata.insert(CART_CHUNKS_KEY.to_string(), chunks.len().to_string());
    for (i, chunk) in chunks.into_iter().enumerate() {
        metadata.insert(format!("{}{}", CART_KEY_PREFIX, i), chunk);
    }
    Ok(metadata)
}

/// Reassemble the draft written by [`encode_cart_metadata`]
pub fn decode_cart_metadata(metadata: &HashMap<String, String>) -> AppResult<OrderDraft> {
    let missing = || AppError::ValidationError("Checkout session carries no cart".to_string());

    let count: usize = metadata
        .get(CART_CHUNKS_KEY)
        .ok_or_else(missing)?
        .parse()
        .map_err(|_| missing())?;

    let mut json = String::new();
    for i in 0..count {
        let chunk = metadata
            .get(&format!("{}{}", CART_KEY_PREFIX, i))
            .ok_or_else(missing)?;
        json.push_str(chunk);
    }

    serde_json::from_str(&json)
        .map_err(|e| AppError::ValidationError(format!("Malformed cart metadata: {}", e)))
}

#[derive(Clone)]
pub struct CheckoutService {
    db: PgPool,
    store: Arc<dyn FulfillmentStore>,
    stripe: StripeClient,
    payments: PaymentsConfig,
}

impl CheckoutService {
    pub fn new(db: PgPool, store: Arc<dyn FulfillmentStore>, payments: &PaymentsConfig) -> Self {
        Self {
            db,
            store,
            stripe: StripeClient::new(payments),
            payments: payments.clone(),
        }
    }

    /// Open a payment session for the cart. Signed-in users are recorded as
    /// the order's creator.
    pub async fn create_session(
        &self,
        user: Option<AuthUser>,
        input: CheckoutInput,
    ) -> AppResult<CheckoutResponse> {
        let draft = OrderDraft {
            delivery_type: input.delivery_type,
            customer_name: input.customer_name,
            customer_phone: input.customer_phone,
            customer_email: input.customer_email,
            note: input.note,
            shop_id: input.shop_id,
            address: input.address,
            items: input.items,
            created_by: user.map(|u| u.user_id),
            payment_session_id: None,
        };
        validate_order_draft(&draft)?;

        let ids: Vec<Uuid> = draft.items.iter().map(|i| i.product_variant_id).collect();
        let quotes = CatalogService::new(self.db.clone()).quotes(&ids).await?;
        let live_prices: HashMap<Uuid, Decimal> =
            quotes.iter().map(|(id, quote)| (*id, quote.price)).collect();
        let priced = price_lines(&draft.items, &live_prices)?;

        // Stock is reserved when the paid order materializes; this only
        // turns away carts that could not be fulfilled right now.
        if let Some(shop_id) = draft.shop_id {
            let required = aggregate_requirements(draft.stock_lines());
            if !required.is_empty() {
                let available: HashMap<Uuid, i32> = self
                    .store
                    .stock_entries(shop_id)
                    .await?
                    .into_iter()
                    .map(|e| (e.product_variant_id, e.quantity))
                    .collect();
                let shortfalls = find_shortfalls(&required, &available);
                if !shortfalls.is_empty() {
                    return Err(AppError::InsufficientStock(shortfalls));
                }
            }
        }

        let lines = priced
            .lines
            .iter()
            .map(|line| CheckoutLine {
                name: quotes
                    .get(&line.product_variant_id)
                    .map(|q| q.label.clone())
                    .unwrap_or_else(|| line.product_variant_id.to_string()),
                unit_price: line.unit_price,
                quantity: line.quantity,
            })
            .collect();

        let request = CheckoutSessionRequest {
            currency: self.payments.currency.clone(),
            success_url: self.payments.success_url.clone(),
            cancel_url: self.payments.cancel_url.clone(),
            customer_email: draft.customer_email.clone(),
            lines,
            metadata: encode_cart_metadata(&draft)?,
        };

        let session = self.stripe.create_checkout_session(&request).await?;
        tracing::info!(
            session_id = %session.id,
            total = %priced.total,
            items = draft.items.len(),
            "Checkout session opened"
        );

        Ok(CheckoutResponse {
            session_id: session.id,
            checkout_url: session.url,
            total_amount: priced.total,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(lines: usize) -> OrderDraft {
        OrderDraft {
            delivery_type: DeliveryType::HomeDelivery,
            customer_name: "Олена Коваль".to_string(),
            customer_phone: "+380501234567".to_string(),
            customer_email: Some("olena@example.com".to_string()),
            note: None,
            shop_id: None,
            address: Some(DeliveryAddress {
                city: "Lviv".to_string(),
                street: "Svobody".to_string(),
                building: Some("12".to_string()),
                apartment: None,
            }),
            items: (0..lines)
                .map(|n| DraftItem {
                    product_variant_id: Uuid::from_u128(n as u128 + 1),
                    quantity: 1,
                    is_from_shop_stock: false,
                })
                .collect(),
            created_by: None,
            payment_session_id: None,
        }
    }

    fn as_hash(metadata: BTreeMap<String, String>) -> HashMap<String, String> {
        metadata.into_iter().collect()
    }

    #[test]
    fn test_cart_metadata_splits_long_carts() {
        let original = draft(20);
        let metadata = encode_cart_metadata(&original).unwrap();

        assert!(metadata.len() > 2);
        assert!(metadata.len() <= METADATA_MAX_KEYS);
        assert!(metadata
            .values()
            .all(|v| v.chars().count() <= METADATA_CHUNK_LEN));

        assert_eq!(decode_cart_metadata(&as_hash(metadata)).unwrap(), original);
    }

    #[test]
    fn test_oversized_cart_rejected() {
        assert!(matches!(
            encode_cart_metadata(&draft(500)),
            Err(AppError::Validation { .. })
        ));
    }

    #[test]
    fn test_missing_chunk_rejected() {
        let mut metadata = as_hash(encode_cart_metadata(&draft(20)).unwrap());
        metadata.remove("cart_1");
        assert!(matches!(
            decode_cart_metadata(&metadata),
            Err(AppError::ValidationError(_))
        ));
        assert!(decode_cart_metadata(&HashMap::new()).is_err());
    }
}
