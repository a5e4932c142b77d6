//! Order receipts rendered as CSV

use std::collections::HashMap;
use std::sync::Arc;

use sqlx::PgPool;
use uuid::Uuid;

use shared::{Actor, DeliveryType, OrderDetail};

use crate::error::{AppError, AppResult};
use crate::services::catalog::CatalogService;
use crate::services::order::OrderService;
use crate::services::shop::ShopService;
use crate::store::FulfillmentStore;

/// A rendered receipt ready to be served as a download
#[derive(Debug, Clone)]
pub struct Receipt {
    pub filename: String,
    pub body: String,
}

/// Render the receipt: a header block, the priced lines, then the total.
///
/// Lines use the prices captured on the order, never the live catalog.
pub fn render_receipt_csv(
    detail: &OrderDetail,
    labels: &HashMap<Uuid, String>,
    shop_label: Option<&str>,
) -> AppResult<String> {
    let order = &detail.order;
    let mut writer = csv::WriterBuilder::new()
        .flexible(true)
        .from_writer(Vec::new());

    let delivery = match order.delivery_type {
        DeliveryType::Pickup => format!("Pickup at {}", shop_label.unwrap_or("shop")),
        DeliveryType::HomeDelivery => match &order.address {
            Some(address) => format!("Home delivery to {}", address),
            None => "Home delivery".to_string(),
        },
    };

    let header = [
        ("Order", order.id.to_string()),
        ("Date", order.created_at.format("%Y-%m-%d %H:%M UTC").to_string()),
        ("Status", order.status.to_string()),
        ("Customer", order.customer_name.clone()),
        ("Phone", order.customer_phone.clone()),
        ("Delivery", delivery),
    ];
    for (label, value) in header {
        writer.write_record([label, value.as_str()]).map_err(csv_error)?;
    }
    writer.write_record([""]).map_err(csv_error)?;

    writer
        .write_record(["Item", "Quantity", "Unit price", "Line total"])
        .map_err(csv_error)?;
    for item in &detail.items {
        let name = labels
            .get(&item.product_variant_id)
            .cloned()
            .unwrap_or_else(|| item.product_variant_id.to_string());
        writer
            .write_record([
                name,
                item.quantity.to_string(),
                item.unit_price.to_string(),
                item.line_total.to_string(),
            ])
            .map_err(csv_error)?;
    }
    let total = order.total_amount.to_string();
    writer
        .write_record(["Total", "", "", total.as_str()])
        .map_err(csv_error)?;

    let bytes = writer
        .into_inner()
        .map_err(|e| AppError::Internal(format!("Failed to finish receipt: {}", e)))?;
    String::from_utf8(bytes).map_err(|e| AppError::Internal(format!("Receipt is not UTF-8: {}", e)))
}

fn csv_error(e: csv::Error) -> AppError {
    AppError::Internal(format!("Failed to write receipt: {}", e))
}

#[derive(Clone)]
pub struct ReceiptService {
    db: PgPool,
    store: Arc<dyn FulfillmentStore>,
}

impl ReceiptService {
    pub fn new(db: PgPool, store: Arc<dyn FulfillmentStore>) -> Self {
        Self { db, store }
    }

    /// Receipt of an order the actor is allowed to see
    pub async fn render(&self, actor: &Actor, order_id: Uuid) -> AppResult<Receipt> {
        let detail = OrderService::new(self.store.clone()).get(actor, order_id).await?;

        let ids: Vec<Uuid> = detail.items.iter().map(|i| i.product_variant_id).collect();
        let labels = CatalogService::new(self.db.clone()).variant_labels(&ids).await?;
        let shop_label = match detail.order.shop_id {
            Some(shop_id) => Some(ShopService::new(self.db.clone()).get(shop_id).await?.label()),
            None => None,
        };

        let body = render_receipt_csv(&detail, &labels, shop_label.as_deref())?;
        Ok(Receipt {
            filename: format!("receipt-{}.csv", order_id),
            body,
        })
    }
}
