//! Stripe Checkout client
//!
//! Opens hosted checkout sessions through the form-encoded REST API.

use std::collections::BTreeMap;

use reqwest::Client;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::config::PaymentsConfig;
use crate::error::{AppError, AppResult};

/// Stripe Checkout API client
#[derive(Clone)]
pub struct StripeClient {
    client: Client,
    secret_key: String,
    base_url: String,
}

/// One priced line of a checkout session
#[derive(Debug, Clone)]
pub struct CheckoutLine {
    pub name: String,
    pub unit_price: Decimal,
    pub quantity: i32,
}

/// Parameters of a checkout session
#[derive(Debug, Clone)]
pub struct CheckoutSessionRequest {
    pub currency: String,
    pub success_url: String,
    pub cancel_url: String,
    pub customer_email: Option<String>,
    pub lines: Vec<CheckoutLine>,
    pub metadata: BTreeMap<String, String>,
}

/// Created checkout session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    pub url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StripeErrorBody {
    error: StripeErrorDetail,
}

#[derive(Debug, Deserialize)]
struct StripeErrorDetail {
    message: Option<String>,
}

/// Amount in the currency's minor unit, as Stripe expects it
pub fn minor_units(amount: Decimal) -> AppResult<i64> {
    (amount * Decimal::from(100))
        .round()
        .to_i64()
        .ok_or_else(|| AppError::Internal(format!("Amount out of range: {}", amount)))
}

impl CheckoutSessionRequest {
    /// Flatten into Stripe's bracketed form encoding
    fn form_fields(&self) -> AppResult<Vec<(String, String)>> {
        let mut fields = vec![
            ("mode".to_string(), "payment".to_string()),
            ("success_url".to_string(), self.success_url.clone()),
            ("cancel_url".to_string(), self.cancel_url.clone()),
        ];

        if let Some(email) = &self.customer_email {
            fields.push(("customer_email".to_string(), email.clone()));
        }

        for (i, line) in self.lines.iter().enumerate() {
            let prefix = format!("line_items[{}]", i);
            fields.push((format!("{}[quantity]", prefix), line.quantity.to_string()));
            fields.push((
                format!("{}[price_data][currency]", prefix),
                self.currency.clone(),
            ));
            fields.push((
                format!("{}[price_data][unit_amount]", prefix),
                minor_units(line.unit_price)?.to_string(),
            ));
            fields.push((
                format!("{}[price_data][product_data][name]", prefix),
                line.name.clone(),
            ));
        }

        for (key, value) in &self.metadata {
            fields.push((format!("metadata[{}]", key), value.clone()));
        }

        Ok(fields)
    }
}

impl StripeClient {
    pub fn new(config: &PaymentsConfig) -> Self {
        Self {
            client: Client::new(),
            secret_key: config.stripe_secret_key.clone(),
            base_url: config.stripe_api_base.trim_end_matches('/').to_string(),
        }
    }

    pub async fn create_checkout_session(
        &self,
        request: &CheckoutSessionRequest,
    ) -> AppResult<CheckoutSession> {
        let url = format!("{}/checkout/sessions", self.base_url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.secret_key)
            .form(&request.form_fields()?)
            .send()
            .await
            .map_err(|e| AppError::ExternalService(format!("Stripe request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<StripeErrorBody>(&body)
                .ok()
                .and_then(|b| b.error.message)
                .unwrap_or(body);
            return Err(AppError::ExternalService(format!(
                "Stripe API error: {} - {}",
                status, message
            )));
        }

        response
            .json::<CheckoutSession>()
            .await
            .map_err(|e| AppError::ExternalService(format!("Failed to parse Stripe response: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_minor_units() {
        assert_eq!(minor_units(Decimal::from_str("1299.99").unwrap()).unwrap(), 129999);
        assert_eq!(minor_units(Decimal::from(5)).unwrap(), 500);
    }

    #[test]
    fn test_form_fields() {
        let mut metadata = BTreeMap::new();
        metadata.insert("cart_0".to_string(), "{}".to_string());
        let request = CheckoutSessionRequest {
            currency: "usd".to_string(),
            success_url: "https://shop.test/ok".to_string(),
            cancel_url: "https://shop.test/cart".to_string(),
            customer_email: None,
            lines: vec![CheckoutLine {
                name: "Oslo sofa (grey)".to_string(),
                unit_price: Decimal::from_str("450.50").unwrap(),
                quantity: 2,
            }],
            metadata,
        };

        let fields = request.form_fields().unwrap();
        let get = |key: &str| {
            fields
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.as_str())
        };
        assert_eq!(get("mode"), Some("payment"));
        assert_eq!(get("line_items[0][price_data][unit_amount]"), Some("45050"));
        assert_eq!(get("line_items[0][quantity]"), Some("2"));
        assert_eq!(get("metadata[cart_0]"), Some("{}"));
        assert_eq!(get("customer_email"), None);
    }
}
