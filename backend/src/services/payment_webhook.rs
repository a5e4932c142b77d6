//! Stripe webhook processing
//!
//! A paid checkout session is turned into an order exactly once, keyed by
//! the session id.

use std::collections::HashMap;
use std::sync::Arc;

use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use uuid::Uuid;

use shared::OrderCreation;

use crate::config::PaymentsConfig;
use crate::error::{AppError, AppResult};
use crate::external::stripe::minor_units;
use crate::services::checkout::decode_cart_metadata;
use crate::services::order::OrderService;
use crate::store::FulfillmentStore;

type HmacSha256 = Hmac<Sha256>;

const SESSION_COMPLETED: &str = "checkout.session.completed";
const ASYNC_PAYMENT_SUCCEEDED: &str = "checkout.session.async_payment_succeeded";

/// Envelope of a Stripe event
#[derive(Debug, Deserialize)]
pub struct StripeEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: StripeEventData,
}

#[derive(Debug, Deserialize)]
pub struct StripeEventData {
    pub object: serde_json::Value,
}

/// The fields of a checkout session object we act on
#[derive(Debug, Deserialize)]
struct CompletedSession {
    id: String,
    payment_status: String,
    amount_total: Option<i64>,
    #[serde(default)]
    metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum WebhookOutcome {
    OrderCreated { order_id: Uuid },
    AlreadyProcessed { order_id: Uuid },
    Ignored { event_type: String },
}

fn signature(secret: &str, timestamp: i64, payload: &[u8]) -> AppResult<HmacSha256> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| AppError::Internal("Failed to create HMAC".to_string()))?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    Ok(mac)
}

/// Build a `Stripe-Signature` header value for `payload`
pub fn sign_payload(secret: &str, timestamp: i64, payload: &[u8]) -> AppResult<String> {
    let digest = signature(secret, timestamp, payload)?.finalize().into_bytes();
    Ok(format!("t={},v1={}", timestamp, hex::encode(digest)))
}

/// Check a `Stripe-Signature` header (`t=<unix>,v1=<hex>[,v1=<hex>…]`).
///
/// Any `v1` entry matching the HMAC-SHA256 of `"{t}.{payload}"` is accepted,
/// provided `t` lies within `tolerance_secs` of `now`.
pub fn verify_signature(
    header: &str,
    payload: &[u8],
    secret: &str,
    tolerance_secs: i64,
    now: i64,
) -> AppResult<()> {
    let mut timestamp = None;
    let mut candidates = Vec::new();

    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = value.parse::<i64>().ok(),
            Some(("v1", value)) => candidates.push(value),
            _ => {}
        }
    }

    let timestamp = timestamp
        .ok_or_else(|| AppError::InvalidSignature("Missing signature timestamp".to_string()))?;
    if candidates.is_empty() {
        return Err(AppError::InvalidSignature("No v1 signature present".to_string()));
    }
    let tolerance = u64::try_from(tolerance_secs).unwrap_or(0);
    if now.abs_diff(timestamp) > tolerance {
        return Err(AppError::InvalidSignature(
            "Signature timestamp outside tolerance".to_string(),
        ));
    }

    let mac = signature(secret, timestamp, payload)?;
    let matched = candidates.into_iter().any(|candidate| {
        hex::decode(candidate)
            .map(|bytes| mac.clone().verify_slice(&bytes).is_ok())
            .unwrap_or(false)
    });

    if matched {
        Ok(())
    } else {
        Err(AppError::InvalidSignature("Signature mismatch".to_string()))
    }
}

#[derive(Clone)]
pub struct PaymentWebhookService {
    store: Arc<dyn FulfillmentStore>,
    webhook_secret: String,
    tolerance_secs: i64,
}

impl PaymentWebhookService {
    pub fn new(store: Arc<dyn FulfillmentStore>, payments: &PaymentsConfig) -> Self {
        Self {
            store,
            webhook_secret: payments.webhook_secret.clone(),
            tolerance_secs: payments.signature_tolerance_secs,
        }
    }

    /// Verify and process one webhook delivery
    pub async fn handle(&self, signature_header: Option<&str>, payload: &[u8]) -> AppResult<WebhookOutcome> {
        let header = signature_header
            .ok_or_else(|| AppError::InvalidSignature("Missing Stripe-Signature header".to_string()))?;

        if let Err(e) = verify_signature(
            header,
            payload,
            &self.webhook_secret,
            self.tolerance_secs,
            chrono::Utc::now().timestamp(),
        ) {
            tracing::warn!(error = %e, "Rejected webhook signature");
            return Err(e);
        }

        let event: StripeEvent = serde_json::from_slice(payload)
            .map_err(|e| AppError::ValidationError(format!("Invalid event payload: {}", e)))?;

        self.process(event).await
    }

    /// Process an already verified event
    pub async fn process(&self, event: StripeEvent) -> AppResult<WebhookOutcome> {
        if event.event_type != SESSION_COMPLETED && event.event_type != ASYNC_PAYMENT_SUCCEEDED {
            tracing::debug!(event_id = %event.id, event_type = %event.event_type, "Ignoring webhook event");
            return Ok(WebhookOutcome::Ignored {
                event_type: event.event_type,
            });
        }

        let session: CompletedSession = serde_json::from_value(event.data.object)
            .map_err(|e| AppError::ValidationError(format!("Invalid checkout session: {}", e)))?;

        // Delayed payment methods complete the session before the money arrives
        if session.payment_status != "paid" && session.payment_status != "no_payment_required" {
            tracing::info!(
                session_id = %session.id,
                payment_status = %session.payment_status,
                "Checkout session not paid yet"
            );
            return Ok(WebhookOutcome::Ignored {
                event_type: event.event_type,
            });
        }

        let mut draft = decode_cart_metadata(&session.metadata)?;
        draft.payment_session_id = Some(session.id.clone());

        let creation = OrderService::new(self.store.clone())
            .materialize_checkout(draft)
            .await?;

        let detail = creation.detail();
        if let Some(paid) = session.amount_total {
            let expected = minor_units(detail.order.total_amount)?;
            if paid != expected {
                tracing::warn!(
                    session_id = %session.id,
                    order_id = %detail.order.id,
                    paid,
                    expected,
                    "Paid amount differs from order total"
                );
            }
        }

        Ok(match creation {
            OrderCreation::Created(detail) => WebhookOutcome::OrderCreated {
                order_id: detail.order.id,
            },
            OrderCreation::AlreadyExists(detail) => WebhookOutcome::AlreadyProcessed {
                order_id: detail.order.id,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test";
    const NOW: i64 = 1_700_000_000;

    #[test]
    fn test_valid_signature() {
        let payload = br#"{"id":"evt_1"}"#;
        let header = sign_payload(SECRET, NOW, payload).unwrap();
        assert!(verify_signature(&header, payload, SECRET, 300, NOW + 10).is_ok());
    }

    #[test]
    fn test_any_v1_may_match() {
        let payload = b"{}";
        let good = sign_payload(SECRET, NOW, payload).unwrap();
        let v1 = good.split_once("v1=").unwrap().1;
        let header = format!("t={},v1={},v1={}", NOW, "00".repeat(32), v1);
        assert!(verify_signature(&header, payload, SECRET, 300, NOW).is_ok());
    }

    #[test]
    fn test_tampered_payload_rejected() {
        let header = sign_payload(SECRET, NOW, b"{\"amount\":1}").unwrap();
        assert!(matches!(
            verify_signature(&header, b"{\"amount\":2}", SECRET, 300, NOW),
            Err(AppError::InvalidSignature(_))
        ));
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let header = sign_payload("whsec_other", NOW, b"{}").unwrap();
        assert!(verify_signature(&header, b"{}", SECRET, 300, NOW).is_err());
    }

    #[test]
    fn test_extreme_timestamp_rejected() {
        for t in [i64::MIN, i64::MAX] {
            let header = format!("t={},v1={}", t, "00".repeat(32));
            assert!(matches!(
                verify_signature(&header, b"{}", SECRET, 300, NOW),
                Err(AppError::InvalidSignature(_))
            ));
        }
    }

    #[test]
    fn test_stale_timestamp_rejected() {
        let header = sign_payload(SECRET, NOW, b"{}").unwrap();
        assert!(verify_signature(&header, b"{}", SECRET, 300, NOW + 301).is_err());
        assert!(verify_signature(&header, b"{}", SECRET, 300, NOW - 301).is_err());
    }

    #[test]
    fn test_malformed_header_rejected() {
        assert!(verify_signature("garbage", b"{}", SECRET, 300, NOW).is_err());
        assert!(verify_signature(&format!("t={}", NOW), b"{}", SECRET, 300, NOW).is_err());
        assert!(verify_signature(&format!("t={},v1=zz", NOW), b"{}", SECRET, 300, NOW).is_err());
    }
}
