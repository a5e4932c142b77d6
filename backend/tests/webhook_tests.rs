//! Stripe webhook tests
//!
//! Signed deliveries of a paid checkout session materialize exactly one
//! order, however often Stripe retries them.

mod common;

use serde_json::json;

use common::{line, stock_line, Fixture};
use shared::{DeliveryType, DraftItem, OrderDraft, OrderStatus};
use timber_grain_backend::config::PaymentsConfig;
use timber_grain_backend::error::AppError;
use timber_grain_backend::services::checkout::encode_cart_metadata;
use timber_grain_backend::services::payment_webhook::{sign_payload, WebhookOutcome};
use timber_grain_backend::services::PaymentWebhookService;

const SECRET: &str = "whsec_timber_test";

fn payments() -> PaymentsConfig {
    PaymentsConfig {
        stripe_secret_key: "sk_test_unused".to_string(),
        stripe_api_base: "http://127.0.0.1:9".to_string(),
        webhook_secret: SECRET.to_string(),
        signature_tolerance_secs: 300,
        currency: "uah".to_string(),
        success_url: "http://localhost/checkout/success".to_string(),
        cancel_url: "http://localhost/checkout/cancel".to_string(),
    }
}

fn cart(fx: &Fixture, items: Vec<DraftItem>) -> OrderDraft {
    OrderDraft {
        delivery_type: DeliveryType::Pickup,
        customer_name: "Oksana Melnyk".to_string(),
        customer_phone: "+380931112233".to_string(),
        customer_email: Some("oksana@example.com".to_string()),
        note: None,
        shop_id: Some(fx.shop_id),
        address: None,
        items,
        created_by: None,
        payment_session_id: None,
    }
}

fn session_event(event_type: &str, session_id: &str, payment_status: &str, draft: &OrderDraft) -> Vec<u8> {
    let metadata = encode_cart_metadata(draft).unwrap();
    serde_json::to_vec(&json!({
        "id": format!("evt_{}", session_id),
        "type": event_type,
        "data": {
            "object": {
                "id": session_id,
                "object": "checkout.session",
                "payment_status": payment_status,
                "amount_total": 120000,
                "metadata": metadata,
            }
        }
    }))
    .unwrap()
}

fn signed(payload: &[u8]) -> String {
    sign_payload(SECRET, chrono::Utc::now().timestamp(), payload).unwrap()
}

#[tokio::test]
async fn test_replayed_session_creates_one_order() {
    let fx = Fixture::new().await;
    let webhooks = PaymentWebhookService::new(fx.dyn_store(), &payments());
    let payload = session_event(
        "checkout.session.completed",
        "cs_test_a1",
        "paid",
        &cart(&fx, vec![line(fx.sofa, 1)]),
    );

    let first = webhooks
        .handle(Some(&signed(&payload)), &payload)
        .await
        .unwrap();
    let order_id = match first {
        WebhookOutcome::OrderCreated { order_id } => order_id,
        other => panic!("expected OrderCreated, got {:?}", other),
    };

    let replay = webhooks
        .handle(Some(&signed(&payload)), &payload)
        .await
        .unwrap();
    assert_eq!(replay, WebhookOutcome::AlreadyProcessed { order_id });
    assert_eq!(fx.store.order_count().await, 1);

    let order = fx.orders().get(&fx.admin, order_id).await.unwrap().order;
    assert_eq!(order.status, OrderStatus::Created);
    assert_eq!(order.payment_session_id.as_deref(), Some("cs_test_a1"));
    assert_eq!(order.created_by, None);
}

#[tokio::test]
async fn test_async_payment_success_is_processed() {
    let fx = Fixture::new().await;
    let webhooks = PaymentWebhookService::new(fx.dyn_store(), &payments());
    let draft = cart(&fx, vec![line(fx.armchair, 2)]);

    let pending = session_event("checkout.session.completed", "cs_test_b2", "unpaid", &draft);
    let outcome = webhooks
        .handle(Some(&signed(&pending)), &pending)
        .await
        .unwrap();
    assert!(matches!(outcome, WebhookOutcome::Ignored { .. }));
    assert_eq!(fx.store.order_count().await, 0);

    let paid = session_event(
        "checkout.session.async_payment_succeeded",
        "cs_test_b2",
        "paid",
        &draft,
    );
    let outcome = webhooks.handle(Some(&signed(&paid)), &paid).await.unwrap();
    assert!(matches!(outcome, WebhookOutcome::OrderCreated { .. }));
    assert_eq!(fx.store.order_count().await, 1);
}

#[tokio::test]
async fn test_unrelated_events_ignored() {
    let fx = Fixture::new().await;
    let webhooks = PaymentWebhookService::new(fx.dyn_store(), &payments());
    let payload = serde_json::to_vec(&json!({
        "id": "evt_refund",
        "type": "charge.refunded",
        "data": { "object": { "id": "ch_1" } }
    }))
    .unwrap();

    let outcome = webhooks
        .handle(Some(&signed(&payload)), &payload)
        .await
        .unwrap();
    assert_eq!(
        outcome,
        WebhookOutcome::Ignored {
            event_type: "charge.refunded".to_string()
        }
    );
}

#[tokio::test]
async fn test_bad_signatures_rejected() {
    let fx = Fixture::new().await;
    let webhooks = PaymentWebhookService::new(fx.dyn_store(), &payments());
    let payload = session_event(
        "checkout.session.completed",
        "cs_test_c3",
        "paid",
        &cart(&fx, vec![line(fx.sofa, 1)]),
    );

    let result = webhooks.handle(None, &payload).await;
    assert!(matches!(result, Err(AppError::InvalidSignature(_))));

    let forged = sign_payload("whsec_other", chrono::Utc::now().timestamp(), &payload).unwrap();
    let result = webhooks.handle(Some(&forged), &payload).await;
    assert!(matches!(result, Err(AppError::InvalidSignature(_))));

    assert_eq!(fx.store.order_count().await, 0);
}

#[tokio::test]
async fn test_session_without_cart_rejected() {
    let fx = Fixture::new().await;
    let webhooks = PaymentWebhookService::new(fx.dyn_store(), &payments());
    let payload = serde_json::to_vec(&json!({
        "id": "evt_empty",
        "type": "checkout.session.completed",
        "data": { "object": { "id": "cs_test_d4", "payment_status": "paid", "metadata": {} } }
    }))
    .unwrap();

    let result = webhooks.handle(Some(&signed(&payload)), &payload).await;
    assert!(matches!(result, Err(AppError::ValidationError(_))));
    assert_eq!(fx.store.order_count().await, 0);
}

#[tokio::test]
async fn test_paid_session_without_stock_creates_nothing() {
    let fx = Fixture::new().await;
    fx.store.seed_stock(fx.shop_id, fx.sofa, 1).await;
    let webhooks = PaymentWebhookService::new(fx.dyn_store(), &payments());
    let payload = session_event(
        "checkout.session.completed",
        "cs_test_e5",
        "paid",
        &cart(&fx, vec![stock_line(fx.sofa, 2)]),
    );

    let result = webhooks.handle(Some(&signed(&payload)), &payload).await;
    assert!(matches!(result, Err(AppError::InsufficientStock(_))));
    assert_eq!(fx.store.order_count().await, 0);
    assert_eq!(fx.store.stock_level(fx.shop_id, fx.sofa).await, 1);
}
