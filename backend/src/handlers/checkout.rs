//! Checkout and payment webhook handlers

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    Json,
};

use crate::error::AppError;
use crate::middleware::MaybeUser;
use crate::services::checkout::{CheckoutInput, CheckoutResponse};
use crate::services::payment_webhook::WebhookOutcome;
use crate::services::{CheckoutService, PaymentWebhookService};
use crate::AppState;

/// Open a Stripe checkout session for a cart
/// POST /checkout
pub async fn create_checkout(
    State(state): State<AppState>,
    MaybeUser(user): MaybeUser,
    Json(input): Json<CheckoutInput>,
) -> Result<(StatusCode, Json<CheckoutResponse>), AppError> {
    let service = CheckoutService::new(state.db.clone(), state.store.clone(), &state.config.payments);
    let response = service.create_session(user, input).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

/// Stripe webhook endpoint
/// POST /webhooks/stripe
///
/// The raw body is needed to verify the signature.
pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookOutcome>, AppError> {
    let signature = headers
        .get("stripe-signature")
        .and_then(|v| v.to_str().ok());

    let service = PaymentWebhookService::new(state.store.clone(), &state.config.payments);
    let outcome = service.handle(signature, &body).await?;
    Ok(Json(outcome))
}
