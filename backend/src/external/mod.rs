//! External API integrations

pub mod stripe;

pub use stripe::{CheckoutLine, CheckoutSession, CheckoutSessionRequest, StripeClient};
