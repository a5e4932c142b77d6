//! Error handling for the Timber&Grain backend
//!
//! Every workflow failure is caught here and turned into a structured JSON
//! response; storage failures become 500s and are logged.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use shared::stock::Shortfall;
use shared::{Capability, Role, ShipmentStatus, WorkflowError};
use thiserror::Error;
use uuid::Uuid;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Authentication errors
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Invalid webhook signature: {0}")]
    InvalidSignature(String),

    #[error("Role {role} may not {capability}")]
    Forbidden { role: Role, capability: Capability },

    // Validation errors
    #[error("Validation error: {message}")]
    Validation { field: String, message: String },

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Conflict: {message}")]
    Conflict { resource: String, message: String },

    #[error("Resource not found: {0}")]
    NotFound(String),

    // Workflow errors
    #[error("Insufficient stock for {} variant(s)", .0.len())]
    InsufficientStock(Vec<Shortfall>),

    #[error("{message}")]
    WrongStatus {
        current: String,
        expected: String,
        message: String,
    },

    #[error("Not owner: {0}")]
    NotOwner(String),

    #[error("Order {0} already claimed")]
    AlreadyClaimed(Uuid),

    #[error("Shipment {shipment_id} already {status}")]
    AlreadyResolved {
        shipment_id: Uuid,
        status: ShipmentStatus,
    },

    // External service errors
    #[error("External service error: {0}")]
    ExternalService(String),

    // Database errors
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    // Internal errors
    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Internal server error")]
    InternalError(#[from] anyhow::Error),
}

impl From<WorkflowError> for AppError {
    fn from(err: WorkflowError) -> Self {
        let message = err.to_string();
        match err {
            WorkflowError::Validation { field, message } => AppError::Validation { field, message },
            WorkflowError::InsufficientStock { shortfalls } => AppError::InsufficientStock(shortfalls),
            WorkflowError::WrongStatus {
                current, expected, ..
            } => AppError::WrongStatus {
                current,
                expected,
                message,
            },
            WorkflowError::NotOwner { .. } => AppError::NotOwner(message),
            WorkflowError::AlreadyClaimed { order_id } => AppError::AlreadyClaimed(order_id),
            WorkflowError::AlreadyResolved {
                shipment_id,
                status,
            } => AppError::AlreadyResolved {
                shipment_id,
                status,
            },
            WorkflowError::NotFound { entity, id } => AppError::NotFound(format!("{} {}", entity, id)),
            WorkflowError::Forbidden { role, capability } => AppError::Forbidden { role, capability },
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        match errors.field_errors().into_iter().next() {
            Some((field, errs)) => AppError::Validation {
                field: field.to_string(),
                message: errs
                    .first()
                    .and_then(|e| e.message.as_ref())
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| format!("Invalid value for {}", field)),
            },
            None => AppError::ValidationError(errors.to_string()),
        }
    }
}

/// Error response structure
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ErrorDetail {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            field: None,
            details: None,
        }
    }

    fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

impl AppError {
    /// HTTP status and body for this error
    pub fn status_and_detail(&self) -> (StatusCode, ErrorDetail) {
        match self {
            AppError::InvalidCredentials => (
                StatusCode::UNAUTHORIZED,
                ErrorDetail::new("INVALID_CREDENTIALS", "Invalid email or password"),
            ),
            AppError::Unauthorized(msg) => (
                StatusCode::UNAUTHORIZED,
                ErrorDetail::new("UNAUTHORIZED", msg.clone()),
            ),
            AppError::InvalidSignature(_) => (
                StatusCode::BAD_REQUEST,
                ErrorDetail::new("INVALID_SIGNATURE", "Webhook signature verification failed"),
            ),
            AppError::Forbidden { role, capability } => (
                StatusCode::FORBIDDEN,
                ErrorDetail::new(
                    "FORBIDDEN",
                    format!("Role '{}' is not allowed to {}", role, capability),
                ),
            ),
            AppError::Validation { field, message } => (
                StatusCode::BAD_REQUEST,
                ErrorDetail::new("VALIDATION_ERROR", message.clone()).with_field(field.clone()),
            ),
            AppError::ValidationError(msg) => (
                StatusCode::BAD_REQUEST,
                ErrorDetail::new("VALIDATION_ERROR", msg.clone()),
            ),
            AppError::Conflict { resource, message } => (
                StatusCode::CONFLICT,
                ErrorDetail::new("CONFLICT", message.clone()).with_field(resource.clone()),
            ),
            AppError::NotFound(resource) => (
                StatusCode::NOT_FOUND,
                ErrorDetail::new("NOT_FOUND", format!("{} not found", resource)),
            ),
            AppError::InsufficientStock(shortfalls) => (
                StatusCode::BAD_REQUEST,
                ErrorDetail::new("INSUFFICIENT_STOCK", self.to_string())
                    .with_details(serde_json::json!({ "shortfalls": shortfalls })),
            ),
            AppError::WrongStatus {
                current,
                expected,
                message,
            } => (
                StatusCode::CONFLICT,
                ErrorDetail::new("WRONG_STATUS", message.clone()).with_details(
                    serde_json::json!({ "current": current, "expected": expected }),
                ),
            ),
            AppError::NotOwner(msg) => (
                StatusCode::FORBIDDEN,
                ErrorDetail::new("NOT_OWNER", msg.clone()),
            ),
            AppError::AlreadyClaimed(order_id) => (
                StatusCode::CONFLICT,
                ErrorDetail::new(
                    "ALREADY_CLAIMED",
                    "Order was claimed by another driver, refresh and pick another one",
                )
                .with_details(serde_json::json!({ "order_id": order_id })),
            ),
            AppError::AlreadyResolved {
                shipment_id,
                status,
            } => (
                StatusCode::CONFLICT,
                ErrorDetail::new("ALREADY_RESOLVED", format!("Shipment is already {}", status))
                    .with_details(serde_json::json!({ "shipment_id": shipment_id })),
            ),
            AppError::ExternalService(_) => (
                StatusCode::BAD_GATEWAY,
                ErrorDetail::new("EXTERNAL_SERVICE_ERROR", "Payment provider request failed"),
            ),
            AppError::DatabaseError(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorDetail::new("DATABASE_ERROR", "A database error occurred"),
            ),
            AppError::Internal(_) | AppError::InternalError(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorDetail::new("INTERNAL_ERROR", "An internal server error occurred"),
            ),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_detail) = self.status_and_detail();

        if status.is_server_error() {
            tracing::error!("Error: {:?}", self);
        } else {
            tracing::debug!("Rejected request: {}", self);
        }

        (status, Json(ErrorResponse { error: error_detail })).into_response()
    }
}

/// Result type alias for handlers
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;
    use shared::Entity;

    #[test]
    fn test_workflow_errors_map_to_statuses() {
        let cases = vec![
            (
                WorkflowError::validation("shop_id", "Pickup orders require a shop"),
                StatusCode::BAD_REQUEST,
                "VALIDATION_ERROR",
            ),
            (
                WorkflowError::InsufficientStock { shortfalls: vec![] },
                StatusCode::BAD_REQUEST,
                "INSUFFICIENT_STOCK",
            ),
            (
                WorkflowError::wrong_status(Entity::Order, Uuid::nil(), "created", "ready_to_ship"),
                StatusCode::CONFLICT,
                "WRONG_STATUS",
            ),
            (
                WorkflowError::NotOwner {
                    entity: Entity::Order,
                    id: Uuid::nil(),
                },
                StatusCode::FORBIDDEN,
                "NOT_OWNER",
            ),
            (
                WorkflowError::AlreadyClaimed {
                    order_id: Uuid::nil(),
                },
                StatusCode::CONFLICT,
                "ALREADY_CLAIMED",
            ),
            (
                WorkflowError::not_found(Entity::Shipment, Uuid::nil()),
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
            ),
            (
                WorkflowError::Forbidden {
                    role: Role::Driver,
                    capability: Capability::TakeOrder,
                },
                StatusCode::FORBIDDEN,
                "FORBIDDEN",
            ),
        ];

        for (err, status, code) in cases {
            let (actual_status, detail) = AppError::from(err).status_and_detail();
            assert_eq!(actual_status, status);
            assert_eq!(detail.code, code);
        }
    }

    #[test]
    fn test_storage_errors_hide_details() {
        let (status, detail) = AppError::Internal("pool exhausted".to_string()).status_and_detail();
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!detail.message.contains("pool"));
    }
}
