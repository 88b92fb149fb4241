//! Catering Orders - order lifecycle and payment core
//!
//! Backend core of a catering platform: checkout submissions become orders,
//! orders are paid through a hosted payment-link gateway, and the gateway
//! reports back through a webhook.
//!
//! ## Features
//! - Order creation with per-month sequential order ids
//! - Cursor (keyset) pagination over orders
//! - Payment initiation through the payment gateway
//! - Idempotent payment verification from webhooks or clients

pub mod api;
pub mod config;
pub mod domain;
pub mod gateway;
pub mod orders;
pub mod pagination;
pub mod sequence;
pub mod store;

use std::collections::BTreeMap;
use thiserror::Error;

// =============================================================================
// Error Types
// =============================================================================

/// Per-field validation messages, keyed by the JSON path of the field.
pub type FieldErrors = BTreeMap<String, Vec<String>>;

#[derive(Error, Debug)]
pub enum CateringError {
    #[error("Validation failed")]
    Validation(FieldErrors),

    #[error("{0} not found")]
    NotFound(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Payment already completed for order {0}")]
    PaymentAlreadyCompleted(String),

    #[error("Test payments are not accepted in production")]
    MockPaymentRejected,

    #[error("Payment gateway error: {0}")]
    Gateway(#[from] gateway::GatewayError),

    #[error("Storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CateringError {
    /// Single-field validation failure.
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        let mut errors = FieldErrors::new();
        errors.insert(field.into(), vec![message.into()]);
        Self::Validation(errors)
    }

    pub fn order_not_found(order_id: &str) -> Self {
        Self::NotFound(format!("Order {order_id}"))
    }
}

pub type Result<T> = std::result::Result<T, CateringError>;
