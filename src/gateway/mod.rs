//! Payment gateway adapter.
//!
//! [`PaymentGateway`] is the seam the order service calls through;
//! [`ZohoGateway`] talks to the hosted payment-link provider. Webhook
//! signature checks live in [`signature`].

pub mod signature;
mod token;
mod zoho;

pub use signature::{check_signature, SignatureCheck, SIGNATURE_HEADER};
pub use token::{TokenCache, DEFAULT_TOKEN_VALIDITY, EXPIRY_MARGIN};
pub use zoho::{payment_link_payload, ZohoGateway};

use async_trait::async_trait;
use rust_decimal::Decimal;
use thiserror::Error;

use crate::domain::{GatewayStatus, Order, PaymentChannel};

#[derive(Clone, Debug, PartialEq)]
pub struct PaymentLink {
    pub payment_link: String,
    pub transaction_id: String,
    /// Provider response, stored with the order and never shown to clients.
    pub raw: serde_json::Value,
}

/// Authoritative payment state as reported by the gateway API.
#[derive(Clone, Debug, PartialEq)]
pub struct PaymentVerification {
    pub status: String,
    pub amount_paid: Option<Decimal>,
    pub channel: Option<PaymentChannel>,
    /// Order reference the provider holds for the payment.
    pub reference: Option<String>,
    /// Payment link the payment was made through.
    pub link_id: Option<String>,
    /// False when the gateway could not be asked or did not know the payment.
    pub verified: bool,
    pub raw: serde_json::Value,
}

impl PaymentVerification {
    pub fn unverified() -> Self {
        Self {
            status: "unknown".to_string(),
            amount_paid: None,
            channel: None,
            reference: None,
            link_id: None,
            verified: false,
            raw: serde_json::Value::Null,
        }
    }

    pub fn confirms_payment(&self) -> bool {
        self.verified && GatewayStatus::classify(&self.status) == GatewayStatus::Succeeded
    }

    /// A confirmed payment that belongs to `order` and covers its total.
    pub fn settles(&self, order: &Order) -> bool {
        let covers = self.amount_paid.is_some_and(|paid| paid >= order.total_amount);
        let by_reference = self.reference.as_deref() == Some(order.order_id.as_str());
        let by_link = self.link_id.is_some() && self.link_id.as_deref() == order.transaction_id.as_deref();
        self.confirms_payment() && covers && (by_reference || by_link)
    }
}

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("payment gateway credentials are not configured: {0}")]
    NotConfigured(String),

    #[error("{context}: gateway rejected the access token")]
    Unauthorized { context: String },

    #[error("{context}: gateway returned HTTP {status}")]
    Status { context: String, status: u16 },

    #[error("{context}: {source}")]
    Transport { context: String, source: reqwest::Error },

    #[error("{context}: {message}")]
    InvalidResponse { context: String, message: String },
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_payment_link(&self, order: &Order) -> Result<PaymentLink, GatewayError>;

    async fn verify_payment(&self, payment_id: &str) -> Result<PaymentVerification, GatewayError>;

    /// Looks up a payment link by the transaction id handed out at initiation.
    async fn verify_payment_link(&self, link_id: &str) -> Result<PaymentVerification, GatewayError>;
}

/// Reads a money amount the provider may send as a number or a string.
pub(crate) fn decimal_from_json(value: &serde_json::Value) -> Option<Decimal> {
    match value {
        serde_json::Value::Number(n) => n.to_string().parse().ok(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::value_objects::{EntityRef, OrderId, Period};
    use crate::domain::{BookingDetails, NewOrder};
    use chrono::Utc;

    fn order() -> Order {
        let mut order = Order::place(
            OrderId::mint("WTF", Period::of(Utc::now()), 3),
            None,
            NewOrder {
                entity: EntityRef::Package("p1".into()),
                items: vec![],
                booking_details: BookingDetails::default(),
                total_amount: Decimal::new(200, 0),
                payment_method: None,
                address: "12 Main Street".into(),
                notes: None,
            },
        );
        order.transaction_id = Some("link_3".into());
        order
    }

    fn succeeded(amount: i64, reference: Option<&str>, link_id: Option<&str>) -> PaymentVerification {
        PaymentVerification {
            status: "succeeded".into(),
            amount_paid: Some(Decimal::new(amount, 0)),
            reference: reference.map(str::to_string),
            link_id: link_id.map(str::to_string),
            verified: true,
            ..PaymentVerification::unverified()
        }
    }

    #[test]
    fn test_settles_only_matching_payment() {
        let order = order();
        assert!(succeeded(200, Some(order.order_id.as_str()), None).settles(&order));
        assert!(succeeded(250, None, Some("link_3")).settles(&order));

        assert!(!succeeded(1, Some(order.order_id.as_str()), None).settles(&order));
        assert!(!succeeded(200, Some("WTF-OTHER-0001"), None).settles(&order));
        assert!(!succeeded(200, None, Some("link_other")).settles(&order));
        assert!(!PaymentVerification { verified: false, ..succeeded(200, Some(order.order_id.as_str()), None) }.settles(&order));
    }
}
