//! Order lifecycle events, written to the log as an audit trail.

use rust_decimal::Decimal;
use uuid::Uuid;

use crate::domain::{OrderStatus, PaymentChannel, PaymentStatus};

#[derive(Clone, Debug, PartialEq)]
pub enum OrderEvent {
    Placed { order_id: String, user_id: Option<Uuid>, total: Decimal },
    StatusChanged { order_id: String, status: OrderStatus, payment_status: PaymentStatus },
    PaymentInitiated { order_id: String, transaction_id: String },
    PaymentConfirmed { order_id: String, payment_id: Option<String>, channel: Option<PaymentChannel>, mock: bool },
    PaymentFailed { order_id: String, payment_id: Option<String> },
    PaymentRecorded { order_id: String, gateway_status: String },
}

impl OrderEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Placed { .. } => "order.placed",
            Self::StatusChanged { .. } => "order.status_changed",
            Self::PaymentInitiated { .. } => "order.payment_initiated",
            Self::PaymentConfirmed { .. } => "order.payment_confirmed",
            Self::PaymentFailed { .. } => "order.payment_failed",
            Self::PaymentRecorded { .. } => "order.payment_recorded",
        }
    }

    pub fn order_id(&self) -> &str {
        match self {
            Self::Placed { order_id, .. }
            | Self::StatusChanged { order_id, .. }
            | Self::PaymentInitiated { order_id, .. }
            | Self::PaymentConfirmed { order_id, .. }
            | Self::PaymentFailed { order_id, .. }
            | Self::PaymentRecorded { order_id, .. } => order_id,
        }
    }

    pub fn record(&self) {
        tracing::info!(target: "audit", event = self.name(), order_id = self.order_id(), detail = ?self, "Order event");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_names() {
        let event = OrderEvent::PaymentInitiated { order_id: "WTF-202512-0001".into(), transaction_id: "link_1".into() };
        assert_eq!(event.name(), "order.payment_initiated");
        assert_eq!(event.order_id(), "WTF-202512-0001");
    }
}
