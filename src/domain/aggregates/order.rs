//! Order Aggregate

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use crate::domain::value_objects::{EntityRef, OrderId, PaymentChannel};

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    /// Storage identity; also the pagination tie-break.
    pub id: Uuid,
    pub order_id: OrderId,
    pub user_id: Option<Uuid>,
    /// Owner profile, present when the read expanded it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<Owner>,
    #[serde(flatten)]
    pub entity: EntityRef,
    pub items: Vec<LineItem>,
    pub booking_details: BookingDetails,
    pub total_amount: Decimal,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub payment_method: Option<PaymentMethod>,
    pub transaction_id: Option<String>,
    pub payment_id: Option<String>,
    /// Last provider payload; stored, never sent back to clients.
    #[serde(skip_serializing)]
    pub gateway_response: Option<serde_json::Value>,
    pub chosen_payment_method: Option<PaymentChannel>,
    pub address: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    #[serde(default, skip_serializing_if = "Option::is_none")] pub item_id: Option<String>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")] pub category: Option<String>,
    pub quantity: u32,
    pub price: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")] pub base_quantity: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")] pub measurement: Option<String>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")] pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")] pub image: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingDetails {
    pub date: String,
    pub time: String,
    #[serde(default)] pub veg_guests: u32,
    #[serde(default)] pub non_veg_guests: u32,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Owner { pub id: Uuid, pub first_name: String, pub last_name: Option<String>, pub email: String, pub phone: Option<String> }

impl Owner {
    pub fn full_name(&self) -> String {
        match &self.last_name { Some(last) => format!("{} {}", self.first_name, last), None => self.first_name.clone() }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus { #[default] Pending, Confirmed, Processing, Completed, Cancelled }

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus { #[default] Pending, Paid, Failed, Refunded }

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod { #[serde(alias = "zoho")] Gateway, Cod }

macro_rules! text_enum {
    ($ty:ty { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $ty {
            pub fn as_str(&self) -> &'static str { match self { $(Self::$variant => $text),+ } }
            pub fn parse(value: &str) -> Option<Self> { match value { $($text => Some(Self::$variant),)+ _ => None } }
        }
        impl std::fmt::Display for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { f.write_str(self.as_str()) }
        }
    };
}

text_enum!(OrderStatus { Pending => "pending", Confirmed => "confirmed", Processing => "processing", Completed => "completed", Cancelled => "cancelled" });
text_enum!(PaymentStatus { Pending => "pending", Paid => "paid", Failed => "failed", Refunded => "refunded" });
text_enum!(PaymentMethod { Gateway => "gateway", Cod => "cod" });

/// Validated checkout submission, ready to become an order.
#[derive(Clone, Debug)]
pub struct NewOrder {
    pub entity: EntityRef,
    pub items: Vec<LineItem>,
    pub booking_details: BookingDetails,
    pub total_amount: Decimal,
    pub payment_method: Option<PaymentMethod>,
    pub address: String,
    pub notes: Option<String>,
}

/// Partial update of the two status fields.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdate { pub status: Option<OrderStatus>, pub payment_status: Option<PaymentStatus> }

impl StatusUpdate {
    pub fn is_empty(&self) -> bool { self.status.is_none() && self.payment_status.is_none() }
}

/// Result of a payment signal the gateway (or client) reported for an order.
#[derive(Clone, Debug, PartialEq)]
pub enum PaymentOutcome {
    Paid { channel: Option<PaymentChannel> },
    Failed,
    /// Intermediate or unrecognised gateway state: stored, no transition.
    Recorded { status: String },
}

#[derive(Clone, Debug, PartialEq)]
pub struct PaymentSettlement {
    pub outcome: PaymentOutcome,
    pub payment_id: Option<String>,
    pub gateway_response: Option<serde_json::Value>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transition { Applied, AlreadyPaid }

impl Order {
    pub fn place(order_id: OrderId, user_id: Option<Uuid>, new: NewOrder) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(), order_id, user_id, owner: None, entity: new.entity,
            items: new.items, booking_details: new.booking_details, total_amount: new.total_amount,
            status: OrderStatus::Pending, payment_status: PaymentStatus::Pending, payment_method: new.payment_method,
            transaction_id: None, payment_id: None, gateway_response: None, chosen_payment_method: None,
            address: Some(new.address), notes: new.notes, created_at: now, updated_at: now,
        }
    }

    pub fn is_paid(&self) -> bool { self.payment_status == PaymentStatus::Paid }

    pub fn apply_status_update(&mut self, update: &StatusUpdate) {
        if let Some(status) = update.status { self.status = status; }
        if let Some(payment_status) = update.payment_status { self.payment_status = payment_status; }
        self.touch();
    }

    /// Records the gateway transaction a payment link was minted for.
    pub fn attach_transaction(&mut self, transaction_id: impl Into<String>, raw: serde_json::Value) -> Result<(), OrderError> {
        if self.is_paid() { return Err(OrderError::AlreadyPaid); }
        self.transaction_id = Some(transaction_id.into());
        self.gateway_response = Some(raw);
        self.payment_method.get_or_insert(PaymentMethod::Gateway);
        self.touch();
        Ok(())
    }

    /// `paid` is a terminal sink: once reached, further settlements are acknowledged without mutation.
    pub fn settle(&mut self, settlement: &PaymentSettlement) -> Transition {
        if self.is_paid() { return Transition::AlreadyPaid; }
        match &settlement.outcome {
            PaymentOutcome::Paid { channel } => {
                self.payment_status = PaymentStatus::Paid;
                self.status = OrderStatus::Confirmed;
                self.chosen_payment_method = *channel;
            }
            PaymentOutcome::Failed => self.payment_status = PaymentStatus::Failed,
            PaymentOutcome::Recorded { .. } => {}
        }
        if let Some(payment_id) = &settlement.payment_id { self.payment_id = Some(payment_id.clone()); }
        if let Some(raw) = &settlement.gateway_response { self.gateway_response = Some(raw.clone()); }
        self.touch();
        Transition::Applied
    }

    fn touch(&mut self) { self.updated_at = Utc::now(); }
}

#[derive(Debug, Clone, PartialEq, Eq)] pub enum OrderError { AlreadyPaid }
impl std::error::Error for OrderError {}
impl std::fmt::Display for OrderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self { Self::AlreadyPaid => write!(f, "Payment already completed") }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::value_objects::Period;

    fn sample() -> Order {
        let new = NewOrder {
            entity: EntityRef::Package("p1".into()),
            items: vec![LineItem { item_id: None, name: "Paneer".into(), category: None, quantity: 2, price: Decimal::new(100, 0), base_quantity: None, measurement: None, kind: None, image: None }],
            booking_details: BookingDetails { date: "2025-12-01".into(), time: "19:00".into(), veg_guests: 0, non_veg_guests: 0 },
            total_amount: Decimal::new(200, 0),
            payment_method: None,
            address: "12 Main Street".into(),
            notes: None,
        };
        Order::place(OrderId::mint("WTF", Period::of(Utc::now()), 1), None, new)
    }

    fn paid() -> PaymentSettlement {
        PaymentSettlement { outcome: PaymentOutcome::Paid { channel: Some(PaymentChannel::Upi) }, payment_id: Some("pay_1".into()), gateway_response: None }
    }

    #[test]
    fn test_order_placed_pending() {
        let order = sample();
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.payment_status, PaymentStatus::Pending);
        assert!(order.transaction_id.is_none());
    }

    #[test]
    fn test_payment_confirmation_is_idempotent() {
        let mut order = sample();
        assert_eq!(order.settle(&paid()), Transition::Applied);
        assert_eq!(order.status, OrderStatus::Confirmed);
        assert_eq!(order.chosen_payment_method, Some(PaymentChannel::Upi));

        let before = order.updated_at;
        assert_eq!(order.settle(&paid()), Transition::AlreadyPaid);
        assert_eq!(order.updated_at, before);
    }

    #[test]
    fn test_failure_never_overrides_paid() {
        let mut order = sample();
        order.settle(&paid());
        let failed = PaymentSettlement { outcome: PaymentOutcome::Failed, payment_id: None, gateway_response: None };
        assert_eq!(order.settle(&failed), Transition::AlreadyPaid);
        assert_eq!(order.payment_status, PaymentStatus::Paid);
    }

    #[test]
    fn test_recorded_status_keeps_state() {
        let mut order = sample();
        let pending = PaymentSettlement { outcome: PaymentOutcome::Recorded { status: "initiated".into() }, payment_id: Some("pay_2".into()), gateway_response: None };
        assert_eq!(order.settle(&pending), Transition::Applied);
        assert_eq!(order.payment_status, PaymentStatus::Pending);
        assert_eq!(order.payment_id.as_deref(), Some("pay_2"));
    }

    #[test]
    fn test_attach_transaction_rejected_when_paid() {
        let mut order = sample();
        order.attach_transaction("link_1", serde_json::json!({})).unwrap();
        assert_eq!(order.payment_method, Some(PaymentMethod::Gateway));
        order.settle(&paid());
        assert_eq!(order.attach_transaction("link_2", serde_json::json!({})), Err(OrderError::AlreadyPaid));
    }

    #[test]
    fn test_status_text_round_trip() {
        assert_eq!(OrderStatus::parse("cancelled"), Some(OrderStatus::Cancelled));
        assert_eq!(PaymentStatus::parse("refunded").map(|s| s.as_str()), Some("refunded"));
        assert_eq!(PaymentMethod::parse("razorpay"), None);
    }
}
