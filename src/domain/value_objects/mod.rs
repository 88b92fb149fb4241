//! Value Objects for catering orders

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Calendar month an order id is minted in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Period {
    year: i32,
    month: u32,
}

impl Period {
    pub fn of(at: DateTime<Utc>) -> Self { Self { year: at.year(), month: at.month() } }
    /// Key of the sequence counter backing this period.
    pub fn counter_key(&self) -> String { format!("order-{self}") }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{:04}{:02}", self.year, self.month) }
}

/// Human-readable order identifier, `PREFIX-YYYYMM-NNNN`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(String);

impl OrderId {
    pub fn mint(prefix: &str, period: Period, sequence: i64) -> Self {
        Self(format!("{prefix}-{period}-{sequence:04}"))
    }
    /// Wraps an id that was minted earlier (read back from storage).
    pub fn restore(value: impl Into<String>) -> Self { Self(value.into()) }
    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

/// What an order is placed against.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "entityType", content = "entityId", rename_all = "lowercase")]
pub enum EntityRef {
    Occasion(String),
    Service(String),
    Category(String),
    Package(String),
}

impl EntityRef {
    pub const KINDS: [&'static str; 4] = ["occasion", "service", "category", "package"];

    pub fn new(kind: &str, id: impl Into<String>) -> Result<Self, EntityError> {
        let id = id.into();
        if id.trim().is_empty() { return Err(EntityError::EmptyId); }
        match kind {
            "occasion" => Ok(Self::Occasion(id)),
            "service" => Ok(Self::Service(id)),
            "category" => Ok(Self::Category(id)),
            "package" => Ok(Self::Package(id)),
            _ => Err(EntityError::UnknownKind),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self { Self::Occasion(_) => "occasion", Self::Service(_) => "service", Self::Category(_) => "category", Self::Package(_) => "package" }
    }

    pub fn id(&self) -> &str {
        match self { Self::Occasion(id) | Self::Service(id) | Self::Category(id) | Self::Package(id) => id }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)] pub enum EntityError { UnknownKind, EmptyId }
impl std::error::Error for EntityError {}
impl fmt::Display for EntityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self { Self::UnknownKind => write!(f, "Invalid entity type"), Self::EmptyId => write!(f, "Entity ID cannot be empty") }
    }
}

/// Instrument the customer paid with, as reported by the gateway.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentChannel { Upi, Card, Netbanking, Wallet, Emi }

impl PaymentChannel {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().replace(['_', '-', ' '], "").as_str() {
            "upi" => Some(Self::Upi),
            "card" | "creditcard" | "debitcard" => Some(Self::Card),
            "netbanking" => Some(Self::Netbanking),
            "wallet" => Some(Self::Wallet),
            "emi" => Some(Self::Emi),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self { Self::Upi => "upi", Self::Card => "card", Self::Netbanking => "netbanking", Self::Wallet => "wallet", Self::Emi => "emi" }
    }
}

/// Gateway status strings folded into the three outcomes the order cares about.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GatewayStatus { Succeeded, Failed, Other }

impl GatewayStatus {
    pub fn classify(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "success" | "succeeded" | "paid" | "captured" | "completed" | "confirmed" => Self::Succeeded,
            "failed" | "failure" | "declined" | "cancelled" | "canceled" | "expired" => Self::Failed,
            _ => Self::Other,
        }
    }
}

/// Payment ids with this prefix are synthetic ones handed out when the gateway is mocked.
pub const MOCK_PAYMENT_PREFIX: &str = "MOCK-";

pub fn is_mock_payment(payment_id: &str) -> bool {
    payment_id.trim().to_ascii_uppercase().starts_with(MOCK_PAYMENT_PREFIX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_order_id_format() {
        let at = Utc.with_ymd_and_hms(2025, 12, 1, 10, 0, 0).unwrap();
        let period = Period::of(at);
        assert_eq!(period.counter_key(), "order-202512");
        assert_eq!(OrderId::mint("WTF", period, 1).as_str(), "WTF-202512-0001");
        assert_eq!(OrderId::mint("WTF", period, 12345).as_str(), "WTF-202512-12345");
    }

    #[test]
    fn test_entity_ref() {
        let entity = EntityRef::new("package", "p1").unwrap();
        assert_eq!(entity, EntityRef::Package("p1".into()));
        assert_eq!(entity.kind(), "package");
        assert_eq!(EntityRef::new("banner", "b1"), Err(EntityError::UnknownKind));
        assert_eq!(EntityRef::new("service", "  "), Err(EntityError::EmptyId));
    }

    #[test]
    fn test_entity_ref_serializes_flat() {
        let json = serde_json::to_value(EntityRef::Occasion("o1".into())).unwrap();
        assert_eq!(json, serde_json::json!({"entityType": "occasion", "entityId": "o1"}));
    }

    #[test]
    fn test_gateway_status() {
        assert_eq!(GatewayStatus::classify("Succeeded"), GatewayStatus::Succeeded);
        assert_eq!(GatewayStatus::classify("failed"), GatewayStatus::Failed);
        assert_eq!(GatewayStatus::classify("initiated"), GatewayStatus::Other);
    }

    #[test]
    fn test_payment_channel_and_mock_marker() {
        assert_eq!(PaymentChannel::parse("net_banking"), Some(PaymentChannel::Netbanking));
        assert_eq!(PaymentChannel::parse("UPI"), Some(PaymentChannel::Upi));
        assert_eq!(PaymentChannel::parse("cash"), None);
        assert!(is_mock_payment("MOCK-123"));
        assert!(is_mock_payment("mock-123"));
        assert!(!is_mock_payment("pay_123"));
    }
}
