//! Request bodies accepted by the order endpoints and their mapping into
//! domain inputs.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use validator::{Validate, ValidationError, ValidationErrors};

use crate::domain::{BookingDetails, EntityRef, LineItem, NewOrder, PaymentChannel, PaymentMethod};
use crate::{CateringError, FieldErrors, Result};

fn failure(code: &'static str, message: &'static str) -> ValidationError {
    let mut error = ValidationError::new(code);
    error.message = Some(message.into());
    error
}

fn known_entity_type(value: &str) -> std::result::Result<(), ValidationError> {
    if EntityRef::KINDS.contains(&value) {
        Ok(())
    } else {
        Err(failure("entity_type", "Entity type must be one of occasion, service, category, package"))
    }
}

/// Wire name of a payment method; `zoho` is the legacy name for the gateway.
fn payment_method(value: &str) -> Option<PaymentMethod> {
    match value {
        "zoho" => Some(PaymentMethod::Gateway),
        other => PaymentMethod::parse(other),
    }
}

fn known_payment_method(value: &str) -> std::result::Result<(), ValidationError> {
    match payment_method(value) {
        Some(_) => Ok(()),
        None => Err(failure("payment_method", "Payment method must be gateway or cod")),
    }
}

fn non_negative(value: &Decimal) -> std::result::Result<(), ValidationError> {
    if *value < Decimal::ZERO {
        Err(failure("non_negative", "Must be zero or greater"))
    } else {
        Ok(())
    }
}

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    #[validate(required(message = "Entity type is required"), custom = "known_entity_type")]
    pub entity_type: Option<String>,
    #[validate(required(message = "Entity ID is required"), length(min = 1, message = "Entity ID cannot be empty"))]
    pub entity_id: Option<String>,
    #[serde(default)]
    #[validate(length(min = 1, message = "At least one item is required"))]
    pub items: Vec<LineItemPayload>,
    #[validate(required(message = "Booking details are required"))]
    pub booking_details: Option<BookingPayload>,
    #[validate(required(message = "Total amount is required"), custom = "non_negative")]
    pub total_amount: Option<Decimal>,
    #[validate(custom = "known_payment_method")]
    pub payment_method: Option<String>,
    #[validate(required(message = "Address is required"), length(min = 5, message = "Address must be at least 5 characters"))]
    pub address: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct LineItemPayload {
    pub item_id: Option<String>,
    #[validate(required(message = "Item name is required"), length(min = 1, message = "Item name is required"))]
    pub name: Option<String>,
    pub category: Option<String>,
    #[validate(required(message = "Quantity is required"), range(min = 1, message = "Quantity must be at least 1"))]
    pub quantity: Option<i64>,
    #[validate(required(message = "Price is required"), custom = "non_negative")]
    pub price: Option<Decimal>,
    pub base_quantity: Option<Decimal>,
    pub measurement: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub image: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct BookingPayload {
    #[validate(required(message = "Booking date is required"), length(min = 1, message = "Booking date is required"))]
    pub date: Option<String>,
    #[validate(required(message = "Booking time is required"), length(min = 1, message = "Booking time is required"))]
    pub time: Option<String>,
    pub veg_guests: Option<u32>,
    pub non_veg_guests: Option<u32>,
}

fn camel_case(field: &str) -> String {
    let mut out = String::with_capacity(field.len());
    let mut upper = false;
    for c in field.chars() {
        if c == '_' {
            upper = true;
        } else if upper {
            out.extend(c.to_uppercase());
            upper = false;
        } else {
            out.push(c);
        }
    }
    out
}

/// Folds validator output into `FieldErrors`, keyed by JSON path under `prefix`.
fn collect(errors: &mut FieldErrors, prefix: &str, result: std::result::Result<(), ValidationErrors>) {
    let Err(failures) = result else { return };
    for (field, list) in failures.field_errors() {
        let path = format!("{prefix}{}", camel_case(field));
        let messages = errors.entry(path.clone()).or_default();
        for failure in list {
            let message = failure.message.as_ref().map(|m| m.to_string()).unwrap_or_else(|| format!("{path} is invalid"));
            messages.push(message);
        }
    }
}

fn present<T>(value: Option<T>, field: &str) -> Result<T> {
    value.ok_or_else(|| CateringError::invalid(field, format!("{field} is required")))
}

impl CreateOrderRequest {
    /// Validates every field and reports all failures at once.
    pub fn into_new_order(self) -> Result<NewOrder> {
        let mut errors = FieldErrors::new();
        collect(&mut errors, "", self.validate());
        for (index, item) in self.items.iter().enumerate() {
            collect(&mut errors, &format!("items[{index}]."), item.validate());
        }
        if let Some(booking) = &self.booking_details {
            collect(&mut errors, "bookingDetails.", booking.validate());
        }
        if !errors.is_empty() {
            return Err(CateringError::Validation(errors));
        }

        let entity = EntityRef::new(&present(self.entity_type, "entityType")?, present(self.entity_id, "entityId")?)
            .map_err(|e| CateringError::invalid("entityType", e.to_string()))?;
        let items = self
            .items
            .into_iter()
            .enumerate()
            .map(|(index, item)| item.into_line_item(index))
            .collect::<Result<Vec<_>>>()?;
        let booking = present(self.booking_details, "bookingDetails")?;
        let payment_method = self.payment_method.as_deref().and_then(payment_method);

        Ok(NewOrder {
            entity,
            items,
            booking_details: BookingDetails {
                date: present(booking.date, "bookingDetails.date")?,
                time: present(booking.time, "bookingDetails.time")?,
                veg_guests: booking.veg_guests.unwrap_or(0),
                non_veg_guests: booking.non_veg_guests.unwrap_or(0),
            },
            total_amount: present(self.total_amount, "totalAmount")?,
            payment_method,
            address: present(self.address, "address")?,
            notes: self.notes.filter(|n| !n.trim().is_empty()),
        })
    }
}

impl LineItemPayload {
    fn into_line_item(self, index: usize) -> Result<LineItem> {
        let field = |name: &str| format!("items[{index}].{name}");
        let quantity = present(self.quantity, &field("quantity"))?;
        let quantity = u32::try_from(quantity).map_err(|_| CateringError::invalid(field("quantity"), "Quantity is out of range"))?;
        Ok(LineItem {
            item_id: self.item_id,
            name: present(self.name, &field("name"))?,
            category: self.category,
            quantity,
            price: present(self.price, &field("price"))?,
            base_quantity: self.base_quantity,
            measurement: self.measurement,
            kind: self.kind,
            image: self.image,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitiatePaymentRequest {
    pub order_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentLinkResponse {
    pub payment_link: String,
    pub transaction_id: String,
}

/// The one shape payment verification works on, whatever the caller sent.
#[derive(Clone, Debug, PartialEq)]
pub struct VerifyPaymentCommand {
    pub order_id: String,
    pub payment_id: Option<String>,
    pub claimed_status: String,
    pub channel: Option<PaymentChannel>,
    pub raw: Value,
}

#[derive(Debug, Deserialize)]
struct WebhookEnvelope {
    event_type: Option<String>,
    event_object: WebhookObject,
}

#[derive(Debug, Default, Deserialize)]
struct WebhookObject {
    payment: Option<WebhookPayment>,
    payment_link: Option<WebhookLink>,
}

#[derive(Debug, Deserialize)]
struct WebhookPayment {
    payment_id: Option<String>,
    status: Option<String>,
    payment_mode: Option<String>,
    reference_number: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WebhookLink {
    reference_id: Option<String>,
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DirectVerification {
    order_id: Option<String>,
    payment_id: Option<String>,
    status: Option<String>,
    payment_method: Option<String>,
}

/// Either a gateway webhook delivery or a direct client confirmation.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum VerifyPaymentPayload {
    Webhook(WebhookEnvelope),
    Direct(DirectVerification),
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

impl VerifyPaymentCommand {
    /// Maps a raw verification body into a command.
    pub fn from_body(body: &[u8]) -> Result<Self> {
        let raw: Value = serde_json::from_slice(body).map_err(|e| CateringError::invalid("body", format!("Invalid JSON: {e}")))?;
        let payload: VerifyPaymentPayload = serde_json::from_value(raw.clone())
            .map_err(|_| CateringError::invalid("body", "Unrecognised payment verification payload"))?;

        let (order_id, payment_id, status, channel) = match payload {
            VerifyPaymentPayload::Webhook(envelope) => {
                let WebhookObject { payment, payment_link } = envelope.event_object;
                let (payment_id, payment_status, mode, reference) = match payment {
                    Some(p) => (p.payment_id, p.status, p.payment_mode, p.reference_number),
                    None => (None, None, None, None),
                };
                let (link_reference, link_status) = match payment_link {
                    Some(l) => (l.reference_id, l.status),
                    None => (None, None),
                };
                // event types look like `payment.succeeded`
                let event_status = envelope
                    .event_type
                    .as_deref()
                    .and_then(|t| t.rsplit('.').next())
                    .map(str::to_string);
                (
                    non_empty(reference).or(non_empty(link_reference)),
                    payment_id,
                    non_empty(payment_status).or(non_empty(link_status)).or(event_status),
                    mode,
                )
            }
            VerifyPaymentPayload::Direct(direct) => (direct.order_id, direct.payment_id, direct.status, direct.payment_method),
        };

        let Some(order_id) = non_empty(order_id) else {
            return Err(CateringError::invalid("orderId", "Order ID is required"));
        };
        Ok(Self {
            order_id,
            payment_id: non_empty(payment_id),
            claimed_status: non_empty(status).unwrap_or_else(|| "unknown".to_string()),
            channel: channel.as_deref().and_then(PaymentChannel::parse),
            raw,
        })
    }
}
