//! Order lifecycle: request payloads and the service behind the endpoints.

mod payload;
mod service;

pub use payload::{
    BookingPayload, CreateOrderRequest, InitiatePaymentRequest, LineItemPayload, PaymentLinkResponse,
    VerifyPaymentCommand,
};
pub use service::{OrderService, VerifyOutcome};
