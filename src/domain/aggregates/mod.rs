//! Aggregates module
pub mod order;

pub use order::{
    BookingDetails, LineItem, NewOrder, Order, OrderError, OrderStatus, Owner, PaymentMethod,
    PaymentOutcome, PaymentSettlement, PaymentStatus, StatusUpdate, Transition,
};
