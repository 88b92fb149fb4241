//! Order domain: the order aggregate, its value objects and lifecycle events
pub mod aggregates;
pub mod events;
pub mod value_objects;

pub use aggregates::*;
pub use events::OrderEvent;
pub use value_objects::{EntityRef, GatewayStatus, OrderId, PaymentChannel, Period};
