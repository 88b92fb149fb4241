//! Order persistence.
//!
//! [`OrderStore`] and [`SequenceStore`] are the only seams touching the
//! backing store. Two implementations exist: [`PgStore`] for Postgres and
//! [`MemoryStore`] for tests and database-less local runs.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::{Order, OrderStatus, PaymentSettlement, StatusUpdate};
use crate::pagination::{Page, PageRequest, Paginated, SortField, SortValue, ValueKind};
use crate::Result;

/// Fields orders can be listed by.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OrderSortField {
    #[default]
    CreatedAt,
    TotalAmount,
    OrderId,
}

impl SortField for OrderSortField {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "createdAt" | "created_at" => Some(Self::CreatedAt),
            "totalAmount" | "total_amount" => Some(Self::TotalAmount),
            "orderId" | "order_id" => Some(Self::OrderId),
            _ => None,
        }
    }

    fn column(self) -> &'static str {
        match self {
            Self::CreatedAt => "created_at",
            Self::TotalAmount => "total_amount",
            Self::OrderId => "order_id",
        }
    }

    fn kind(self) -> ValueKind {
        match self {
            Self::CreatedAt => ValueKind::Timestamp,
            Self::TotalAmount => ValueKind::Number,
            Self::OrderId => ValueKind::Text,
        }
    }
}

impl Paginated for Order {
    type Field = OrderSortField;

    fn sort_value(&self, field: OrderSortField) -> SortValue {
        match field {
            OrderSortField::CreatedAt => SortValue::Timestamp(self.created_at),
            OrderSortField::TotalAmount => SortValue::Number(self.total_amount),
            OrderSortField::OrderId => SortValue::Text(self.order_id.as_str().to_string()),
        }
    }

    fn tie_break(&self) -> Uuid {
        self.id
    }
}

/// Filter applied before pagination.
#[derive(Clone, Debug, Default)]
pub struct OrderFilter {
    pub user_id: Option<Uuid>,
    pub status: Option<OrderStatus>,
    /// Order-id prefix or owner name fragment, case-insensitive.
    pub search: Option<String>,
}

impl OrderFilter {
    pub fn for_owner(user_id: Uuid) -> Self {
        Self { user_id: Some(user_id), ..Self::default() }
    }
}

pub type OrderPage = Page<Order>;

#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn insert(&self, order: &Order) -> Result<()>;

    async fn find(&self, order_id: &str, expand_owner: bool) -> Result<Option<Order>>;

    async fn list(&self, filter: &OrderFilter, request: &PageRequest<OrderSortField>) -> Result<OrderPage>;

    /// `None` when no order has this id.
    async fn update_status(&self, order_id: &str, update: &StatusUpdate) -> Result<Option<Order>>;

    /// Stores the gateway transaction for an unpaid order. `None` when the
    /// order is missing or already paid.
    async fn attach_transaction(&self, order_id: &str, transaction_id: &str, raw: &serde_json::Value) -> Result<Option<Order>>;

    /// Applies a payment settlement unless the order is already paid, as one
    /// conditional write. `None` when the order is missing or already paid.
    async fn settle_payment(&self, order_id: &str, settlement: &PaymentSettlement) -> Result<Option<Order>>;
}

#[async_trait]
pub trait SequenceStore: Send + Sync {
    /// Atomically increments the counter under `key` and returns the new
    /// value; an absent counter starts at 1.
    async fn next_sequence(&self, key: &str) -> Result<i64>;
}
