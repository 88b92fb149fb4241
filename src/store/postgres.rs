use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{types::Json, FromRow, PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use super::{OrderFilter, OrderPage, OrderSortField, OrderStore, SequenceStore};
use crate::domain::{
    BookingDetails, EntityRef, LineItem, Order, OrderId, OrderStatus, Owner, PaymentChannel, PaymentMethod,
    PaymentOutcome, PaymentSettlement, PaymentStatus, StatusUpdate,
};
use crate::pagination::{push_keyset, Page, PageRequest};
use crate::{CateringError, Result};

const SELECT_ORDER: &str = "SELECT o.*, u.first_name AS owner_first_name, u.last_name AS owner_last_name, \
     u.email AS owner_email, u.phone AS owner_phone";

fn select_from(source: &str) -> String {
    format!("{SELECT_ORDER} FROM {source} o LEFT JOIN users u ON u.id = o.user_id")
}

/// Wraps an `UPDATE ... RETURNING *` so the updated row comes back with its owner joined.
fn returning_order(update: &str) -> String {
    format!("WITH updated AS ({update} RETURNING *) {}", select_from("updated"))
}

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(FromRow)]
struct OrderRow {
    id: Uuid,
    order_id: String,
    user_id: Option<Uuid>,
    entity_type: String,
    entity_id: String,
    items: Json<Vec<LineItem>>,
    booking_details: Json<BookingDetails>,
    total_amount: Decimal,
    status: String,
    payment_status: String,
    payment_method: Option<String>,
    transaction_id: Option<String>,
    payment_id: Option<String>,
    gateway_response: Option<serde_json::Value>,
    chosen_payment_method: Option<String>,
    address: Option<String>,
    notes: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    owner_first_name: Option<String>,
    owner_last_name: Option<String>,
    owner_email: Option<String>,
    owner_phone: Option<String>,
}

fn corrupt(order_id: &str, column: &str, value: &str) -> CateringError {
    CateringError::Internal(format!("order {order_id} has invalid {column} '{value}'"))
}

impl OrderRow {
    fn into_order(self, expand_owner: bool) -> Result<Order> {
        let order_id = self.order_id;
        let entity = EntityRef::new(&self.entity_type, self.entity_id)
            .map_err(|_| corrupt(&order_id, "entity_type", &self.entity_type))?;
        let status = OrderStatus::parse(&self.status).ok_or_else(|| corrupt(&order_id, "status", &self.status))?;
        let payment_status = PaymentStatus::parse(&self.payment_status)
            .ok_or_else(|| corrupt(&order_id, "payment_status", &self.payment_status))?;
        let payment_method = match self.payment_method.as_deref() {
            Some(raw) => Some(PaymentMethod::parse(raw).ok_or_else(|| corrupt(&order_id, "payment_method", raw))?),
            None => None,
        };
        let owner = match (expand_owner, self.user_id, self.owner_first_name, self.owner_email) {
            (true, Some(id), Some(first_name), Some(email)) => Some(Owner {
                id,
                first_name,
                last_name: self.owner_last_name,
                email,
                phone: self.owner_phone,
            }),
            _ => None,
        };

        Ok(Order {
            id: self.id,
            order_id: OrderId::restore(order_id),
            user_id: self.user_id,
            owner,
            entity,
            items: self.items.0,
            booking_details: self.booking_details.0,
            total_amount: self.total_amount,
            status,
            payment_status,
            payment_method,
            transaction_id: self.transaction_id,
            payment_id: self.payment_id,
            gateway_response: self.gateway_response,
            chosen_payment_method: self.chosen_payment_method.as_deref().and_then(PaymentChannel::parse),
            address: self.address,
            notes: self.notes,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// Escapes LIKE wildcards so search terms match literally.
fn escape_like(term: &str) -> String {
    term.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}

#[async_trait]
impl OrderStore for PgStore {
    async fn insert(&self, order: &Order) -> Result<()> {
        sqlx::query(
            "INSERT INTO orders (id, order_id, user_id, entity_type, entity_id, items, booking_details, total_amount, \
             status, payment_status, payment_method, transaction_id, payment_id, gateway_response, chosen_payment_method, \
             address, notes, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19)",
        )
        .bind(order.id)
        .bind(order.order_id.as_str())
        .bind(order.user_id)
        .bind(order.entity.kind())
        .bind(order.entity.id())
        .bind(Json(order.items.clone()))
        .bind(Json(order.booking_details.clone()))
        .bind(order.total_amount)
        .bind(order.status.as_str())
        .bind(order.payment_status.as_str())
        .bind(order.payment_method.map(|m| m.as_str()))
        .bind(order.transaction_id.as_deref())
        .bind(order.payment_id.as_deref())
        .bind(order.gateway_response.clone())
        .bind(order.chosen_payment_method.map(|c| c.as_str()))
        .bind(order.address.as_deref())
        .bind(order.notes.as_deref())
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find(&self, order_id: &str, expand_owner: bool) -> Result<Option<Order>> {
        let sql = format!("{} WHERE o.order_id = $1", select_from("orders"));
        sqlx::query_as::<_, OrderRow>(&sql)
            .bind(order_id)
            .fetch_optional(&self.pool)
            .await?
            .map(|row| row.into_order(expand_owner))
            .transpose()
    }

    async fn list(&self, filter: &OrderFilter, request: &PageRequest<OrderSortField>) -> Result<OrderPage> {
        let mut builder = QueryBuilder::<Postgres>::new(select_from("orders"));
        builder.push(" WHERE TRUE");
        if let Some(user_id) = filter.user_id {
            builder.push(" AND o.user_id = ");
            builder.push_bind(user_id);
        }
        if let Some(status) = filter.status {
            builder.push(" AND o.status = ");
            builder.push_bind(status.as_str());
        }
        if let Some(term) = filter.search.as_deref() {
            let escaped = escape_like(term);
            builder.push(" AND (o.order_id ILIKE ");
            builder.push_bind(format!("{escaped}%"));
            builder.push(" OR (u.first_name || ' ' || COALESCE(u.last_name, '')) ILIKE ");
            builder.push_bind(format!("%{escaped}%"));
            builder.push(")");
        }
        push_keyset(&mut builder, request, "o");

        let rows = builder.build_query_as::<OrderRow>().fetch_all(&self.pool).await?;
        let orders = rows
            .into_iter()
            .map(|row| row.into_order(request.expand))
            .collect::<Result<Vec<_>>>()?;
        Ok(Page::assemble(orders, request))
    }

    async fn update_status(&self, order_id: &str, update: &StatusUpdate) -> Result<Option<Order>> {
        let sql = returning_order(
            "UPDATE orders SET status = COALESCE($2, status), payment_status = COALESCE($3, payment_status), \
             updated_at = NOW() WHERE order_id = $1",
        );
        sqlx::query_as::<_, OrderRow>(&sql)
            .bind(order_id)
            .bind(update.status.map(|s| s.as_str()))
            .bind(update.payment_status.map(|s| s.as_str()))
            .fetch_optional(&self.pool)
            .await?
            .map(|row| row.into_order(true))
            .transpose()
    }

    async fn attach_transaction(&self, order_id: &str, transaction_id: &str, raw: &serde_json::Value) -> Result<Option<Order>> {
        let sql = returning_order(
            "UPDATE orders SET transaction_id = $2, gateway_response = $3, \
             payment_method = COALESCE(payment_method, 'gateway'), updated_at = NOW() \
             WHERE order_id = $1 AND payment_status <> 'paid'",
        );
        sqlx::query_as::<_, OrderRow>(&sql)
            .bind(order_id)
            .bind(transaction_id)
            .bind(raw.clone())
            .fetch_optional(&self.pool)
            .await?
            .map(|row| row.into_order(true))
            .transpose()
    }

    async fn settle_payment(&self, order_id: &str, settlement: &PaymentSettlement) -> Result<Option<Order>> {
        let (payment_status, status, channel) = match &settlement.outcome {
            PaymentOutcome::Paid { channel } => (
                Some(PaymentStatus::Paid.as_str()),
                Some(OrderStatus::Confirmed.as_str()),
                channel.map(|c| c.as_str()),
            ),
            PaymentOutcome::Failed => (Some(PaymentStatus::Failed.as_str()), None, None),
            PaymentOutcome::Recorded { .. } => (None, None, None),
        };
        // the payment_status guard makes `paid` a terminal state under concurrent webhooks
        let sql = returning_order(
            "UPDATE orders SET payment_status = COALESCE($2, payment_status), status = COALESCE($3, status), \
             chosen_payment_method = COALESCE($4, chosen_payment_method), payment_id = COALESCE($5, payment_id), \
             gateway_response = COALESCE($6, gateway_response), updated_at = NOW() \
             WHERE order_id = $1 AND payment_status <> 'paid'",
        );
        sqlx::query_as::<_, OrderRow>(&sql)
            .bind(order_id)
            .bind(payment_status)
            .bind(status)
            .bind(channel)
            .bind(settlement.payment_id.as_deref())
            .bind(settlement.gateway_response.clone())
            .fetch_optional(&self.pool)
            .await?
            .map(|row| row.into_order(true))
            .transpose()
    }
}

#[async_trait]
impl SequenceStore for PgStore {
    async fn next_sequence(&self, key: &str) -> Result<i64> {
        let (sequence,): (i64,) = sqlx::query_as(
            "INSERT INTO counters (id, sequence) VALUES ($1, 1) \
             ON CONFLICT (id) DO UPDATE SET sequence = counters.sequence + 1 RETURNING sequence",
        )
        .bind(key)
        .fetch_one(&self.pool)
        .await?;
        Ok(sequence)
    }
}
