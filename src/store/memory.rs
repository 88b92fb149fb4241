use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use super::{OrderFilter, OrderPage, OrderSortField, OrderStore, SequenceStore};
use crate::domain::{Order, Owner, PaymentSettlement, StatusUpdate, Transition};
use crate::pagination::{paginate, PageRequest};
use crate::Result;

/// Store kept in process memory. Every mutation happens under one lock, so
/// counter increments and conditional payment writes are atomic.
#[derive(Default)]
pub struct MemoryStore {
    orders: RwLock<HashMap<String, Order>>,
    owners: RwLock<HashMap<Uuid, Owner>>,
    counters: Mutex<HashMap<String, i64>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an owner profile, as the auth service would.
    pub async fn add_owner(&self, owner: Owner) {
        self.owners.write().await.insert(owner.id, owner);
    }

    async fn expand(&self, mut order: Order) -> Order {
        order.owner = match order.user_id {
            Some(id) => self.owners.read().await.get(&id).cloned(),
            None => None,
        };
        order
    }

    fn matches(filter: &OrderFilter, order: &Order, owners: &HashMap<Uuid, Owner>) -> bool {
        if filter.user_id.is_some() && order.user_id != filter.user_id {
            return false;
        }
        if filter.status.is_some_and(|status| order.status != status) {
            return false;
        }
        match filter.search.as_deref().map(str::to_lowercase) {
            Some(term) => {
                let by_id = order.order_id.as_str().to_lowercase().starts_with(&term);
                let by_owner = order
                    .user_id
                    .and_then(|id| owners.get(&id))
                    .is_some_and(|owner| owner.full_name().to_lowercase().contains(&term));
                by_id || by_owner
            }
            None => true,
        }
    }
}

#[async_trait]
impl OrderStore for MemoryStore {
    async fn insert(&self, order: &Order) -> Result<()> {
        let mut orders = self.orders.write().await;
        if orders.contains_key(order.order_id.as_str()) {
            return Err(crate::CateringError::Internal(format!("duplicate order id {}", order.order_id)));
        }
        let mut stored = order.clone();
        stored.owner = None;
        orders.insert(order.order_id.as_str().to_string(), stored);
        Ok(())
    }

    async fn find(&self, order_id: &str, expand_owner: bool) -> Result<Option<Order>> {
        let found = self.orders.read().await.get(order_id).cloned();
        Ok(match found {
            Some(order) if expand_owner => Some(self.expand(order).await),
            other => other,
        })
    }

    async fn list(&self, filter: &OrderFilter, request: &PageRequest<OrderSortField>) -> Result<OrderPage> {
        let candidates: Vec<Order> = {
            let orders = self.orders.read().await;
            let owners = self.owners.read().await;
            orders.values().filter(|o| Self::matches(filter, o, &owners)).cloned().collect()
        };
        let mut page = paginate(candidates, request);
        if request.expand {
            let mut expanded = Vec::with_capacity(page.data.len());
            for order in page.data {
                expanded.push(self.expand(order).await);
            }
            page.data = expanded;
        }
        Ok(page)
    }

    async fn update_status(&self, order_id: &str, update: &StatusUpdate) -> Result<Option<Order>> {
        let updated = self.orders.write().await.get_mut(order_id).map(|order| {
            order.apply_status_update(update);
            order.clone()
        });
        Ok(match updated {
            Some(order) => Some(self.expand(order).await),
            None => None,
        })
    }

    async fn attach_transaction(&self, order_id: &str, transaction_id: &str, raw: &serde_json::Value) -> Result<Option<Order>> {
        let mut orders = self.orders.write().await;
        Ok(orders
            .get_mut(order_id)
            .and_then(|order| order.attach_transaction(transaction_id, raw.clone()).ok().map(|_| order.clone())))
    }

    async fn settle_payment(&self, order_id: &str, settlement: &PaymentSettlement) -> Result<Option<Order>> {
        let mut orders = self.orders.write().await;
        Ok(orders.get_mut(order_id).and_then(|order| match order.settle(settlement) {
            Transition::Applied => Some(order.clone()),
            Transition::AlreadyPaid => None,
        }))
    }
}

#[async_trait]
impl SequenceStore for MemoryStore {
    async fn next_sequence(&self, key: &str) -> Result<i64> {
        let mut counters = self.counters.lock().await;
        let counter = counters.entry(key.to_string()).or_insert(0);
        *counter += 1;
        Ok(*counter)
    }
}
