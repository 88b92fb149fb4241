//! Order id minting on top of per-month sequence counters.

use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::domain::{OrderId, Period};
use crate::store::SequenceStore;
use crate::Result;

#[derive(Clone)]
pub struct OrderIdGenerator {
    prefix: String,
    counters: Arc<dyn SequenceStore>,
}

impl OrderIdGenerator {
    pub fn new(prefix: impl Into<String>, counters: Arc<dyn SequenceStore>) -> Self {
        Self { prefix: prefix.into(), counters }
    }

    /// Mints the next id for the current calendar month.
    pub async fn next(&self) -> Result<OrderId> {
        self.next_at(Utc::now()).await
    }

    pub async fn next_at(&self, now: DateTime<Utc>) -> Result<OrderId> {
        let period = Period::of(now);
        let sequence = self.counters.next_sequence(&period.counter_key()).await?;
        tracing::debug!(period = %period, sequence, "Minted order sequence");
        Ok(OrderId::mint(&self.prefix, period, sequence))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use chrono::TimeZone;
    use std::collections::HashSet;

    #[tokio::test]
    async fn test_ids_restart_each_month() {
        let ids = OrderIdGenerator::new("WTF", Arc::new(MemoryStore::new()));
        let december = Utc.with_ymd_and_hms(2025, 12, 31, 23, 59, 59).unwrap();
        let january = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();

        assert_eq!(ids.next_at(december).await.unwrap().as_str(), "WTF-202512-0001");
        assert_eq!(ids.next_at(december).await.unwrap().as_str(), "WTF-202512-0002");
        assert_eq!(ids.next_at(january).await.unwrap().as_str(), "WTF-202601-0001");
    }

    #[tokio::test]
    async fn test_concurrent_minting_never_repeats() {
        let ids = OrderIdGenerator::new("WTF", Arc::new(MemoryStore::new()));
        let handles: Vec<_> = (0..40)
            .map(|_| {
                let ids = ids.clone();
                tokio::spawn(async move { ids.next().await.unwrap() })
            })
            .collect();

        let mut minted = HashSet::new();
        for handle in handles {
            assert!(minted.insert(handle.await.unwrap()));
        }
        assert_eq!(minted.len(), 40);
    }
}
