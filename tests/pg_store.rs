//! `PgStore` against a scratch database per test.
//!
//! These need `DATABASE_URL` to point at a Postgres server; run them with
//! `cargo test --test pg_store -- --ignored`.

use chrono::Utc;
use rust_decimal::Decimal;
use serde_json::json;
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

use catering_orders::domain::{
    BookingDetails, EntityRef, NewOrder, Order, OrderStatus, PaymentChannel, PaymentOutcome, PaymentSettlement, PaymentStatus,
};
use catering_orders::pagination::{Direction, PageRequest, SortOrder};
use catering_orders::sequence::OrderIdGenerator;
use catering_orders::store::{OrderFilter, OrderSortField, OrderStore, PgStore, SequenceStore};

async fn user(pool: &PgPool) -> Uuid {
    let id = Uuid::new_v4();
    sqlx::query("INSERT INTO users (id, first_name, last_name, email) VALUES ($1, 'Asha', 'Rao', $2)")
        .bind(id)
        .bind(format!("{id}@example.com"))
        .execute(pool)
        .await
        .unwrap();
    id
}

async fn place(store: &Arc<PgStore>, user_id: Uuid, total: i64) -> Order {
    let ids = OrderIdGenerator::new("WTF", store.clone());
    let order = Order::place(
        ids.next().await.unwrap(),
        Some(user_id),
        NewOrder {
            entity: EntityRef::Package("p1".into()),
            items: vec![],
            booking_details: BookingDetails { date: "2025-12-01".into(), time: "19:00".into(), veg_guests: 10, non_veg_guests: 5 },
            total_amount: Decimal::new(total, 0),
            payment_method: None,
            address: "12 Main Street".into(),
            notes: None,
        },
    );
    store.insert(&order).await.unwrap();
    order
}

fn paid(payment_id: &str) -> PaymentSettlement {
    PaymentSettlement {
        outcome: PaymentOutcome::Paid { channel: Some(PaymentChannel::Upi) },
        payment_id: Some(payment_id.into()),
        gateway_response: Some(json!({ "payment": { "status": "succeeded" } })),
    }
}

fn ids(orders: &[Order]) -> Vec<String> {
    orders.iter().map(|o| o.order_id.to_string()).collect()
}

#[sqlx::test]
#[ignore = "needs DATABASE_URL"]
async fn test_concurrent_sequences_are_unique(pool: PgPool) {
    let store = Arc::new(PgStore::new(pool));
    let handles: Vec<_> = (0..20)
        .map(|_| {
            let store = store.clone();
            tokio::spawn(async move { store.next_sequence("WTF-202512").await.unwrap() })
        })
        .collect();

    let mut issued = Vec::new();
    for handle in handles {
        issued.push(handle.await.unwrap());
    }
    issued.sort_unstable();
    assert_eq!(issued, (1..=20).collect::<Vec<i64>>());
    assert_eq!(store.next_sequence("WTF-202601").await.unwrap(), 1);
}

#[sqlx::test]
#[ignore = "needs DATABASE_URL"]
async fn test_concurrent_creations_get_distinct_order_ids(pool: PgPool) {
    let store = Arc::new(PgStore::new(pool.clone()));
    let owner = user(&pool).await;
    let handles: Vec<_> = (0..10)
        .map(|n| {
            let store = store.clone();
            tokio::spawn(async move { place(&store, owner, 100 + n).await })
        })
        .collect();

    let mut minted = Vec::new();
    for handle in handles {
        minted.push(handle.await.unwrap().order_id.to_string());
    }
    minted.sort();
    minted.dedup();
    assert_eq!(minted.len(), 10);
    assert!(minted.iter().any(|id| id.ends_with("-0010")));
}

#[sqlx::test]
#[ignore = "needs DATABASE_URL"]
async fn test_settle_twice_leaves_paid_order_alone(pool: PgPool) {
    let store = Arc::new(PgStore::new(pool.clone()));
    let order = place(&store, user(&pool).await, 200).await;
    let id = order.order_id.as_str();

    let settled = store.settle_payment(id, &paid("pay_1")).await.unwrap().unwrap();
    assert_eq!(settled.payment_status, PaymentStatus::Paid);
    assert_eq!(settled.status, OrderStatus::Confirmed);
    assert_eq!(settled.chosen_payment_method, Some(PaymentChannel::Upi));
    assert_eq!(settled.owner.as_ref().map(|o| o.full_name()).as_deref(), Some("Asha Rao"));

    assert!(store.settle_payment(id, &paid("pay_2")).await.unwrap().is_none());
    let failed = PaymentSettlement { outcome: PaymentOutcome::Failed, payment_id: Some("pay_3".into()), gateway_response: None };
    assert!(store.settle_payment(id, &failed).await.unwrap().is_none());
    assert!(store.attach_transaction(id, "link_late", &json!({})).await.unwrap().is_none());

    let stored = store.find(id, false).await.unwrap().unwrap();
    assert_eq!(stored.payment_status, PaymentStatus::Paid);
    assert_eq!(stored.payment_id.as_deref(), Some("pay_1"));
    assert_eq!(stored.updated_at, settled.updated_at);
    assert!(stored.transaction_id.is_none());
}

#[sqlx::test]
#[ignore = "needs DATABASE_URL"]
async fn test_concurrent_settlements_confirm_once(pool: PgPool) {
    let store = Arc::new(PgStore::new(pool.clone()));
    let order = place(&store, user(&pool).await, 200).await;

    let handles: Vec<_> = (0..8)
        .map(|n| {
            let store = store.clone();
            let id = order.order_id.to_string();
            tokio::spawn(async move { store.settle_payment(&id, &paid(&format!("pay_{n}"))).await.unwrap() })
        })
        .collect();

    let mut confirmed = 0;
    for handle in handles {
        if handle.await.unwrap().is_some() {
            confirmed += 1;
        }
    }
    assert_eq!(confirmed, 1);
}

#[sqlx::test]
#[ignore = "needs DATABASE_URL"]
async fn test_keyset_walk_and_reversal(pool: PgPool) {
    let store = Arc::new(PgStore::new(pool.clone()));
    let owner = user(&pool).await;
    for total in [300, 100, 500, 200, 400] {
        place(&store, owner, total).await;
    }
    place(&store, user(&pool).await, 50).await;

    let filter = OrderFilter::for_owner(owner);
    let base = PageRequest::new(OrderSortField::TotalAmount, SortOrder::Asc).with_limit(2);

    let page1 = store.list(&filter, &base.clone()).await.unwrap();
    assert!(page1.page_info.has_next_page);
    assert!(!page1.page_info.has_prev_page);
    let next = page1.page_info.next_cursor.clone().unwrap();

    let page2 = store.list(&filter, &base.clone().with_cursor(Some(&next))).await.unwrap();
    let next = page2.page_info.next_cursor.clone().unwrap();
    let page3 = store.list(&filter, &base.clone().with_cursor(Some(&next))).await.unwrap();
    assert!(!page3.page_info.has_next_page);

    let totals: Vec<Decimal> =
        [&page1, &page2, &page3].iter().flat_map(|p| p.data.iter().map(|o| o.total_amount)).collect();
    assert_eq!(totals, [100, 200, 300, 400, 500].map(|t| Decimal::new(t, 0)).to_vec());

    let prev = page2.page_info.prev_cursor.clone().unwrap();
    let back = store
        .list(&filter, &base.clone().with_cursor(Some(&prev)).with_direction(Direction::Prev))
        .await
        .unwrap();
    assert_eq!(ids(&back.data), ids(&page1.data));
    assert!(back.page_info.has_next_page);
    assert!(!back.page_info.has_prev_page);

    let newest = store
        .list(&OrderFilter::default(), &PageRequest::new(OrderSortField::CreatedAt, SortOrder::Desc).with_limit(1))
        .await
        .unwrap();
    assert_eq!(newest.data[0].total_amount, Decimal::new(50, 0));
    assert!(newest.data[0].created_at <= Utc::now());
}
