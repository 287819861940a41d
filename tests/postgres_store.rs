//! `PgPaymentStore` against a real PostgreSQL.
//!
//! Runs when `DATABASE_URL` points at a scratch database; migrations are
//! applied on connect. Every test works on freshly generated ids and keys,
//! so runs can share one database.

use chrono::{Duration, Utc};
use gift_registry_payments::{
    db::{self, DbPool},
    models::{
        gift_item::GiftItem,
        idempotency_key::NewIdempotencyKey,
        registry_config::FeeModality,
        transaction::{NewTransaction, PaymentMethod, Transaction, generate_internal_id},
    },
    services::fee_calculator::FeeBreakdown,
    store::{ConfirmOutcome, FailOutcome, InsertOutcome, PaymentStore, PgPaymentStore},
};
use serde_json::json;
use uuid::Uuid;

async fn setup_store() -> Option<(PgPaymentStore, DbPool)> {
    let Ok(database_url) = std::env::var("DATABASE_URL") else {
        eprintln!("DATABASE_URL not set, skipping PostgreSQL store test");
        return None;
    };

    let pool = db::create_pool(&database_url, 10)
        .await
        .expect("Failed to connect to test database");
    db::run_migrations(&pool)
        .await
        .expect("Failed to run migrations");

    Some((PgPaymentStore::new(pool.clone()), pool))
}

async fn seed_gift(pool: &DbPool, quantity: i32) -> GiftItem {
    sqlx::query_as::<_, GiftItem>(
        r#"
        INSERT INTO gift_items (id, wedding_id, name, price, quantity_available)
        VALUES ($1, $2, 'Jogo de panelas', 50000, $3)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(Uuid::new_v4())
    .bind(quantity)
    .fetch_one(pool)
    .await
    .expect("Failed to seed gift item")
}

fn new_transaction(gift: &GiftItem) -> NewTransaction {
    NewTransaction {
        internal_id: generate_internal_id(),
        wedding_id: gift.wedding_id,
        gift_item_id: gift.id,
        original_unit_price: gift.price,
        fee_basis_points: 500,
        fee_modality: FeeModality::CouplePays,
        amounts: FeeBreakdown {
            gross_amount: 50_000,
            fee_amount: 2_500,
            net_amount_couple: 47_500,
            platform_amount: 2_500,
        },
        payment_method: PaymentMethod::CreditCard,
    }
}

fn unique_key(prefix: &str) -> String {
    format!("{prefix}-{}", Uuid::new_v4())
}

async fn create_pending(
    store: &PgPaymentStore,
    gift: &GiftItem,
    key: &str,
    now: chrono::DateTime<Utc>,
) -> Transaction {
    let outcome = store
        .insert_pending_transaction(
            new_transaction(gift),
            NewIdempotencyKey::new(key, json!({ "status": "pending" }), now),
            now,
        )
        .await
        .expect("Failed to insert transaction");
    match outcome {
        InsertOutcome::Created(transaction) => transaction,
        InsertOutcome::Existing(_) => panic!("key {key} was already taken"),
    }
}

async fn transaction_count(pool: &DbPool, gift: &GiftItem) -> i64 {
    sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM transactions WHERE gift_item_id = $1")
        .bind(gift.id)
        .fetch_one(pool)
        .await
        .expect("Failed to count transactions")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_inserts_with_one_key_create_one_transaction() {
    let Some((store, pool)) = setup_store().await else {
        return;
    };
    let gift = seed_gift(&pool, 5).await;
    let key = unique_key("double-click");

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let store = store.clone();
            let gift = gift.clone();
            let key = key.clone();
            tokio::spawn(async move {
                let now = Utc::now();
                store
                    .insert_pending_transaction(
                        new_transaction(&gift),
                        NewIdempotencyKey::new(key, json!({ "status": "pending" }), now),
                        now,
                    )
                    .await
            })
        })
        .collect();

    let mut created = Vec::new();
    let mut existing = Vec::new();
    for handle in handles {
        match handle.await.unwrap().unwrap() {
            InsertOutcome::Created(t) => created.push(t),
            InsertOutcome::Existing(t) => existing.push(t),
        }
    }

    assert_eq!(created.len(), 1);
    assert_eq!(existing.len(), 7);
    assert!(existing.iter().all(|t| t.id == created[0].id));
    assert_eq!(transaction_count(&pool, &gift).await, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn repeated_confirmation_moves_stock_once() {
    let Some((store, pool)) = setup_store().await else {
        return;
    };
    let gift = seed_gift(&pool, 3).await;
    let transaction = create_pending(&store, &gift, &unique_key("paid"), Utc::now()).await;
    let payload = json!({ "event_type": "CHARGE.PAID", "data": { "id": "CHAR_PG" } });

    let (a, b) = tokio::join!(
        store.confirm_and_decrement(transaction.id, "CHAR_PG", payload.clone(), Utc::now()),
        store.confirm_and_decrement(transaction.id, "CHAR_PG", payload.clone(), Utc::now()),
    );
    let outcomes = [a.unwrap(), b.unwrap()];

    let moved = outcomes
        .iter()
        .filter(|o| {
            matches!(
                o,
                ConfirmOutcome::Confirmed {
                    inventory_moved: true,
                    ..
                }
            )
        })
        .count();
    let repeats = outcomes
        .iter()
        .filter(|o| matches!(o, ConfirmOutcome::AlreadyConfirmed(_)))
        .count();
    assert_eq!(moved, 1);
    assert_eq!(repeats, 1);

    // A later redelivery is just as inert.
    let again = store
        .confirm_and_decrement(transaction.id, "CHAR_PG", payload, Utc::now())
        .await
        .unwrap();
    assert!(matches!(again, ConfirmOutcome::AlreadyConfirmed(_)));

    let reloaded = store.find_gift_item(gift.id).await.unwrap().unwrap();
    assert_eq!(reloaded.quantity_available, 2);
    assert_eq!(reloaded.quantity_sold, 1);

    let confirmed = store.find_transaction(transaction.id).await.unwrap().unwrap();
    assert!(confirmed.is_confirmed());
    assert_eq!(confirmed.gateway_transaction_id.as_deref(), Some("CHAR_PG"));
    assert_eq!(
        confirmed.gateway_response.unwrap()["webhooks"]
            .as_array()
            .unwrap()
            .len(),
        1
    );
}

#[tokio::test]
async fn confirmation_without_stock_never_goes_negative() {
    let Some((store, pool)) = setup_store().await else {
        return;
    };
    let gift = seed_gift(&pool, 0).await;
    let transaction = create_pending(&store, &gift, &unique_key("empty"), Utc::now()).await;

    let outcome = store
        .confirm_and_decrement(transaction.id, "CHAR_EMPTY", json!({}), Utc::now())
        .await
        .unwrap();

    assert!(matches!(
        outcome,
        ConfirmOutcome::Confirmed {
            inventory_moved: false,
            ..
        }
    ));
    let reloaded = store.find_gift_item(gift.id).await.unwrap().unwrap();
    assert_eq!(reloaded.quantity_available, 0);
    assert_eq!(reloaded.quantity_sold, 0);
}

#[tokio::test]
async fn decline_after_confirmation_is_ignored() {
    let Some((store, pool)) = setup_store().await else {
        return;
    };
    let gift = seed_gift(&pool, 2).await;
    let transaction = create_pending(&store, &gift, &unique_key("late"), Utc::now()).await;

    store
        .confirm_and_decrement(transaction.id, "CHAR_LATE", json!({}), Utc::now())
        .await
        .unwrap();
    let outcome = store
        .fail_from_webhook(transaction.id, "declined", json!({}))
        .await
        .unwrap();

    assert!(matches!(outcome, FailOutcome::AlreadySettled(_)));
    assert_eq!(
        store.find_gift_item(gift.id).await.unwrap().unwrap().quantity_available,
        1
    );
}

#[tokio::test]
async fn expired_key_is_replaced_and_live_key_kept() {
    let Some((store, pool)) = setup_store().await else {
        return;
    };
    let gift = seed_gift(&pool, 5).await;
    let key = unique_key("expiring");
    let now = Utc::now();

    let original = create_pending(&store, &gift, &key, now - Duration::hours(25)).await;
    assert!(store.find_idempotency_key(&key, now).await.unwrap().is_none());

    let replacement = create_pending(&store, &gift, &unique_key("other"), now).await;
    let record = store
        .store_idempotency_key(
            replacement.id,
            NewIdempotencyKey::new(&key, json!({ "status": "pending" }), now),
            now,
        )
        .await
        .unwrap();
    assert_eq!(record.transaction_id, replacement.id);
    assert_ne!(record.transaction_id, original.id);
    assert!(record.expires_at > now);

    let third = create_pending(&store, &gift, &unique_key("third"), now).await;
    let record = store
        .store_idempotency_key(
            third.id,
            NewIdempotencyKey::new(&key, json!({ "status": "pending" }), now),
            now,
        )
        .await
        .unwrap();
    assert_eq!(record.transaction_id, replacement.id);
}

#[tokio::test]
async fn expired_key_allows_a_new_transaction() {
    let Some((store, pool)) = setup_store().await else {
        return;
    };
    let gift = seed_gift(&pool, 5).await;
    let key = unique_key("reuse");
    let now = Utc::now();

    let old = create_pending(&store, &gift, &key, now - Duration::hours(25)).await;
    let fresh = create_pending(&store, &gift, &key, now).await;

    assert_ne!(old.id, fresh.id);
    let record = store.find_idempotency_key(&key, now).await.unwrap().unwrap();
    assert_eq!(record.transaction_id, fresh.id);
}

#[tokio::test]
async fn recorded_response_replaces_placeholder() {
    let Some((store, pool)) = setup_store().await else {
        return;
    };
    let gift = seed_gift(&pool, 1).await;
    let key = unique_key("response");
    create_pending(&store, &gift, &key, Utc::now()).await;

    store
        .record_idempotency_response(&key, json!({ "status": "failed" }))
        .await
        .unwrap();

    let record = store.find_idempotency_key(&key, Utc::now()).await.unwrap().unwrap();
    assert_eq!(record.response["status"], "failed");
}
