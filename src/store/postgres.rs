//! PostgreSQL-backed `PaymentStore`.
//!
//! # Atomicity Guarantees
//!
//! - Guarded inserts take a transaction-scoped advisory lock on the
//!   idempotency key, so two requests with the same key run one after the
//!   other and the second sees the first's committed row. The unique index
//!   on `idempotency_keys.key` is the backstop.
//! - Confirmations lock the transaction row `FOR UPDATE` and move stock with
//!   a single conditional `UPDATE`, never a read-modify-write.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

use super::{
    ConfirmOutcome, FailOutcome, GatewayResult, InsertOutcome, PaymentStore,
    merge_gateway_response, merge_webhook_payload,
};
use crate::{
    db::DbPool,
    error::AppError,
    models::{
        gift_item::GiftItem,
        idempotency_key::{IdempotencyKey, NewIdempotencyKey},
        registry_config::GiftRegistryConfig,
        transaction::{NewTransaction, Transaction, TransactionStatus},
    },
};

#[derive(Clone)]
pub struct PgPaymentStore {
    pool: DbPool,
}

impl PgPaymentStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn transaction_by_key(
        &self,
        key: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Transaction>, AppError> {
        let transaction = sqlx::query_as::<_, Transaction>(
            r#"
            SELECT t.*
            FROM idempotency_keys k
            JOIN transactions t ON t.id = k.transaction_id
            WHERE k.key = $1 AND k.expires_at > $2
            "#,
        )
        .bind(key)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        Ok(transaction)
    }
}

#[async_trait]
impl PaymentStore for PgPaymentStore {
    async fn ping(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn find_gift_item(&self, id: Uuid) -> Result<Option<GiftItem>, AppError> {
        let item = sqlx::query_as::<_, GiftItem>("SELECT * FROM gift_items WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(item)
    }

    async fn find_registry_config(
        &self,
        wedding_id: Uuid,
    ) -> Result<Option<GiftRegistryConfig>, AppError> {
        let config = sqlx::query_as::<_, GiftRegistryConfig>(
            "SELECT * FROM gift_registry_configs WHERE wedding_id = $1",
        )
        .bind(wedding_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(config)
    }

    async fn find_transaction(&self, id: Uuid) -> Result<Option<Transaction>, AppError> {
        let transaction = sqlx::query_as::<_, Transaction>("SELECT * FROM transactions WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(transaction)
    }

    async fn find_transaction_by_internal_id(
        &self,
        internal_id: &str,
    ) -> Result<Option<Transaction>, AppError> {
        let transaction =
            sqlx::query_as::<_, Transaction>("SELECT * FROM transactions WHERE internal_id = $1")
                .bind(internal_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(transaction)
    }

    async fn find_transaction_by_gateway_id(
        &self,
        gateway_transaction_id: &str,
    ) -> Result<Option<Transaction>, AppError> {
        let transaction = sqlx::query_as::<_, Transaction>(
            "SELECT * FROM transactions WHERE gateway_transaction_id = $1",
        )
        .bind(gateway_transaction_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(transaction)
    }

    async fn find_idempotency_key(
        &self,
        key: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<IdempotencyKey>, AppError> {
        let record = sqlx::query_as::<_, IdempotencyKey>(
            "SELECT * FROM idempotency_keys WHERE key = $1 AND expires_at > $2",
        )
        .bind(key)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;
        Ok(record)
    }

    async fn store_idempotency_key(
        &self,
        transaction_id: Uuid,
        key: NewIdempotencyKey,
        now: DateTime<Utc>,
    ) -> Result<IdempotencyKey, AppError> {
        // Replaces an expired record, leaves a live one alone.
        let inserted = sqlx::query_as::<_, IdempotencyKey>(
            r#"
            INSERT INTO idempotency_keys (key, transaction_id, response, expires_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (key) DO UPDATE
            SET transaction_id = EXCLUDED.transaction_id,
                response = EXCLUDED.response,
                expires_at = EXCLUDED.expires_at,
                created_at = NOW()
            WHERE idempotency_keys.expires_at <= $5
            RETURNING *
            "#,
        )
        .bind(&key.key)
        .bind(transaction_id)
        .bind(&key.response)
        .bind(key.expires_at)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(record) = inserted {
            return Ok(record);
        }

        let existing = sqlx::query_as::<_, IdempotencyKey>(
            "SELECT * FROM idempotency_keys WHERE key = $1",
        )
        .bind(&key.key)
        .fetch_one(&self.pool)
        .await?;
        Ok(existing)
    }

    async fn record_idempotency_response(&self, key: &str, response: Value) -> Result<(), AppError> {
        sqlx::query("UPDATE idempotency_keys SET response = $2 WHERE key = $1")
            .bind(key)
            .bind(&response)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_expired_idempotency_keys(&self, now: DateTime<Utc>) -> Result<u64, AppError> {
        let deleted = sqlx::query("DELETE FROM idempotency_keys WHERE expires_at <= $1")
            .bind(now)
            .execute(&self.pool)
            .await?
            .rows_affected();
        Ok(deleted)
    }

    async fn insert_pending_transaction(
        &self,
        transaction: NewTransaction,
        key: NewIdempotencyKey,
        now: DateTime<Utc>,
    ) -> Result<InsertOutcome, AppError> {
        let mut tx = self.pool.begin().await?;

        // Serialise requests carrying the same key until commit.
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(&key.key)
            .execute(&mut *tx)
            .await?;

        let existing = sqlx::query_as::<_, Transaction>(
            r#"
            SELECT t.*
            FROM idempotency_keys k
            JOIN transactions t ON t.id = k.transaction_id
            WHERE k.key = $1 AND k.expires_at > $2
            "#,
        )
        .bind(&key.key)
        .bind(now)
        .fetch_optional(&mut *tx)
        .await?;

        if let Some(existing) = existing {
            tx.commit().await?;
            return Ok(InsertOutcome::Existing(existing));
        }

        // An expired record may still hold the unique key.
        sqlx::query("DELETE FROM idempotency_keys WHERE key = $1")
            .bind(&key.key)
            .execute(&mut *tx)
            .await?;

        let created = sqlx::query_as::<_, Transaction>(
            r#"
            INSERT INTO transactions (
                internal_id,
                wedding_id,
                gift_item_id,
                original_unit_price,
                fee_basis_points,
                fee_modality,
                fee_amount,
                gross_amount,
                net_amount_couple,
                platform_amount,
                payment_method,
                status
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, 'pending')
            RETURNING *
            "#,
        )
        .bind(&transaction.internal_id)
        .bind(transaction.wedding_id)
        .bind(transaction.gift_item_id)
        .bind(transaction.original_unit_price)
        .bind(transaction.fee_basis_points)
        .bind(transaction.fee_modality.as_str())
        .bind(transaction.amounts.fee_amount)
        .bind(transaction.amounts.gross_amount)
        .bind(transaction.amounts.net_amount_couple)
        .bind(transaction.amounts.platform_amount)
        .bind(transaction.payment_method.as_str())
        .fetch_one(&mut *tx)
        .await?;

        let stored_key = sqlx::query(
            r#"
            INSERT INTO idempotency_keys (key, transaction_id, response, expires_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(&key.key)
        .bind(created.id)
        .bind(&key.response)
        .bind(key.expires_at)
        .execute(&mut *tx)
        .await;

        match stored_key {
            Ok(_) => {
                tx.commit().await?;
                Ok(InsertOutcome::Created(created))
            }
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                // Lost the race despite the lock; the winner's row is committed.
                tx.rollback().await?;
                match self.transaction_by_key(&key.key, now).await? {
                    Some(existing) => Ok(InsertOutcome::Existing(existing)),
                    None => Err(AppError::Database(sqlx::Error::Database(db_err))),
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn record_gateway_result(
        &self,
        id: Uuid,
        result: GatewayResult,
    ) -> Result<Transaction, AppError> {
        let mut tx = self.pool.begin().await?;

        let current = sqlx::query_as::<_, Transaction>(
            "SELECT * FROM transactions WHERE id = $1 FOR UPDATE",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(AppError::NotFound("Transaction"))?;

        let settle = current.status == TransactionStatus::Pending && current.confirmed_at.is_none();
        let status = if settle { result.status } else { current.status };
        let error_message = if settle && result.status == TransactionStatus::Failed {
            result.error_message
        } else {
            current.error_message.clone()
        };
        let response = merge_gateway_response(current.gateway_response, result.response);

        let updated = sqlx::query_as::<_, Transaction>(
            r#"
            UPDATE transactions
            SET gateway_transaction_id = COALESCE(gateway_transaction_id, $2),
                gateway_response = $3,
                status = $4,
                error_message = $5,
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&result.gateway_transaction_id)
        .bind(&response)
        .bind(status.as_str())
        .bind(error_message)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(updated)
    }

    async fn mark_failed(&self, id: Uuid, message: &str) -> Result<Transaction, AppError> {
        let updated = sqlx::query_as::<_, Transaction>(
            r#"
            UPDATE transactions
            SET status = 'failed',
                error_message = $2,
                updated_at = NOW()
            WHERE id = $1 AND status = 'pending' AND confirmed_at IS NULL
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(message)
        .fetch_optional(&self.pool)
        .await?;

        match updated {
            Some(transaction) => Ok(transaction),
            None => self
                .find_transaction(id)
                .await?
                .ok_or(AppError::NotFound("Transaction")),
        }
    }

    async fn confirm_and_decrement(
        &self,
        id: Uuid,
        gateway_transaction_id: &str,
        payload: Value,
        now: DateTime<Utc>,
    ) -> Result<ConfirmOutcome, AppError> {
        let mut tx = self.pool.begin().await?;

        // Row lock: concurrent deliveries of the same event queue up here.
        let Some(current) = sqlx::query_as::<_, Transaction>(
            "SELECT * FROM transactions WHERE id = $1 FOR UPDATE",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        else {
            tx.rollback().await?;
            return Ok(ConfirmOutcome::NotFound);
        };

        if current.is_confirmed() {
            tx.rollback().await?;
            return Ok(ConfirmOutcome::AlreadyConfirmed(current));
        }
        if matches!(
            current.status,
            TransactionStatus::Failed | TransactionStatus::Refunded
        ) {
            tx.rollback().await?;
            return Ok(ConfirmOutcome::Terminal(current));
        }

        let response = merge_webhook_payload(current.gateway_response, payload);

        let transaction = sqlx::query_as::<_, Transaction>(
            r#"
            UPDATE transactions
            SET status = 'confirmed',
                confirmed_at = $2,
                gateway_transaction_id = COALESCE(gateway_transaction_id, $3),
                gateway_response = $4,
                error_message = NULL,
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(now)
        .bind(gateway_transaction_id)
        .bind(&response)
        .fetch_one(&mut *tx)
        .await?;

        let moved = sqlx::query(
            r#"
            UPDATE gift_items
            SET quantity_available = quantity_available - 1,
                quantity_sold = quantity_sold + 1,
                updated_at = NOW()
            WHERE id = $1 AND quantity_available > 0
            "#,
        )
        .bind(transaction.gift_item_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        tx.commit().await?;

        Ok(ConfirmOutcome::Confirmed {
            transaction,
            inventory_moved: moved == 1,
        })
    }

    async fn fail_from_webhook(
        &self,
        id: Uuid,
        message: &str,
        payload: Value,
    ) -> Result<FailOutcome, AppError> {
        let mut tx = self.pool.begin().await?;

        let Some(current) = sqlx::query_as::<_, Transaction>(
            "SELECT * FROM transactions WHERE id = $1 FOR UPDATE",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        else {
            tx.rollback().await?;
            return Ok(FailOutcome::NotFound);
        };

        if current.status != TransactionStatus::Pending || current.confirmed_at.is_some() {
            tx.rollback().await?;
            return Ok(FailOutcome::AlreadySettled(current));
        }

        let response = merge_webhook_payload(current.gateway_response, payload);

        let transaction = sqlx::query_as::<_, Transaction>(
            r#"
            UPDATE transactions
            SET status = 'failed',
                error_message = $2,
                gateway_response = $3,
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(message)
        .bind(&response)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(FailOutcome::Failed(transaction))
    }
}
