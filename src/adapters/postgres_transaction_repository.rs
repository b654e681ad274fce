//! Postgres implementation of TransactionRepository.

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::{NewTransaction, StatusChange, Transaction, TransactionStatus};
use crate::ports::{RepositoryError, RepositoryResult, StatusUpdate, TransactionRepository};

/// Postgres-backed transaction repository.
#[derive(Clone)]
pub struct PostgresTransactionRepository {
    pool: PgPool,
}

impl PostgresTransactionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TransactionRepository for PostgresTransactionRepository {
    async fn create(&self, input: NewTransaction) -> RepositoryResult<Transaction> {
        let tx = Transaction::new(input);

        let row = sqlx::query_as::<_, TransactionRow>(
            r#"
            INSERT INTO transactions (
                id, order_reference, amount, currency, payment_method, status,
                gateway_tracking_id, confirmation_code, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING id, order_reference, amount, currency, payment_method, status,
                gateway_tracking_id, confirmation_code, created_at, updated_at
            "#,
        )
        .bind(tx.id)
        .bind(&tx.order_reference)
        .bind(&tx.amount)
        .bind(&tx.currency)
        .bind(tx.payment_method.as_str())
        .bind(tx.status.as_str())
        .bind(&tx.gateway_tracking_id)
        .bind(&tx.confirmation_code)
        .bind(tx.created_at)
        .bind(tx.updated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                RepositoryError::Conflict(tx.order_reference.clone())
            }
            _ => RepositoryError::from(e),
        })?;

        row.into_domain()
    }

    async fn find_by_id(&self, id: Uuid) -> RepositoryResult<Option<Transaction>> {
        let row = sqlx::query_as::<_, TransactionRow>("SELECT * FROM transactions WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(TransactionRow::into_domain).transpose()
    }

    async fn find_by_reference(&self, order_reference: &str) -> RepositoryResult<Option<Transaction>> {
        let row = sqlx::query_as::<_, TransactionRow>(
            "SELECT * FROM transactions WHERE order_reference = $1",
        )
        .bind(order_reference)
        .fetch_optional(&self.pool)
        .await?;

        row.map(TransactionRow::into_domain).transpose()
    }

    async fn find_by_tracking_id(&self, tracking_id: &str) -> RepositoryResult<Option<Transaction>> {
        let row = sqlx::query_as::<_, TransactionRow>(
            "SELECT * FROM transactions WHERE gateway_tracking_id = $1",
        )
        .bind(tracking_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(TransactionRow::into_domain).transpose()
    }

    async fn update_status(
        &self,
        id: Uuid,
        status: TransactionStatus,
        tracking_id: Option<&str>,
    ) -> RepositoryResult<StatusUpdate> {
        let mut db_tx = self.pool.begin().await?;

        // Row lock serializes concurrent webhook and reconcile updates.
        let row = sqlx::query_as::<_, TransactionRow>(
            "SELECT * FROM transactions WHERE id = $1 FOR UPDATE",
        )
        .bind(id)
        .fetch_optional(&mut *db_tx)
        .await?
        .ok_or_else(|| RepositoryError::NotFound(id.to_string()))?;

        let mut transaction = row.into_domain()?;
        let change = transaction.apply_status(status, tracking_id, Utc::now())?;

        if change == StatusChange::Applied {
            let updated = sqlx::query_as::<_, TransactionRow>(
                r#"
                UPDATE transactions
                SET status = $2, gateway_tracking_id = $3, updated_at = $4
                WHERE id = $1
                RETURNING *
                "#,
            )
            .bind(transaction.id)
            .bind(transaction.status.as_str())
            .bind(&transaction.gateway_tracking_id)
            .bind(transaction.updated_at)
            .fetch_one(&mut *db_tx)
            .await
            .map_err(|e| match &e {
                sqlx::Error::Database(db) if db.is_unique_violation() => RepositoryError::Storage(format!(
                    "tracking id {} already belongs to another transaction",
                    transaction.gateway_tracking_id.as_deref().unwrap_or_default()
                )),
                _ => RepositoryError::from(e),
            })?;

            // Re-read so timestamps carry the database's precision.
            transaction = updated.into_domain()?;
        }

        db_tx.commit().await?;

        Ok(StatusUpdate { transaction, change })
    }

    async fn record_confirmation(&self, id: Uuid, code: &str) -> RepositoryResult<()> {
        sqlx::query(
            "UPDATE transactions SET confirmation_code = $2 WHERE id = $1 AND confirmation_code IS NULL",
        )
        .bind(id)
        .bind(code)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn ping(&self) -> RepositoryResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

/// Internal row type for SQLx. Not exposed outside the adapter.
#[derive(Debug, sqlx::FromRow)]
struct TransactionRow {
    id: Uuid,
    order_reference: String,
    amount: BigDecimal,
    currency: String,
    payment_method: String,
    status: String,
    gateway_tracking_id: Option<String>,
    confirmation_code: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TransactionRow {
    fn into_domain(self) -> RepositoryResult<Transaction> {
        Ok(Transaction {
            id: self.id,
            order_reference: self.order_reference,
            amount: self.amount,
            currency: self.currency,
            payment_method: self.payment_method.parse().map_err(RepositoryError::Storage)?,
            status: self.status.parse().map_err(RepositoryError::Storage)?,
            gateway_tracking_id: self.gateway_tracking_id,
            confirmation_code: self.confirmation_code,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}
