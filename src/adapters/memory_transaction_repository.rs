//! In-memory implementation of TransactionRepository, used by `serve --in-memory`
//! and the HTTP-level tests.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use crate::domain::{NewTransaction, Transaction, TransactionStatus};
use crate::ports::{RepositoryError, RepositoryResult, StatusUpdate, TransactionRepository};

#[derive(Default)]
pub struct InMemoryTransactionRepository {
    rows: Mutex<HashMap<Uuid, Transaction>>,
}

impl InMemoryTransactionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn rows(&self) -> RepositoryResult<MutexGuard<'_, HashMap<Uuid, Transaction>>> {
        self.rows
            .lock()
            .map_err(|_| RepositoryError::Storage("transaction map lock poisoned".to_string()))
    }

    fn find_where<F>(&self, predicate: F) -> RepositoryResult<Option<Transaction>>
    where
        F: Fn(&Transaction) -> bool,
    {
        Ok(self.rows()?.values().find(|tx| predicate(tx)).cloned())
    }
}

#[async_trait]
impl TransactionRepository for InMemoryTransactionRepository {
    async fn create(&self, input: NewTransaction) -> RepositoryResult<Transaction> {
        let mut rows = self.rows()?;
        if rows
            .values()
            .any(|tx| tx.order_reference == input.order_reference)
        {
            return Err(RepositoryError::Conflict(input.order_reference));
        }

        let tx = Transaction::new(input);
        rows.insert(tx.id, tx.clone());
        Ok(tx)
    }

    async fn find_by_id(&self, id: Uuid) -> RepositoryResult<Option<Transaction>> {
        Ok(self.rows()?.get(&id).cloned())
    }

    async fn find_by_reference(&self, order_reference: &str) -> RepositoryResult<Option<Transaction>> {
        self.find_where(|tx| tx.order_reference == order_reference)
    }

    async fn find_by_tracking_id(&self, tracking_id: &str) -> RepositoryResult<Option<Transaction>> {
        self.find_where(|tx| tx.gateway_tracking_id.as_deref() == Some(tracking_id))
    }

    async fn update_status(
        &self,
        id: Uuid,
        status: TransactionStatus,
        tracking_id: Option<&str>,
    ) -> RepositoryResult<StatusUpdate> {
        let mut rows = self.rows()?;
        let stored = rows
            .get_mut(&id)
            .ok_or_else(|| RepositoryError::NotFound(id.to_string()))?;

        // Work on a copy so a rejected transition leaves the row as it was.
        let mut transaction = stored.clone();
        let change = transaction.apply_status(status, tracking_id, Utc::now())?;
        *stored = transaction.clone();

        Ok(StatusUpdate { transaction, change })
    }

    async fn record_confirmation(&self, id: Uuid, code: &str) -> RepositoryResult<()> {
        let mut rows = self.rows()?;
        let stored = rows
            .get_mut(&id)
            .ok_or_else(|| RepositoryError::NotFound(id.to_string()))?;

        if stored.confirmation_code.is_none() {
            stored.confirmation_code = Some(code.to_string());
        }
        Ok(())
    }

    async fn ping(&self) -> RepositoryResult<()> {
        self.rows().map(|_| ())
    }
}
