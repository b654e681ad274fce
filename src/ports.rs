//! Storage port for payment transactions.
//! Use cases depend on this trait; `adapters` provides the implementations.

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::{NewTransaction, StatusChange, Transaction, TransactionStatus, TransitionError};

#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("transaction not found: {0}")]
    NotFound(String),

    #[error("order reference already exists: {0}")]
    Conflict(String),

    #[error(transparent)]
    InvalidTransition(#[from] TransitionError),

    #[error("storage error: {0}")]
    Storage(String),
}

impl From<sqlx::Error> for RepositoryError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => RepositoryError::NotFound("row not found".to_string()),
            other => RepositoryError::Storage(other.to_string()),
        }
    }
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Result of `update_status`: the stored row after the call and what changed.
#[derive(Debug, Clone)]
pub struct StatusUpdate {
    pub transaction: Transaction,
    pub change: StatusChange,
}

#[async_trait]
pub trait TransactionRepository: Send + Sync {
    /// Fails with `Conflict` when the order reference is already taken.
    async fn create(&self, input: NewTransaction) -> RepositoryResult<Transaction>;

    async fn find_by_id(&self, id: Uuid) -> RepositoryResult<Option<Transaction>>;

    async fn find_by_reference(&self, order_reference: &str) -> RepositoryResult<Option<Transaction>>;

    async fn find_by_tracking_id(&self, tracking_id: &str) -> RepositoryResult<Option<Transaction>>;

    /// Atomically applies the forward-only status rules to one row.
    async fn update_status(
        &self,
        id: Uuid,
        status: TransactionStatus,
        tracking_id: Option<&str>,
    ) -> RepositoryResult<StatusUpdate>;

    /// Records the gateway confirmation code unless one is already stored.
    async fn record_confirmation(&self, id: Uuid, code: &str) -> RepositoryResult<()>;

    async fn ping(&self) -> RepositoryResult<()>;
}
