//! Payment flows composed from the gateway client and the transaction store.

pub mod apply_notification;
pub mod initiate_payment;
pub mod reconcile_payment;

pub use apply_notification::ApplyNotification;
pub use initiate_payment::{InitiatePayment, InitiatePaymentInput, InitiatedPayment};
pub use reconcile_payment::ReconcilePayment;

use thiserror::Error;

use crate::error::AppError;
use crate::gateway::GatewayError;
use crate::ports::RepositoryError;
use crate::webhook::NotificationError;

#[derive(Error, Debug)]
pub enum PaymentError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error(transparent)]
    InvalidNotification(#[from] NotificationError),

    #[error("no transaction matches {0}")]
    TransactionNotFound(String),

    #[error("gateway did not report a usable status for {0}")]
    StatusUnavailable(String),
}

impl From<PaymentError> for AppError {
    fn from(err: PaymentError) -> Self {
        match err {
            PaymentError::Repository(e) => e.into(),
            PaymentError::Gateway(e) => e.into(),
            PaymentError::InvalidNotification(e) => e.into(),
            PaymentError::TransactionNotFound(what) => {
                AppError::NotFound(format!("no transaction matches {}", what))
            }
            PaymentError::StatusUnavailable(what) => AppError::Gateway(format!(
                "gateway did not report a usable status for {}",
                what
            )),
        }
    }
}
