//! Apply notification use case.
//! Maps a verified webhook onto the matching transaction. Replays are
//! harmless: re-applying a status the record already has changes nothing.

use std::sync::Arc;

use super::reconcile_payment::refresh_from_gateway;
use super::PaymentError;
use crate::domain::{StatusChange, Transaction};
use crate::gateway::GatewayClient;
use crate::ports::{StatusUpdate, TransactionRepository};
use crate::webhook::WebhookNotification;

pub struct ApplyNotification {
    transactions: Arc<dyn TransactionRepository>,
    gateway: GatewayClient,
}

impl ApplyNotification {
    pub fn new(transactions: Arc<dyn TransactionRepository>, gateway: GatewayClient) -> Self {
        Self {
            transactions,
            gateway,
        }
    }

    pub async fn execute(&self, notification: &WebhookNotification) -> Result<StatusUpdate, PaymentError> {
        let reported = notification.reported_status()?;
        let transaction = self.locate(notification).await?;

        let update = match reported {
            Some(status) => {
                self.transactions
                    .update_status(transaction.id, status, notification.tracking_id.as_deref())
                    .await?
            }
            None => {
                let tracking_id = notification
                    .tracking_id
                    .clone()
                    .or_else(|| transaction.gateway_tracking_id.clone())
                    .ok_or_else(|| {
                        PaymentError::StatusUnavailable(transaction.order_reference.clone())
                    })?;

                refresh_from_gateway(self.transactions.as_ref(), &self.gateway, &transaction, &tracking_id)
                    .await?
            }
        };

        match update.change {
            StatusChange::Applied => tracing::info!(
                order_reference = %update.transaction.order_reference,
                status = %update.transaction.status,
                "webhook applied"
            ),
            StatusChange::Unchanged => tracing::debug!(
                order_reference = %update.transaction.order_reference,
                status = %update.transaction.status,
                "webhook replay, nothing to change"
            ),
            StatusChange::IgnoredRegression => tracing::warn!(
                order_reference = %update.transaction.order_reference,
                stored = %update.transaction.status,
                reported = ?notification.status,
                "ignoring webhook that would regress status"
            ),
        }

        Ok(update)
    }

    async fn locate(&self, notification: &WebhookNotification) -> Result<Transaction, PaymentError> {
        if let Some(reference) = notification.order_reference.as_deref() {
            if let Some(tx) = self.transactions.find_by_reference(reference).await? {
                return Ok(tx);
            }
        }

        if let Some(tracking_id) = notification.tracking_id.as_deref() {
            if let Some(tx) = self.transactions.find_by_tracking_id(tracking_id).await? {
                return Ok(tx);
            }
        }

        let described = notification
            .order_reference
            .as_deref()
            .or(notification.tracking_id.as_deref())
            .unwrap_or_default()
            .to_string();

        tracing::warn!(reference = %described, "webhook for unknown transaction");
        Err(PaymentError::TransactionNotFound(described))
    }
}
