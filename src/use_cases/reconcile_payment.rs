//! Reconcile payment use case.
//! Pulls the current status from the gateway and folds it into the local
//! record under the forward-only rules.

use std::sync::Arc;

use super::PaymentError;
use crate::domain::{StatusChange, Transaction};
use crate::gateway::GatewayClient;
use crate::ports::{StatusUpdate, TransactionRepository};

pub struct ReconcilePayment {
    transactions: Arc<dyn TransactionRepository>,
    gateway: GatewayClient,
}

impl ReconcilePayment {
    pub fn new(transactions: Arc<dyn TransactionRepository>, gateway: GatewayClient) -> Self {
        Self {
            transactions,
            gateway,
        }
    }

    pub async fn execute(&self, order_reference: &str) -> Result<StatusUpdate, PaymentError> {
        let transaction = self
            .transactions
            .find_by_reference(order_reference)
            .await?
            .ok_or_else(|| PaymentError::TransactionNotFound(order_reference.to_string()))?;

        let Some(tracking_id) = transaction.gateway_tracking_id.clone() else {
            // Never reached the gateway; there is nothing to ask about.
            return Ok(StatusUpdate {
                transaction,
                change: StatusChange::Unchanged,
            });
        };

        refresh_from_gateway(self.transactions.as_ref(), &self.gateway, &transaction, &tracking_id).await
    }
}

/// Queries the gateway for `tracking_id` and applies the reported status.
pub(crate) async fn refresh_from_gateway(
    transactions: &dyn TransactionRepository,
    gateway: &GatewayClient,
    transaction: &Transaction,
    tracking_id: &str,
) -> Result<StatusUpdate, PaymentError> {
    let token = gateway.request_token().await?;
    let result = gateway.query_status(&token, tracking_id).await?;

    let status = result
        .status
        .ok_or_else(|| PaymentError::StatusUnavailable(tracking_id.to_string()))?;

    if let Some(code) = result.confirmation_code.as_deref() {
        transactions.record_confirmation(transaction.id, code).await?;
    }

    let mut update = transactions
        .update_status(transaction.id, status, Some(tracking_id))
        .await?;

    if update.transaction.confirmation_code.is_none() {
        update.transaction.confirmation_code = result.confirmation_code;
    }

    tracing::info!(
        order_reference = %transaction.order_reference,
        tracking_id = %tracking_id,
        reported = %status,
        change = ?update.change,
        "status reconciled with gateway"
    );

    Ok(update)
}
