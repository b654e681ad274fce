//! Initiate payment use case.
//! Opens a local transaction, submits the order to the gateway and records
//! the tracking id it hands back.

use bigdecimal::{BigDecimal, ToPrimitive};
use std::sync::Arc;

use super::PaymentError;
use crate::domain::{NewTransaction, PaymentMethod, Transaction, TransactionStatus};
use crate::gateway::{BillingAddress, GatewayClient, OrderRequest};
use crate::ports::TransactionRepository;

/// Validated input for the InitiatePayment use case.
#[derive(Debug, Clone)]
pub struct InitiatePaymentInput {
    pub order_reference: String,
    pub amount: BigDecimal,
    pub currency: String,
    pub payment_method: PaymentMethod,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub country_code: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone)]
pub struct InitiatedPayment {
    pub transaction: Transaction,
    pub redirect_url: String,
}

pub struct InitiatePayment {
    transactions: Arc<dyn TransactionRepository>,
    gateway: GatewayClient,
    callback_url: String,
    notification_id: String,
}

impl InitiatePayment {
    pub fn new(
        transactions: Arc<dyn TransactionRepository>,
        gateway: GatewayClient,
        callback_url: String,
        notification_id: String,
    ) -> Self {
        Self {
            transactions,
            gateway,
            callback_url,
            notification_id,
        }
    }

    pub async fn execute(&self, input: InitiatePaymentInput) -> Result<InitiatedPayment, PaymentError> {
        let transaction = self
            .transactions
            .create(NewTransaction {
                order_reference: input.order_reference.clone(),
                amount: input.amount.clone(),
                currency: input.currency.clone(),
                payment_method: input.payment_method,
            })
            .await?;

        tracing::info!(
            order_reference = %transaction.order_reference,
            transaction_id = %transaction.id,
            method = input.payment_method.as_str(),
            "payment attempt opened"
        );

        let order = self.order_request(&input);
        let submitted = match self.submit(&order).await {
            Ok(submitted) => submitted,
            Err(PaymentError::Gateway(err)) if err.is_definitive_rejection() => {
                let err = PaymentError::Gateway(err);
                self.mark_failed(&transaction, &err).await;
                return Err(err);
            }
            Err(err) => {
                // The order may exist upstream; a webhook or reconcile settles it.
                tracing::warn!(
                    order_reference = %transaction.order_reference,
                    error = %err,
                    "gateway outcome unknown, leaving attempt pending"
                );
                return Err(err);
            }
        };

        let update = self
            .transactions
            .update_status(
                transaction.id,
                TransactionStatus::Submitted,
                Some(&submitted.tracking_id),
            )
            .await?;

        Ok(InitiatedPayment {
            transaction: update.transaction,
            redirect_url: submitted.redirect_url,
        })
    }

    async fn submit(&self, order: &OrderRequest) -> Result<crate::gateway::SubmittedOrder, PaymentError> {
        let token = self.gateway.request_token().await?;
        Ok(self.gateway.submit_order(&token, order).await?)
    }

    async fn mark_failed(&self, transaction: &Transaction, cause: &PaymentError) {
        tracing::warn!(
            order_reference = %transaction.order_reference,
            error = %cause,
            "gateway did not accept order, marking attempt failed"
        );

        if let Err(e) = self
            .transactions
            .update_status(transaction.id, TransactionStatus::Failed, None)
            .await
        {
            tracing::error!(
                order_reference = %transaction.order_reference,
                error = %e,
                "could not mark attempt failed"
            );
        }
    }

    fn order_request(&self, input: &InitiatePaymentInput) -> OrderRequest {
        OrderRequest {
            id: input.order_reference.clone(),
            currency: input.currency.clone(),
            amount: input.amount.to_f64().unwrap_or_default(),
            description: input
                .description
                .clone()
                .unwrap_or_else(|| format!("Order {}", input.order_reference)),
            callback_url: self.callback_url.clone(),
            notification_id: self.notification_id.clone(),
            redirect_mode: None,
            billing_address: BillingAddress {
                phone_number: input.phone.clone(),
                email_address: input.email.clone(),
                country_code: input.country_code.clone(),
                first_name: input.first_name.clone(),
                last_name: input.last_name.clone(),
            },
        }
    }
}
