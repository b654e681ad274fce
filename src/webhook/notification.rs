use serde::Deserialize;
use thiserror::Error;

use crate::domain::TransactionStatus;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum NotificationError {
    #[error("malformed notification body: {0}")]
    Malformed(String),
    #[error("notification must carry an order reference or a tracking id")]
    MissingIdentifier,
    #[error("unknown status '{0}'")]
    UnknownStatus(String),
}

/// Status-change notification posted by the gateway.
///
/// Accepts both the local field names and the aggregator's IPN names
/// (`OrderMerchantReference`, `OrderTrackingId`). IPNs usually carry no
/// status, in which case it has to be queried.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookNotification {
    #[serde(default, alias = "orderRef", alias = "OrderMerchantReference")]
    pub order_reference: Option<String>,
    #[serde(default, alias = "trackingId", alias = "OrderTrackingId")]
    pub tracking_id: Option<String>,
    #[serde(default, alias = "payment_status_description")]
    pub status: Option<String>,
}

impl WebhookNotification {
    pub fn parse(raw_body: &[u8]) -> Result<Self, NotificationError> {
        let mut notification: WebhookNotification = serde_json::from_slice(raw_body)
            .map_err(|e| NotificationError::Malformed(e.to_string()))?;

        notification.order_reference = non_empty(notification.order_reference);
        notification.tracking_id = non_empty(notification.tracking_id);
        notification.status = non_empty(notification.status);

        if notification.order_reference.is_none() && notification.tracking_id.is_none() {
            return Err(NotificationError::MissingIdentifier);
        }

        Ok(notification)
    }

    pub fn reported_status(&self) -> Result<Option<TransactionStatus>, NotificationError> {
        match self.status.as_deref() {
            None => Ok(None),
            Some(label) => TransactionStatus::from_gateway_label(label)
                .map(Some)
                .ok_or_else(|| NotificationError::UnknownStatus(label.to_string())),
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
