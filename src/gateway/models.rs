//! Wire types for the payment aggregator API.

use serde::{Deserialize, Serialize};

use crate::domain::TransactionStatus;

/// Error object the aggregator embeds in otherwise successful responses.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiError {
    pub error_type: Option<String>,
    pub code: Option<String>,
    pub message: Option<String>,
}

impl ApiError {
    /// Successful responses carry an error object whose fields are all null.
    pub fn is_empty(&self) -> bool {
        [&self.error_type, &self.code, &self.message]
            .iter()
            .all(|field| field.as_deref().map_or(true, str::is_empty))
    }

    pub fn describe(&self) -> String {
        self.message
            .clone()
            .or_else(|| self.code.clone())
            .or_else(|| self.error_type.clone())
            .unwrap_or_else(|| "unspecified gateway error".to_string())
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct TokenRequest<'a> {
    pub consumer_key: &'a str,
    pub consumer_secret: &'a str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TokenResponse {
    pub token: Option<String>,
    #[serde(rename = "expiryDate")]
    pub expiry_date: Option<String>,
    pub error: Option<ApiError>,
    pub message: Option<String>,
}

/// Short-lived bearer token. Expiry is informational; each flow
/// re-authenticates.
#[derive(Debug, Clone)]
pub struct AccessToken {
    pub token: String,
    pub expires_at: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BillingAddress {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
}

/// Order details posted to `SubmitOrderRequest`. `id` is the merchant's
/// order reference.
#[derive(Debug, Clone, Serialize)]
pub struct OrderRequest {
    pub id: String,
    pub currency: String,
    pub amount: f64,
    pub description: String,
    pub callback_url: String,
    pub notification_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect_mode: Option<String>,
    pub billing_address: BillingAddress,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SubmitOrderResponse {
    pub order_tracking_id: Option<String>,
    pub merchant_reference: Option<String>,
    pub redirect_url: Option<String>,
    pub error: Option<ApiError>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmittedOrder {
    pub tracking_id: String,
    pub redirect_url: String,
    pub merchant_reference: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct StatusResponse {
    pub payment_method: Option<String>,
    pub amount: Option<f64>,
    pub confirmation_code: Option<String>,
    pub payment_status_description: Option<String>,
    pub description: Option<String>,
    pub status_code: Option<i32>,
    pub merchant_reference: Option<String>,
    pub currency: Option<String>,
    pub error: Option<ApiError>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatusResult {
    pub tracking_id: String,
    /// `None` when the gateway reported a status this service does not model.
    pub status: Option<TransactionStatus>,
    pub status_code: Option<i32>,
    pub description: Option<String>,
    pub payment_method: Option<String>,
    pub confirmation_code: Option<String>,
    pub merchant_reference: Option<String>,
    pub amount: Option<f64>,
    pub currency: Option<String>,
}

impl StatusResult {
    pub(crate) fn from_response(tracking_id: &str, response: StatusResponse) -> Self {
        let status = response
            .status_code
            .and_then(status_from_code)
            .or_else(|| {
                response
                    .payment_status_description
                    .as_deref()
                    .and_then(TransactionStatus::from_gateway_label)
            });

        Self {
            tracking_id: tracking_id.to_string(),
            status,
            status_code: response.status_code,
            description: response.description.or(response.payment_status_description),
            payment_method: response.payment_method,
            confirmation_code: response.confirmation_code.filter(|code| !code.is_empty()),
            merchant_reference: response.merchant_reference,
            amount: response.amount,
            currency: response.currency,
        }
    }
}

fn status_from_code(code: i32) -> Option<TransactionStatus> {
    match code {
        0 => Some(TransactionStatus::Pending),
        1 => Some(TransactionStatus::Completed),
        2 => Some(TransactionStatus::Failed),
        3 => Some(TransactionStatus::Cancelled),
        _ => None,
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct RegisterIpnRequest<'a> {
    pub url: &'a str,
    pub ipn_notification_type: &'a str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RegisterIpnResponse {
    pub ipn_id: Option<String>,
    pub error: Option<ApiError>,
}
