use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    response::IntoResponse,
    Json,
};
use serde::Serialize;

use crate::domain::{StatusChange, TransactionStatus};
use crate::error::AppError;
use crate::use_cases::ApplyNotification;
use crate::webhook::{verify_signature, WebhookNotification, SIGNATURE_HEADER};
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    pub success: bool,
    pub order_reference: String,
    pub status: TransactionStatus,
    pub outcome: StatusChange,
}

/// Gateway notification endpoint, shared by the card and mobile-money rails.
///
/// The body is taken as raw bytes: the signature covers exactly what was sent.
pub async fn callback(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());

    let verified = signature
        .map(|sig| verify_signature(&body, sig, &state.webhook_secret))
        .unwrap_or(false);

    if !verified {
        tracing::warn!(
            signature_present = signature.is_some(),
            body_len = body.len(),
            "rejected webhook with invalid signature"
        );
        return Err(AppError::Unauthorized("invalid webhook signature".to_string()));
    }

    let notification = WebhookNotification::parse(&body)?;

    let use_case = ApplyNotification::new(state.transactions.clone(), state.gateway.clone());
    let update = use_case.execute(&notification).await?;

    Ok(Json(WebhookResponse {
        success: true,
        order_reference: update.transaction.order_reference,
        status: update.transaction.status,
        outcome: update.change,
    }))
}
