use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{PaymentMethod, StatusChange, Transaction, TransactionStatus};
use crate::error::AppError;
use crate::use_cases::{InitiatePayment, InitiatePaymentInput, ReconcilePayment};
use crate::validation::{
    sanitize_string, validate_amount, validate_currency, validate_email, validate_max_len,
    validate_order_reference, validate_phone, ValidationError, DESCRIPTION_MAX_LEN, NAME_MAX_LEN,
};
use crate::AppState;

/// Body accepted by both initiate routes.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitiatePaymentRequest {
    pub amount: Option<BigDecimal>,
    pub currency: Option<String>,
    pub phone: Option<String>,
    pub order_ref: Option<String>,
    pub description: Option<String>,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub country_code: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InitiatePaymentResponse {
    pub success: bool,
    pub tracking_id: Option<String>,
    pub redirect_url: String,
    pub order_ref: String,
    pub status: TransactionStatus,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentStatusResponse {
    pub success: bool,
    pub order_ref: String,
    pub status: TransactionStatus,
    pub tracking_id: Option<String>,
    pub amount: BigDecimal,
    pub currency: String,
    pub payment_method: PaymentMethod,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confirmation_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<StatusChange>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PaymentStatusResponse {
    fn new(tx: Transaction, outcome: Option<StatusChange>) -> Self {
        Self {
            success: true,
            order_ref: tx.order_reference,
            status: tx.status,
            tracking_id: tx.gateway_tracking_id,
            amount: tx.amount,
            currency: tx.currency,
            payment_method: tx.payment_method,
            confirmation_code: tx.confirmation_code,
            outcome,
            created_at: tx.created_at,
            updated_at: tx.updated_at,
        }
    }
}

pub async fn initiate_mpesa(
    State(state): State<AppState>,
    payload: Result<Json<InitiatePaymentRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    initiate(state, PaymentMethod::Mpesa, payload).await
}

pub async fn initiate_card(
    State(state): State<AppState>,
    payload: Result<Json<InitiatePaymentRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    initiate(state, PaymentMethod::Card, payload).await
}

async fn initiate(
    state: AppState,
    method: PaymentMethod,
    payload: Result<Json<InitiatePaymentRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<InitiatePaymentResponse>), AppError> {
    let Json(request) = payload.map_err(|rejection| AppError::Validation(rejection.body_text()))?;
    let input = validate_initiate(request, method)?;

    let use_case = InitiatePayment::new(
        state.transactions.clone(),
        state.gateway.clone(),
        state.callback_url.clone(),
        state.notification_id.clone(),
    );
    let initiated = use_case.execute(input).await?;

    let tx = initiated.transaction;
    Ok((
        StatusCode::CREATED,
        Json(InitiatePaymentResponse {
            success: true,
            tracking_id: tx.gateway_tracking_id,
            redirect_url: initiated.redirect_url,
            order_ref: tx.order_reference,
            status: tx.status,
        }),
    ))
}

/// Checks and normalises an initiate body. The mobile-money rail needs a
/// phone number; cards need a phone number or an email address.
pub fn validate_initiate(
    request: InitiatePaymentRequest,
    method: PaymentMethod,
) -> Result<InitiatePaymentInput, ValidationError> {
    let order_reference =
        validate_order_reference(request.order_ref.as_deref().unwrap_or_default())?;

    let amount = request
        .amount
        .ok_or_else(|| ValidationError::new("amount", "is required"))?;
    validate_amount(&amount)?;

    let currency = validate_currency(request.currency.as_deref().unwrap_or_default())?;

    let phone = match optional(request.phone) {
        Some(phone) => Some(validate_phone(&phone)?),
        None => None,
    };
    let email = optional(request.email);
    if let Some(email) = &email {
        validate_email(email)?;
    }

    match method {
        PaymentMethod::Mpesa if phone.is_none() => {
            return Err(ValidationError::new("phone", "is required"));
        }
        PaymentMethod::Card if phone.is_none() && email.is_none() => {
            return Err(ValidationError::new("phone", "phone or email is required"));
        }
        _ => {}
    }

    let description = optional(request.description);
    if let Some(description) = &description {
        validate_max_len("description", description, DESCRIPTION_MAX_LEN)?;
    }
    let first_name = optional(request.first_name);
    if let Some(name) = &first_name {
        validate_max_len("firstName", name, NAME_MAX_LEN)?;
    }
    let last_name = optional(request.last_name);
    if let Some(name) = &last_name {
        validate_max_len("lastName", name, NAME_MAX_LEN)?;
    }
    let country_code = optional(request.country_code).map(|code| code.to_ascii_uppercase());
    if let Some(code) = &country_code {
        if code.len() != 2 || !code.chars().all(|ch| ch.is_ascii_alphabetic()) {
            return Err(ValidationError::new("countryCode", "must be a two-letter ISO code"));
        }
    }

    Ok(InitiatePaymentInput {
        order_reference,
        amount,
        currency,
        payment_method: method,
        phone,
        email,
        first_name,
        last_name,
        country_code,
        description,
    })
}

fn optional(value: Option<String>) -> Option<String> {
    value
        .map(|v| sanitize_string(&v))
        .filter(|v| !v.is_empty())
}

pub async fn get_status(
    State(state): State<AppState>,
    Path(order_ref): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let tx = state
        .transactions
        .find_by_reference(&order_ref)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Transaction {} not found", order_ref)))?;

    Ok(Json(PaymentStatusResponse::new(tx, None)))
}

pub async fn reconcile(
    State(state): State<AppState>,
    Path(order_ref): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let use_case = ReconcilePayment::new(state.transactions.clone(), state.gateway.clone());
    let update = use_case.execute(&order_ref).await?;

    Ok(Json(PaymentStatusResponse::new(
        update.transaction,
        Some(update.change),
    )))
}
