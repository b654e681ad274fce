use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::gateway::GatewayError;
use crate::ports::RepositoryError;
use crate::validation::ValidationError;
use crate::webhook::NotificationError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    #[error("Gateway authentication failed: {0}")]
    GatewayAuth(String),

    #[error("Gateway error: {0}")]
    Gateway(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) | AppError::InvalidTransition(_) => StatusCode::CONFLICT,
            AppError::GatewayAuth(_) | AppError::Gateway(_) => StatusCode::BAD_GATEWAY,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to hand to the caller. Internal detail stays in the log.
    fn public_message(&self) -> String {
        match self {
            AppError::GatewayAuth(_) => "payment gateway unavailable".to_string(),
            AppError::Internal(_) => "internal server error".to_string(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        match &self {
            AppError::Internal(_) | AppError::GatewayAuth(_) => {
                tracing::error!(error = %self, status = status.as_u16(), "request failed");
            }
            AppError::InvalidTransition(_) | AppError::Gateway(_) => {
                tracing::warn!(error = %self, status = status.as_u16(), "request rejected");
            }
            _ => {}
        }

        let body = Json(json!({
            "success": false,
            "error": self.public_message(),
            "status": status.as_u16(),
        }));

        (status, body).into_response()
    }
}

impl From<RepositoryError> for AppError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound(id) => AppError::NotFound(format!("Transaction {} not found", id)),
            RepositoryError::Conflict(reference) => {
                AppError::Conflict(format!("order reference {} already exists", reference))
            }
            RepositoryError::InvalidTransition(e) => AppError::InvalidTransition(e.to_string()),
            RepositoryError::Storage(e) => AppError::Internal(e),
        }
    }
}

impl From<GatewayError> for AppError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::Auth(msg) => AppError::GatewayAuth(msg),
            GatewayError::Rejected(msg) => AppError::Gateway(msg),
            other => AppError::Gateway(other.to_string()),
        }
    }
}

impl From<ValidationError> for AppError {
    fn from(err: ValidationError) -> Self {
        AppError::Validation(err.to_string())
    }
}

impl From<NotificationError> for AppError {
    fn from(err: NotificationError) -> Self {
        AppError::Validation(err.to_string())
    }
}
