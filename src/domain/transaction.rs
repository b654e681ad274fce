//! Transaction domain entity.
//! Framework-agnostic representation of a single payment attempt and its
//! forward-only status lifecycle.

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Submitted,
    Completed,
    Failed,
    Cancelled,
}

impl TransactionStatus {
    pub const ALL: [TransactionStatus; 5] = [
        TransactionStatus::Pending,
        TransactionStatus::Submitted,
        TransactionStatus::Completed,
        TransactionStatus::Failed,
        TransactionStatus::Cancelled,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Submitted => "submitted",
            TransactionStatus::Completed => "completed",
            TransactionStatus::Failed => "failed",
            TransactionStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TransactionStatus::Completed | TransactionStatus::Failed | TransactionStatus::Cancelled
        )
    }

    fn rank(self) -> u8 {
        match self {
            TransactionStatus::Pending => 0,
            TransactionStatus::Submitted => 1,
            _ => 2,
        }
    }

    /// Classifies a move from `self` to `next`.
    pub fn transition_to(self, next: TransactionStatus) -> Result<Transition, TransitionError> {
        if self == next {
            return Ok(Transition::Unchanged);
        }

        if self.is_terminal() && next.is_terminal() {
            return Err(TransitionError::TerminalConflict { from: self, to: next });
        }

        if next.rank() > self.rank() {
            Ok(Transition::Advance)
        } else {
            Ok(Transition::Regression)
        }
    }

    /// Maps a status label reported by the gateway (or sent in a webhook)
    /// onto the local lifecycle.
    pub fn from_gateway_label(label: &str) -> Option<TransactionStatus> {
        match label.trim().to_ascii_lowercase().as_str() {
            "pending" | "invalid" => Some(TransactionStatus::Pending),
            "submitted" => Some(TransactionStatus::Submitted),
            "completed" | "success" | "successful" => Some(TransactionStatus::Completed),
            "failed" => Some(TransactionStatus::Failed),
            "cancelled" | "canceled" | "reversed" => Some(TransactionStatus::Cancelled),
            _ => None,
        }
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TransactionStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("unknown transaction status '{}'", s))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    Mpesa,
    Card,
}

impl PaymentMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            PaymentMethod::Mpesa => "mpesa",
            PaymentMethod::Card => "card",
        }
    }
}

impl FromStr for PaymentMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mpesa" => Ok(PaymentMethod::Mpesa),
            "card" => Ok(PaymentMethod::Card),
            other => Err(format!("unknown payment method '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Advance,
    Unchanged,
    Regression,
}

/// What an update actually did to the stored record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusChange {
    Applied,
    Unchanged,
    IgnoredRegression,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransitionError {
    #[error("transaction is already {from} and cannot become {to}")]
    TerminalConflict {
        from: TransactionStatus,
        to: TransactionStatus,
    },

    #[error("gateway tracking id is already {current} and cannot change to {requested}")]
    TrackingIdChanged { current: String, requested: String },
}

/// Domain entity representing a payment attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Transaction {
    pub id: Uuid,
    pub order_reference: String,
    pub amount: BigDecimal,
    pub currency: String,
    pub payment_method: PaymentMethod,
    pub status: TransactionStatus,
    pub gateway_tracking_id: Option<String>,
    pub confirmation_code: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields a caller supplies when opening a new attempt.
#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub order_reference: String,
    pub amount: BigDecimal,
    pub currency: String,
    pub payment_method: PaymentMethod,
}

impl Transaction {
    pub fn new(input: NewTransaction) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            order_reference: input.order_reference,
            amount: input.amount,
            currency: input.currency,
            payment_method: input.payment_method,
            status: TransactionStatus::Pending,
            gateway_tracking_id: None,
            confirmation_code: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Applies a status (and optionally a tracking id) in place.
    ///
    /// A regressing status is dropped, but a tracking id the record lacks is
    /// still assigned; a webhook can land before the submit call stores it.
    /// `updated_at` only moves when something was applied.
    pub fn apply_status(
        &mut self,
        next: TransactionStatus,
        tracking_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<StatusChange, TransitionError> {
        if let (Some(current), Some(requested)) = (self.gateway_tracking_id.as_deref(), tracking_id) {
            if current != requested {
                return Err(TransitionError::TrackingIdChanged {
                    current: current.to_string(),
                    requested: requested.to_string(),
                });
            }
        }

        let transition = self.status.transition_to(next)?;
        let assigns_tracking = self.gateway_tracking_id.is_none() && tracking_id.is_some();

        if transition == Transition::Advance {
            self.status = next;
        }
        if assigns_tracking {
            self.gateway_tracking_id = tracking_id.map(str::to_string);
        }

        if transition == Transition::Advance || assigns_tracking {
            self.updated_at = now;
            return Ok(StatusChange::Applied);
        }

        match transition {
            Transition::Regression => Ok(StatusChange::IgnoredRegression),
            _ => Ok(StatusChange::Unchanged),
        }
    }
}
