use failsafe::futures::CircuitBreaker as FuturesCircuitBreaker;
use failsafe::{backoff, failure_policy, Config as BreakerConfig, Error as FailsafeError, StateMachine};
use reqwest::header::ACCEPT;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

use super::models::{
    AccessToken, ApiError, OrderRequest, RegisterIpnRequest, RegisterIpnResponse, StatusResponse,
    StatusResult, SubmitOrderResponse, SubmittedOrder, TokenRequest, TokenResponse,
};
use crate::config::GatewayConfig;

const DEFAULT_FAILURE_THRESHOLD: u32 = 3;
const DEFAULT_RESET_TIMEOUT_SECS: u64 = 60;

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("gateway authentication failed: {0}")]
    Auth(String),
    #[error("gateway rejected request: {0}")]
    Rejected(String),
    #[error("gateway returned HTTP {status}: {body}")]
    Upstream { status: u16, body: String },
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("invalid response from gateway: {0}")]
    InvalidResponse(String),
    #[error("circuit breaker open: {0}")]
    CircuitBreakerOpen(String),
}

impl GatewayError {
    /// Only outages count against the circuit breaker; business rejections
    /// are the caller's problem.
    fn is_outage(&self) -> bool {
        matches!(self, GatewayError::Request(_) | GatewayError::Upstream { .. })
    }

    /// True when the gateway answered clearly, or was never called, so no
    /// order can exist on its side. Timeouts, 5xx replies and unreadable
    /// bodies leave that open.
    pub fn is_definitive_rejection(&self) -> bool {
        matches!(
            self,
            GatewayError::Rejected(_) | GatewayError::Auth(_) | GatewayError::CircuitBreakerOpen(_)
        )
    }
}

/// HTTP client for the payment aggregator.
#[derive(Clone)]
pub struct GatewayClient {
    http: Client,
    base_url: String,
    consumer_key: String,
    consumer_secret: String,
    circuit_breaker: StateMachine<failure_policy::ConsecutiveFailures<backoff::EqualJittered>, ()>,
}

impl GatewayClient {
    pub fn new(config: &GatewayConfig) -> Self {
        Self::with_circuit_breaker(config, DEFAULT_FAILURE_THRESHOLD, DEFAULT_RESET_TIMEOUT_SECS)
    }

    pub fn with_circuit_breaker(
        config: &GatewayConfig,
        failure_threshold: u32,
        reset_timeout_secs: u64,
    ) -> Self {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .unwrap_or_default();

        let backoff = backoff::equal_jittered(
            Duration::from_secs(reset_timeout_secs),
            Duration::from_secs(reset_timeout_secs * 2),
        );
        let policy = failure_policy::consecutive_failures(failure_threshold, backoff);
        let circuit_breaker = BreakerConfig::new().failure_policy(policy).build();

        GatewayClient {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            consumer_key: config.consumer_key.clone(),
            consumer_secret: config.consumer_secret.clone(),
            circuit_breaker,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn circuit_state(&self) -> &'static str {
        if self.circuit_breaker.is_call_permitted() {
            "closed"
        } else {
            "open"
        }
    }

    /// Obtains a token with the credentials this client was built with.
    pub async fn request_token(&self) -> Result<AccessToken, GatewayError> {
        self.authenticate(&self.consumer_key, &self.consumer_secret).await
    }

    pub async fn authenticate(
        &self,
        consumer_key: &str,
        consumer_secret: &str,
    ) -> Result<AccessToken, GatewayError> {
        let url = self.endpoint("/api/Auth/RequestToken");

        self.guarded(async {
            let response = self
                .http
                .post(&url)
                .header(ACCEPT, "application/json")
                .json(&TokenRequest {
                    consumer_key,
                    consumer_secret,
                })
                .send()
                .await?;

            let status = response.status();
            let body = response.text().await?;
            if status.is_server_error() {
                return Err(GatewayError::Upstream {
                    status: status.as_u16(),
                    body: error_message(&body),
                });
            }
            if !status.is_success() {
                return Err(GatewayError::Auth(format!(
                    "HTTP {}: {}",
                    status.as_u16(),
                    error_message(&body)
                )));
            }

            let parsed: TokenResponse = serde_json::from_str(&body)
                .map_err(|e| GatewayError::Auth(format!("malformed token response: {}", e)))?;

            if let Some(err) = parsed.error.filter(|err| !err.is_empty()) {
                return Err(GatewayError::Auth(err.describe()));
            }

            let token = parsed
                .token
                .filter(|token| !token.is_empty())
                .ok_or_else(|| {
                    GatewayError::Auth(
                        parsed
                            .message
                            .unwrap_or_else(|| "token missing from response".to_string()),
                    )
                })?;

            tracing::debug!(expires_at = ?parsed.expiry_date, "gateway token issued");

            Ok(AccessToken {
                token,
                expires_at: parsed.expiry_date,
            })
        })
        .await
    }

    /// Submits an order. No retry on failure.
    pub async fn submit_order(
        &self,
        token: &AccessToken,
        order: &OrderRequest,
    ) -> Result<SubmittedOrder, GatewayError> {
        let url = self.endpoint("/api/Transactions/SubmitOrderRequest");

        self.guarded(async {
            let response = self
                .http
                .post(&url)
                .header(ACCEPT, "application/json")
                .bearer_auth(&token.token)
                .json(order)
                .send()
                .await?;

            let parsed: SubmitOrderResponse = read_json(response).await?;
            if let Some(err) = parsed.error.filter(|err| !err.is_empty()) {
                return Err(GatewayError::Rejected(err.describe()));
            }

            let tracking_id = parsed
                .order_tracking_id
                .filter(|id| !id.is_empty())
                .ok_or_else(|| GatewayError::InvalidResponse("order_tracking_id missing".to_string()))?;

            tracing::info!(
                order_reference = %order.id,
                tracking_id = %tracking_id,
                "order accepted by gateway"
            );

            Ok(SubmittedOrder {
                tracking_id,
                redirect_url: parsed.redirect_url.unwrap_or_default(),
                merchant_reference: parsed.merchant_reference,
            })
        })
        .await
    }

    pub async fn query_status(
        &self,
        token: &AccessToken,
        tracking_id: &str,
    ) -> Result<StatusResult, GatewayError> {
        let url = self.endpoint("/api/Transactions/GetTransactionStatus");

        self.guarded(async {
            let response = self
                .http
                .get(&url)
                .header(ACCEPT, "application/json")
                .bearer_auth(&token.token)
                .query(&[("orderTrackingId", tracking_id)])
                .send()
                .await?;

            let parsed: StatusResponse = read_json(response).await?;
            // Unpaid orders come back with both a status code and an error
            // object; only an error without a status means an unknown order.
            if parsed.status_code.is_none() {
                if let Some(err) = parsed.error.as_ref().filter(|err| !err.is_empty()) {
                    return Err(GatewayError::Rejected(err.describe()));
                }
            }

            Ok(StatusResult::from_response(tracking_id, parsed))
        })
        .await
    }

    /// Registers the URL the gateway posts notifications to and returns the
    /// notification id orders must reference.
    pub async fn register_ipn(
        &self,
        token: &AccessToken,
        notification_url: &str,
    ) -> Result<String, GatewayError> {
        let url = self.endpoint("/api/URLSetup/RegisterIPN");

        self.guarded(async {
            let response = self
                .http
                .post(&url)
                .header(ACCEPT, "application/json")
                .bearer_auth(&token.token)
                .json(&RegisterIpnRequest {
                    url: notification_url,
                    ipn_notification_type: "POST",
                })
                .send()
                .await?;

            let parsed: RegisterIpnResponse = read_json(response).await?;
            if let Some(err) = parsed.error.filter(|err| !err.is_empty()) {
                return Err(GatewayError::Rejected(err.describe()));
            }

            parsed
                .ipn_id
                .filter(|id| !id.is_empty())
                .ok_or_else(|| GatewayError::InvalidResponse("ipn_id missing".to_string()))
        })
        .await
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn guarded<T, F>(&self, call: F) -> Result<T, GatewayError>
    where
        F: Future<Output = Result<T, GatewayError>>,
    {
        match self.circuit_breaker.call_with(GatewayError::is_outage, call).await {
            Ok(value) => Ok(value),
            Err(FailsafeError::Rejected) => {
                tracing::warn!(base_url = %self.base_url, "gateway circuit breaker open, call rejected");
                Err(GatewayError::CircuitBreakerOpen(
                    "payment gateway circuit breaker is open".to_string(),
                ))
            }
            Err(FailsafeError::Inner(e)) => Err(e),
        }
    }
}

async fn read_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, GatewayError> {
    let status = response.status();
    let body = response.text().await?;

    if status.is_server_error() {
        return Err(GatewayError::Upstream {
            status: status.as_u16(),
            body: error_message(&body),
        });
    }
    if !status.is_success() {
        return Err(GatewayError::Rejected(error_message(&body)));
    }

    serde_json::from_str(&body).map_err(|e| GatewayError::InvalidResponse(e.to_string()))
}

/// Pulls the aggregator's error message out of a body, falling back to the
/// raw text.
fn error_message(body: &str) -> String {
    #[derive(Deserialize)]
    struct Envelope {
        error: Option<ApiError>,
        message: Option<String>,
    }

    match serde_json::from_str::<Envelope>(body) {
        Ok(Envelope {
            error: Some(err), ..
        }) if !err.is_empty() => err.describe(),
        Ok(Envelope {
            message: Some(message),
            ..
        }) => message,
        _ => body.trim().to_string(),
    }
}
