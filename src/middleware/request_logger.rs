use axum::{
    body::Body,
    extract::{Request, State},
    http::{HeaderValue, Method, StatusCode, Uri},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::utils::sanitize::sanitize_json;

pub const REQUEST_ID_HEADER: &str = "x-request-id";
const MAX_BODY_CAPTURE: usize = 256 * 1024;
const MAX_BODY_LOG_SIZE: usize = 1024;

/// What an interceptor sees before the handler runs.
#[derive(Debug, Clone)]
pub struct RequestRecord {
    pub request_id: String,
    pub method: Method,
    pub uri: Uri,
    /// Sanitised body, only when the interceptor asked for it.
    pub body: Option<String>,
}

/// What an interceptor sees after the handler returns.
#[derive(Debug, Clone)]
pub struct ResponseRecord {
    pub status: StatusCode,
    pub latency: Duration,
}

/// Hooks invoked around every request.
pub trait RequestInterceptor: Send + Sync {
    fn captures_body(&self) -> bool {
        false
    }

    fn before(&self, request: &RequestRecord);

    fn after(&self, request: &RequestRecord, response: &ResponseRecord);
}

/// Default interceptor: one `tracing` event per request and per response.
#[derive(Debug, Clone, Default)]
pub struct TracingInterceptor {
    log_body: bool,
}

impl TracingInterceptor {
    pub fn new(log_body: bool) -> Self {
        Self { log_body }
    }
}

impl RequestInterceptor for TracingInterceptor {
    fn captures_body(&self) -> bool {
        self.log_body
    }

    fn before(&self, request: &RequestRecord) {
        match &request.body {
            Some(body) => tracing::info!(
                request_id = %request.request_id,
                method = %request.method,
                uri = %request.uri,
                body = %body,
                "Incoming request"
            ),
            None => tracing::info!(
                request_id = %request.request_id,
                method = %request.method,
                uri = %request.uri,
                "Incoming request"
            ),
        }
    }

    fn after(&self, request: &RequestRecord, response: &ResponseRecord) {
        tracing::info!(
            request_id = %request.request_id,
            method = %request.method,
            uri = %request.uri,
            status = response.status.as_u16(),
            latency_ms = response.latency.as_millis() as u64,
            "Outgoing response"
        );
    }
}

pub async fn request_logger_middleware(
    State(interceptor): State<Arc<dyn RequestInterceptor>>,
    mut req: Request,
    next: Next,
) -> Response {
    let request_id = Uuid::new_v4().to_string();
    let start = Instant::now();

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        req.headers_mut().insert(REQUEST_ID_HEADER, value);
    }

    let mut record = RequestRecord {
        request_id: request_id.clone(),
        method: req.method().clone(),
        uri: req.uri().clone(),
        body: None,
    };

    if interceptor.captures_body() {
        let (parts, body) = req.into_parts();
        let bytes = match axum::body::to_bytes(body, MAX_BODY_CAPTURE).await {
            Ok(bytes) => bytes,
            Err(_) => {
                tracing::warn!(
                    request_id = %request_id,
                    method = %record.method,
                    uri = %record.uri,
                    "Request body too large or failed to read"
                );
                return (StatusCode::PAYLOAD_TOO_LARGE, "Request body too large").into_response();
            }
        };

        record.body = Some(describe_body(&bytes));
        // Handlers get the exact bytes back; webhook signatures depend on it.
        req = Request::from_parts(parts, Body::from(bytes));
    }

    interceptor.before(&record);

    let mut response = next.run(req).await;

    interceptor.after(
        &record,
        &ResponseRecord {
            status: response.status(),
            latency: start.elapsed(),
        },
    );

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }

    response
}

fn describe_body(bytes: &[u8]) -> String {
    if bytes.is_empty() {
        return "[empty]".to_string();
    }

    match serde_json::from_slice::<serde_json::Value>(bytes) {
        Ok(json) => {
            let sanitized = serde_json::to_string(&sanitize_json(&json))
                .unwrap_or_else(|_| "[invalid json]".to_string());
            if sanitized.len() > MAX_BODY_LOG_SIZE {
                format!("[json, {} bytes, truncated]", bytes.len())
            } else {
                sanitized
            }
        }
        Err(_) => format!("[non-json, {} bytes]", bytes.len()),
    }
}
