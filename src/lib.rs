pub mod adapters;
pub mod cli;
pub mod config;
pub mod db;
pub mod domain;
pub mod error;
pub mod gateway;
pub mod handlers;
pub mod middleware;
pub mod ports;
pub mod startup;
pub mod use_cases;
pub mod utils;
pub mod validation;
pub mod webhook;

use axum::{
    http::{header::CONTENT_TYPE, HeaderValue, Method},
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::config::{AllowedIps, Config};
use crate::gateway::GatewayClient;
use crate::middleware::ip_filter::WebhookIpFilterLayer;
use crate::middleware::request_logger::{
    request_logger_middleware, RequestInterceptor, TracingInterceptor,
};
use crate::ports::TransactionRepository;

#[derive(Clone)]
pub struct AppState {
    pub transactions: Arc<dyn TransactionRepository>,
    pub gateway: GatewayClient,
    pub webhook_secret: String,
    pub callback_url: String,
    pub notification_id: String,
}

impl AppState {
    pub fn new(
        config: &Config,
        transactions: Arc<dyn TransactionRepository>,
        gateway: GatewayClient,
    ) -> Self {
        Self {
            transactions,
            gateway,
            webhook_secret: config.webhook.shared_secret.clone(),
            callback_url: config.gateway.callback_url.clone(),
            notification_id: config.gateway.notification_id.clone(),
        }
    }
}

/// Cross-cutting HTTP behaviour layered around the routes.
#[derive(Clone)]
pub struct RouterOptions {
    pub interceptor: Arc<dyn RequestInterceptor>,
    pub allowed_ips: AllowedIps,
    pub trusted_proxy_depth: usize,
    pub cors_allowed_origins: Option<Vec<String>>,
}

impl RouterOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            interceptor: Arc::new(TracingInterceptor::new(config.log_request_body)),
            allowed_ips: config.webhook.allowed_ips.clone(),
            trusted_proxy_depth: config.webhook.trusted_proxy_depth,
            cors_allowed_origins: config.cors_allowed_origins.clone(),
        }
    }
}

impl Default for RouterOptions {
    fn default() -> Self {
        Self {
            interceptor: Arc::new(TracingInterceptor::default()),
            allowed_ips: AllowedIps::Any,
            trusted_proxy_depth: 0,
            cors_allowed_origins: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteInfo {
    pub method: &'static str,
    pub path: &'static str,
    pub description: &'static str,
}

/// Every route `create_app` mounts.
pub const ROUTES: &[RouteInfo] = &[
    RouteInfo {
        method: "GET",
        path: "/health",
        description: "Service and transaction store health",
    },
    RouteInfo {
        method: "POST",
        path: "/payment/mpesa/initiate",
        description: "Start a mobile-money payment",
    },
    RouteInfo {
        method: "POST",
        path: "/payment/card/initiate",
        description: "Start a card payment",
    },
    RouteInfo {
        method: "POST",
        path: "/payment/card/webhook",
        description: "Gateway status notification (signed)",
    },
    RouteInfo {
        method: "POST",
        path: "/payment/mpesa/webhook",
        description: "Gateway status notification (signed)",
    },
    RouteInfo {
        method: "GET",
        path: "/payment/:order_ref/status",
        description: "Stored status of a payment",
    },
    RouteInfo {
        method: "POST",
        path: "/payment/:order_ref/reconcile",
        description: "Refresh a payment's status from the gateway",
    },
];

pub fn create_app(state: AppState, options: RouterOptions) -> Router {
    let webhooks = Router::new()
        .route("/payment/card/webhook", post(handlers::webhook::callback))
        .route("/payment/mpesa/webhook", post(handlers::webhook::callback))
        .layer(WebhookIpFilterLayer::new(
            options.allowed_ips,
            options.trusted_proxy_depth,
        ));

    let mut app = Router::new()
        .route("/health", get(handlers::health))
        .route(
            "/payment/mpesa/initiate",
            post(handlers::payments::initiate_mpesa),
        )
        .route(
            "/payment/card/initiate",
            post(handlers::payments::initiate_card),
        )
        .route(
            "/payment/:order_ref/status",
            get(handlers::payments::get_status),
        )
        .route(
            "/payment/:order_ref/reconcile",
            post(handlers::payments::reconcile),
        )
        .merge(webhooks)
        .layer(axum_middleware::from_fn_with_state(
            options.interceptor,
            request_logger_middleware,
        ));

    if let Some(origins) = options.cors_allowed_origins {
        app = app.layer(cors_layer(&origins));
    }

    app.with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE])
        .max_age(Duration::from_secs(60 * 60))
}
