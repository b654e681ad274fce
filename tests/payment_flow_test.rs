use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use storefront_payments::adapters::InMemoryTransactionRepository;
use storefront_payments::config::{AllowedIps, GatewayConfig, PaymentEnvironment};
use storefront_payments::gateway::GatewayClient;
use storefront_payments::webhook::{sign, SIGNATURE_HEADER};
use storefront_payments::{create_app, AppState, RouterOptions};
use tower::ServiceExt;

const WEBHOOK_SECRET: &str = "whsec_test";

struct TestApp {
    app: Router,
    server: mockito::ServerGuard,
    _mocks: Vec<mockito::Mock>,
}

fn gateway_config(base_url: String) -> GatewayConfig {
    GatewayConfig {
        environment: PaymentEnvironment::Sandbox,
        base_url,
        consumer_key: "key".to_string(),
        consumer_secret: "secret".to_string(),
        callback_url: "https://shop.example/checkout/done".to_string(),
        notification_id: "ipn-1".to_string(),
        timeout: Duration::from_secs(5),
    }
}

async fn setup_with_options(options: RouterOptions) -> TestApp {
    let mut server = mockito::Server::new_async().await;

    let token = server
        .mock("POST", "/api/Auth/RequestToken")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"token":"tok","expiryDate":"2026-10-19T12:00:00Z","error":null,"status":"200"}"#)
        .create_async()
        .await;

    let submit = server
        .mock("POST", "/api/Transactions/SubmitOrderRequest")
        .match_header("authorization", "Bearer tok")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            r#"{"order_tracking_id":"trk-1","merchant_reference":"ORD1","redirect_url":"https://pay.example/redirect/trk-1","error":null,"status":"200"}"#,
        )
        .create_async()
        .await;

    let state = AppState {
        transactions: Arc::new(InMemoryTransactionRepository::new()),
        gateway: GatewayClient::new(&gateway_config(server.url())),
        webhook_secret: WEBHOOK_SECRET.to_string(),
        callback_url: "https://shop.example/checkout/done".to_string(),
        notification_id: "ipn-1".to_string(),
    };

    TestApp {
        app: create_app(state, options),
        server,
        _mocks: vec![token, submit],
    }
}

async fn setup() -> TestApp {
    setup_with_options(RouterOptions::default()).await
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn initiate_request(path: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(path)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn mpesa_body(order_ref: &str) -> Value {
    json!({
        "amount": 1500,
        "currency": "KES",
        "phone": "254712345678",
        "orderRef": order_ref,
        "description": "Two pairs of sandals"
    })
}

fn signed_webhook(path: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(path)
        .header("content-type", "application/json")
        .header(SIGNATURE_HEADER, sign(body.as_bytes(), WEBHOOK_SECRET))
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(path: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(path)
        .body(Body::empty())
        .unwrap()
}

async fn initiate_ord1(app: &Router) {
    let (status, _) = send(
        app,
        initiate_request("/payment/mpesa/initiate", mpesa_body("ORD1")),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn test_health_reports_store() {
    let test = setup().await;
    let (status, body) = send(&test.app, get("/health")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["db"], "connected");
}

#[tokio::test]
async fn test_initiate_then_status_is_submitted() {
    let test = setup().await;

    let (status, body) = send(
        &test.app,
        initiate_request("/payment/mpesa/initiate", mpesa_body("ORD1")),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["success"], true);
    assert_eq!(body["trackingId"], "trk-1");
    assert_eq!(body["redirectUrl"], "https://pay.example/redirect/trk-1");
    assert_eq!(body["orderRef"], "ORD1");
    assert_eq!(body["status"], "submitted");

    let (status, body) = send(&test.app, get("/payment/ORD1/status")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "submitted");
    assert_eq!(body["trackingId"], "trk-1");
    assert_eq!(body["currency"], "KES");
    assert_eq!(body["paymentMethod"], "mpesa");
}

#[tokio::test]
async fn test_card_initiate_accepts_email_only() {
    let test = setup().await;

    let (status, body) = send(
        &test.app,
        initiate_request(
            "/payment/card/initiate",
            json!({
                "amount": "49.99",
                "currency": "usd",
                "orderRef": "CARD-7",
                "email": "jane@example.com",
                "firstName": "Jane",
                "countryCode": "ke"
            }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["trackingId"], "trk-1");

    let (_, body) = send(&test.app, get("/payment/CARD-7/status")).await;
    assert_eq!(body["paymentMethod"], "card");
    assert_eq!(body["currency"], "USD");
}

#[tokio::test]
async fn test_duplicate_webhook_applies_once() {
    let test = setup().await;
    initiate_ord1(&test.app).await;

    let payload = r#"{"order_reference":"ORD1","status":"completed"}"#;

    let (status, body) = send(&test.app, signed_webhook("/payment/card/webhook", payload)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcome"], "applied");
    assert_eq!(body["status"], "completed");

    let (_, first) = send(&test.app, get("/payment/ORD1/status")).await;

    let (status, body) = send(&test.app, signed_webhook("/payment/card/webhook", payload)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcome"], "unchanged");
    assert_eq!(body["status"], "completed");

    let (_, second) = send(&test.app, get("/payment/ORD1/status")).await;
    assert_eq!(first["updatedAt"], second["updatedAt"]);
}

#[tokio::test]
async fn test_tampered_webhook_is_rejected() {
    let test = setup().await;
    initiate_ord1(&test.app).await;

    let signed = r#"{"order_reference":"ORD1","status":"failed"}"#;
    let tampered = r#"{"order_reference":"ORD1","status":"completed"}"#;

    let request = Request::builder()
        .method("POST")
        .uri("/payment/card/webhook")
        .header("content-type", "application/json")
        .header(SIGNATURE_HEADER, sign(signed.as_bytes(), WEBHOOK_SECRET))
        .body(Body::from(tampered))
        .unwrap();

    let (status, body) = send(&test.app, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);

    let unsigned = Request::builder()
        .method("POST")
        .uri("/payment/card/webhook")
        .body(Body::from(tampered))
        .unwrap();
    let (status, _) = send(&test.app, unsigned).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (_, body) = send(&test.app, get("/payment/ORD1/status")).await;
    assert_eq!(body["status"], "submitted");
}

#[tokio::test]
async fn test_late_pending_does_not_regress_completed() {
    let test = setup().await;
    initiate_ord1(&test.app).await;

    send(
        &test.app,
        signed_webhook(
            "/payment/mpesa/webhook",
            r#"{"OrderMerchantReference":"ORD1","status":"Completed"}"#,
        ),
    )
    .await;

    let (status, body) = send(
        &test.app,
        signed_webhook(
            "/payment/mpesa/webhook",
            r#"{"order_reference":"ORD1","status":"pending"}"#,
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcome"], "ignored_regression");
    assert_eq!(body["status"], "completed");

    let (_, body) = send(&test.app, get("/payment/ORD1/status")).await;
    assert_eq!(body["status"], "completed");
}

#[tokio::test]
async fn test_conflicting_terminal_status_is_rejected() {
    let test = setup().await;
    initiate_ord1(&test.app).await;

    send(
        &test.app,
        signed_webhook(
            "/payment/card/webhook",
            r#"{"order_reference":"ORD1","status":"completed"}"#,
        ),
    )
    .await;

    let (status, _) = send(
        &test.app,
        signed_webhook(
            "/payment/card/webhook",
            r#"{"order_reference":"ORD1","status":"failed"}"#,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, body) = send(&test.app, get("/payment/ORD1/status")).await;
    assert_eq!(body["status"], "completed");
}

#[tokio::test]
async fn test_webhook_matches_by_tracking_id() {
    let test = setup().await;
    initiate_ord1(&test.app).await;

    let (status, body) = send(
        &test.app,
        signed_webhook(
            "/payment/card/webhook",
            r#"{"OrderTrackingId":"trk-1","status":"Reversed"}"#,
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["order_reference"], "ORD1");
    assert_eq!(body["status"], "cancelled");
}

#[tokio::test]
async fn test_webhook_for_unknown_order_is_not_found() {
    let test = setup().await;

    let (status, _) = send(
        &test.app,
        signed_webhook(
            "/payment/card/webhook",
            r#"{"order_reference":"GHOST","status":"completed"}"#,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&test.app, get("/payment/GHOST/status")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_malformed_webhooks_are_bad_requests() {
    let test = setup().await;
    initiate_ord1(&test.app).await;

    for payload in [
        "not json",
        r#"{"status":"completed"}"#,
        r#"{"order_reference":"ORD1","status":"teleported"}"#,
    ] {
        let (status, _) = send(&test.app, signed_webhook("/payment/card/webhook", payload)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "payload {}", payload);
    }
}

#[tokio::test]
async fn test_unknown_order_status_is_not_found() {
    let test = setup().await;
    let (status, body) = send(&test.app, get("/payment/UNKNOWN/status")).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
    assert_eq!(body["status"], 404);
}

#[tokio::test]
async fn test_duplicate_order_reference_conflicts() {
    let test = setup().await;
    initiate_ord1(&test.app).await;

    let (status, body) = send(
        &test.app,
        initiate_request("/payment/mpesa/initiate", mpesa_body("ORD1")),
    )
    .await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_invalid_initiate_bodies_are_rejected() {
    let test = setup().await;

    let cases = [
        json!({ "amount": 0, "currency": "KES", "phone": "254712345678", "orderRef": "A1" }),
        json!({ "amount": 10, "currency": "EUR", "phone": "254712345678", "orderRef": "A2" }),
        json!({ "amount": 10, "currency": "KES", "phone": "12ab", "orderRef": "A3" }),
        json!({ "amount": 10, "currency": "KES", "phone": "254712345678", "orderRef": "bad ref!" }),
        json!({ "amount": 10, "currency": "KES", "orderRef": "A5" }),
        json!({ "amount": 20000000, "currency": "KES", "phone": "254712345678", "orderRef": "A6" }),
        json!({ "amount": "49.999", "currency": "KES", "phone": "254712345678", "orderRef": "A7" }),
        json!({ "amount": "0.001", "currency": "KES", "phone": "254712345678", "orderRef": "A8" }),
    ];

    for body in cases {
        let (status, response) = send(
            &test.app,
            initiate_request("/payment/mpesa/initiate", body.clone()),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "body {}", body);
        assert_eq!(response["status"], 400);
    }

    let malformed = Request::builder()
        .method("POST")
        .uri("/payment/mpesa/initiate")
        .header("content-type", "application/json")
        .body(Body::from("{"))
        .unwrap();
    let (status, _) = send(&test.app, malformed).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_gateway_rejection_marks_attempt_failed() {
    let mut server = mockito::Server::new_async().await;
    let _token = server
        .mock("POST", "/api/Auth/RequestToken")
        .with_status(200)
        .with_body(r#"{"token":"tok","error":null}"#)
        .create_async()
        .await;
    let _submit = server
        .mock("POST", "/api/Transactions/SubmitOrderRequest")
        .with_status(200)
        .with_body(
            r#"{"order_tracking_id":null,"error":{"error_type":"api_error","code":"invalid_amount","message":"Amount is below the minimum"}}"#,
        )
        .create_async()
        .await;

    let state = AppState {
        transactions: Arc::new(InMemoryTransactionRepository::new()),
        gateway: GatewayClient::new(&gateway_config(server.url())),
        webhook_secret: WEBHOOK_SECRET.to_string(),
        callback_url: "https://shop.example/checkout/done".to_string(),
        notification_id: "ipn-1".to_string(),
    };
    let app = create_app(state, RouterOptions::default());

    let (status, body) = send(
        &app,
        initiate_request("/payment/mpesa/initiate", mpesa_body("ORD9")),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(body["error"]
        .as_str()
        .unwrap()
        .contains("Amount is below the minimum"));

    let (_, body) = send(&app, get("/payment/ORD9/status")).await;
    assert_eq!(body["status"], "failed");
}

#[tokio::test]
async fn test_unreadable_submit_reply_leaves_attempt_pending() {
    let mut server = mockito::Server::new_async().await;
    let _token = server
        .mock("POST", "/api/Auth/RequestToken")
        .with_status(200)
        .with_body(r#"{"token":"tok","error":null}"#)
        .create_async()
        .await;
    let _submit = server
        .mock("POST", "/api/Transactions/SubmitOrderRequest")
        .with_status(200)
        .with_body("<html>accepted</html>")
        .create_async()
        .await;

    let state = AppState {
        transactions: Arc::new(InMemoryTransactionRepository::new()),
        gateway: GatewayClient::new(&gateway_config(server.url())),
        webhook_secret: WEBHOOK_SECRET.to_string(),
        callback_url: "https://shop.example/checkout/done".to_string(),
        notification_id: "ipn-1".to_string(),
    };
    let app = create_app(state, RouterOptions::default());

    let (status, _) = send(
        &app,
        initiate_request("/payment/mpesa/initiate", mpesa_body("ORD9")),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);

    let (_, body) = send(&app, get("/payment/ORD9/status")).await;
    assert_eq!(body["status"], "pending");

    let (status, body) = send(
        &app,
        signed_webhook(
            "/payment/card/webhook",
            r#"{"order_reference":"ORD9","status":"completed"}"#,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcome"], "applied");

    let (_, body) = send(&app, get("/payment/ORD9/status")).await;
    assert_eq!(body["status"], "completed");
}

#[tokio::test]
async fn test_ipn_without_status_queries_gateway() {
    let mut test = setup().await;
    initiate_ord1(&test.app).await;

    let _status = test
        .server
        .mock(
            "GET",
            mockito::Matcher::Regex(r"^/api/Transactions/GetTransactionStatus.*".into()),
        )
        .match_query(mockito::Matcher::UrlEncoded(
            "orderTrackingId".into(),
            "trk-1".into(),
        ))
        .with_status(200)
        .with_body(
            r#"{"payment_method":"MpesaKE","amount":1500.0,"confirmation_code":"QK9XYZ","payment_status_description":"Completed","status_code":1,"merchant_reference":"ORD1","currency":"KES","error":{"error_type":null,"code":null,"message":null},"status":"200"}"#,
        )
        .create_async()
        .await;

    let (status, body) = send(
        &test.app,
        signed_webhook(
            "/payment/mpesa/webhook",
            r#"{"OrderNotificationType":"IPNCHANGE","OrderTrackingId":"trk-1","OrderMerchantReference":"ORD1"}"#,
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "completed");
    assert_eq!(body["outcome"], "applied");

    let (_, body) = send(&test.app, get("/payment/ORD1/status")).await;
    assert_eq!(body["confirmationCode"], "QK9XYZ");
}

#[tokio::test]
async fn test_reconcile_pulls_gateway_status() {
    let mut test = setup().await;
    initiate_ord1(&test.app).await;

    let _status = test
        .server
        .mock(
            "GET",
            mockito::Matcher::Regex(r"^/api/Transactions/GetTransactionStatus.*".into()),
        )
        .with_status(200)
        .with_body(
            r#"{"payment_status_description":"Failed","status_code":2,"merchant_reference":"ORD1","error":null}"#,
        )
        .create_async()
        .await;

    let request = Request::builder()
        .method("POST")
        .uri("/payment/ORD1/reconcile")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&test.app, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "failed");
    assert_eq!(body["outcome"], "applied");

    let request = Request::builder()
        .method("POST")
        .uri("/payment/UNKNOWN/reconcile")
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&test.app, request).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_webhook_from_outside_allow_list_is_forbidden() {
    let options = RouterOptions {
        allowed_ips: AllowedIps::Cidrs(vec!["196.201.214.0/24".parse().unwrap()]),
        ..RouterOptions::default()
    };
    let test = setup_with_options(options).await;
    initiate_ord1(&test.app).await;

    // No peer address is known under oneshot, so the caller cannot be matched.
    let (status, _) = send(
        &test.app,
        signed_webhook(
            "/payment/card/webhook",
            r#"{"order_reference":"ORD1","status":"completed"}"#,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (_, body) = send(&test.app, get("/payment/ORD1/status")).await;
    assert_eq!(body["status"], "submitted");
}
