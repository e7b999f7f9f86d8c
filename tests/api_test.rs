mod common;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use common::{Harness, InitScript, StubBinLookup};
use paycascade_backend::api::{router, AppState};
use paycascade_backend::health::HealthChecker;
use paycascade_backend::payments::ProviderName;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

fn app(harness: &Harness) -> Router {
    router(AppState {
        orchestrator: Arc::new(harness.orchestrator(StubBinLookup::unknown())),
        webhooks: Arc::new(harness.webhook_processor()),
        provider_configs: Arc::new(harness.config_service()),
        health: HealthChecker::new(harness.store_handle()),
    })
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json");
    let request = match body {
        Some(body) => builder.body(Body::from(body.to_string())).unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

fn payment_body(harness: &Harness, key: &str) -> Value {
    json!({
        "merchant_id": harness.merchant.id,
        "amount": 500000,
        "currency": "ngn",
        "email": "buyer@example.com",
        "idempotency_key": key
    })
}

#[tokio::test]
async fn create_then_replay_then_query() {
    let harness = Harness::new().await;
    harness.enable(ProviderName::Paystack, "1.5").await;
    harness.factory.on_initialize(
        ProviderName::Paystack,
        InitScript::Redirect("https://checkout.paystack.com/abc".into()),
    );
    let app = app(&harness);

    let (status, created) = send(
        &app,
        Method::POST,
        "/api/payments",
        Some(payment_body(&harness, "order-1")),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["status"], "PENDING");
    assert_eq!(created["provider"], "PAYSTACK");
    assert_eq!(created["redirect_url"], "https://checkout.paystack.com/abc");
    assert_eq!(created["replayed"], false);

    let (status, replayed) = send(
        &app,
        Method::POST,
        "/api/payments",
        Some(payment_body(&harness, "order-1")),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(replayed["payment_id"], created["payment_id"]);
    assert_eq!(replayed["replayed"], true);

    let id = created["payment_id"].as_str().unwrap();
    let (status, fetched) = send(&app, Method::GET, &format!("/api/payments/{}", id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["payment_id"], id);
    assert_eq!(fetched["currency"], "NGN");
    assert_eq!(fetched["amount"], 500000);
    assert_eq!(fetched["redirect_url"], "https://checkout.paystack.com/abc");
    let attempts = fetched["attempts"].as_array().unwrap();
    assert_eq!(attempts.len(), 1);
    assert_eq!(attempts[0]["provider"], "PAYSTACK");
    assert_eq!(attempts[0]["status"], "PENDING");
    assert!(attempts[0]["failure_reason"].is_null());
    // Customer email stays out of responses.
    assert!(!fetched.to_string().contains("buyer@example.com"));
}

#[tokio::test]
async fn status_query_hides_gateway_error_text() {
    let harness = Harness::new().await;
    harness.enable(ProviderName::Paystack, "1.5").await;
    harness.enable(ProviderName::Flutterwave, "2.0").await;
    harness
        .factory
        .on_initialize(
            ProviderName::Paystack,
            InitScript::Decline(
                r#"HTTP 401 Unauthorized: {"message":"Invalid key sk_live_leaky_123"}"#.into(),
            ),
        )
        .on_initialize(
            ProviderName::Flutterwave,
            InitScript::Redirect("https://checkout.flutterwave.com/x".into()),
        );
    let app = app(&harness);

    let (status, created) = send(
        &app,
        Method::POST,
        "/api/payments",
        Some(payment_body(&harness, "order-leak")),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["provider"], "FLUTTERWAVE");

    let id = created["payment_id"].as_str().unwrap();
    let (status, fetched) = send(&app, Method::GET, &format!("/api/payments/{}", id), None).await;
    assert_eq!(status, StatusCode::OK);

    let rendered = fetched.to_string();
    assert!(!rendered.contains("sk_live_leaky_123"));
    assert!(!rendered.contains("HTTP 401"));
    assert!(fetched.get("error_message").is_none());
    let attempts = fetched["attempts"].as_array().unwrap();
    assert_eq!(attempts.len(), 2);
    assert_eq!(attempts[0]["status"], "FAILED");
    assert_eq!(attempts[0]["failure_reason"], "declined_by_provider");
    assert!(attempts[0].get("error_message").is_none());
    assert!(attempts[1]["failure_reason"].is_null());

    // The full text is still kept for operators.
    let stored = harness.attempts(uuid::Uuid::parse_str(id).unwrap()).await;
    assert!(stored[0]
        .error_message
        .as_deref()
        .unwrap()
        .contains("sk_live_leaky_123"));
}

#[tokio::test]
async fn exhausted_payment_is_declined() {
    let harness = Harness::new().await;
    harness.enable(ProviderName::Paystack, "1.5").await;
    harness.factory.on_initialize(
        ProviderName::Paystack,
        InitScript::Decline("insufficient funds".into()),
    );
    let app = app(&harness);

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/payments",
        Some(payment_body(&harness, "order-2")),
    )
    .await;

    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
    assert_eq!(body["error"], "PAYMENT_DECLINED");
    assert_eq!(body["details"]["attempts"], 1);
    assert!(!body["message"].as_str().unwrap().contains("insufficient"));
}

#[tokio::test]
async fn invalid_requests_are_rejected() {
    let harness = Harness::new().await;
    let app = app(&harness);

    let mut body = payment_body(&harness, "order-3");
    body["amount"] = json!(0);
    let (status, error) = send(&app, Method::POST, "/api/payments", Some(body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error["error"], "VALIDATION_ERROR");
    assert_eq!(error["details"]["field"], "amount");

    let (status, error) = send(
        &app,
        Method::POST,
        "/api/payments",
        Some(json!({ "amount": 100 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error["error"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn unknown_payment_is_not_found() {
    let harness = Harness::new().await;
    let app = app(&harness);

    for uri in [
        format!("/api/payments/{}", uuid::Uuid::new_v4()),
        "/api/payments/not-a-uuid".to_string(),
    ] {
        let (status, body) = send(&app, Method::GET, &uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "PAYMENT_NOT_FOUND");
    }
}

#[tokio::test]
async fn unknown_merchant_is_not_found() {
    let harness = Harness::new().await;
    let app = app(&harness);

    let mut body = payment_body(&harness, "order-4");
    body["merchant_id"] = json!(uuid::Uuid::new_v4());
    let (status, error) = send(&app, Method::POST, "/api/payments", Some(body)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(error["error"], "MERCHANT_NOT_FOUND");
}

#[tokio::test]
async fn provider_config_upsert_never_echoes_secrets() {
    let harness = Harness::new().await;
    let app = app(&harness);
    let uri = format!("/api/merchants/{}/providers/paystack", harness.merchant.id);

    let (status, saved) = send(
        &app,
        Method::PUT,
        &uri,
        Some(json!({
            "secret_key": "sk_live_super_secret",
            "priority": 2,
            "fees": { "percent": "1.5", "flat": "10000", "cap": "200000" }
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(saved["provider"], "PAYSTACK");
    assert_eq!(saved["enabled"], true);
    assert_eq!(saved["priority"], 2);
    assert!(!saved.to_string().contains("sk_live_super_secret"));
    assert!(saved.get("encrypted_secret_key").is_none());

    let bad = format!("/api/merchants/{}/providers/square", harness.merchant.id);
    let (status, _) = send(
        &app,
        Method::PUT,
        &bad,
        Some(json!({ "secret_key": "x" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let stranger = format!("/api/merchants/{}/providers/stripe", uuid::Uuid::new_v4());
    let (status, _) = send(
        &app,
        Method::PUT,
        &stranger,
        Some(json!({ "secret_key": "sk_test" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn webhook_signature_failures_are_unauthorized() {
    let harness = Harness::new().await;
    harness
        .enable_with_secrets(ProviderName::Paystack, "1.5", "sk_test_paystack", None)
        .await;
    let (payment, attempt) = harness
        .pending_payment(ProviderName::Paystack, Some("PSK_ref"))
        .await;
    let app = app(&harness);

    let body = json!({
        "event": "charge.success",
        "data": { "reference": attempt.id.to_string(), "status": "success" }
    })
    .to_string();
    let request = Request::builder()
        .method(Method::POST)
        .uri("/webhooks/paystack")
        .header("x-paystack-signature", "deadbeef")
        .body(Body::from(body.clone()))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let signature =
        paycascade_backend::payments::utils::hmac_sha512_hex(body.as_bytes(), "sk_test_paystack")
            .unwrap();
    let request = Request::builder()
        .method(Method::POST)
        .uri("/webhooks/paystack")
        .header("x-paystack-signature", signature)
        .body(Body::from(body))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        harness.payment(payment.id).await.status,
        paycascade_backend::payments::PaymentStatus::Succeeded
    );

    let (status, body) = send(&app, Method::POST, "/webhooks/square", Some(json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], "rejected");
}

#[tokio::test]
async fn responses_carry_request_id_and_health_is_up() {
    let harness = Harness::new().await;
    let app = app(&harness);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/health")
                .header("x-request-id", "req-123")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-request-id"], "req-123");

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert!(response.headers().contains_key("x-request-id"));
}
