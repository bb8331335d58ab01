// SPDX-License-Identifier: MIT

//! API input validation tests.
//!
//! All of these run against offline mocks: validation fires before any
//! store or processor access.

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
};
use tower::ServiceExt;

mod common;

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn post_json(uri: &str, token: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn full_application() -> serde_json::Value {
    serde_json::json!({
        "developerType": "backend",
        "experience": 3,
        "languages": ["rust", "go"],
        "address": "1 Main St",
        "phone": "555-0100",
        "portfolio": "https://example.com",
        "otherLinks": "https://blog.example.com",
        "about": "hello"
    })
}

#[tokio::test]
async fn test_application_missing_developer_type() {
    let (app, _state) = common::create_test_app();
    let token = common::create_test_token("user-1", &["member"]);

    let mut payload = full_application();
    payload["developerType"] = serde_json::json!("   ");

    let response = app
        .oneshot(post_json("/api/applications", &token, payload))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"], "invalid_argument");
    assert!(body["details"].as_str().unwrap().contains("developerType"));
}

#[tokio::test]
async fn test_application_negative_experience() {
    let (app, _state) = common::create_test_app();
    let token = common::create_test_token("user-1", &["member"]);

    let mut payload = full_application();
    payload["experience"] = serde_json::json!(-1);

    let response = app
        .oneshot(post_json("/api/applications", &token, payload))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert!(body["details"].as_str().unwrap().contains("experience"));
}

#[tokio::test]
async fn test_application_garbage_experience() {
    let (app, _state) = common::create_test_app();
    let token = common::create_test_token("user-1", &["member"]);

    let mut payload = full_application();
    payload["experience"] = serde_json::json!("abc");

    let response = app
        .oneshot(post_json("/api/applications", &token, payload))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert!(body["details"].as_str().unwrap().contains("experience"));
}

#[tokio::test]
async fn test_application_field_order_first_failure_wins() {
    let (app, _state) = common::create_test_app();
    let token = common::create_test_token("user-1", &["member"]);

    // address and portfolio are both missing; address is checked first
    let mut payload = full_application();
    payload["address"] = serde_json::json!("");
    payload["portfolio"] = serde_json::json!("");

    let response = app
        .oneshot(post_json("/api/applications", &token, payload))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert!(body["details"].as_str().unwrap().contains("address"));
}

#[tokio::test]
async fn test_valid_application_with_zero_experience_reaches_store() {
    let (app, _state) = common::create_test_app();
    let token = common::create_test_token("user-1", &["member"]);

    let mut payload = full_application();
    payload["experience"] = serde_json::json!(0);

    // Validation passes; the offline mock store is the only failure left.
    let response = app
        .oneshot(post_json("/api/applications", &token, payload))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = body_json(response).await;
    assert_eq!(body["error"], "database_error");
}

#[tokio::test]
async fn test_payment_intent_requires_configured_stripe() {
    let (app, _state) = common::create_test_app();
    let token = common::create_test_token("user-1", &["member"]);

    let response = app
        .oneshot(post_json(
            "/api/payments/intents",
            &token,
            serde_json::json!({"productId": "donation", "amount": 500}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::PRECONDITION_FAILED);
    let body = body_json(response).await;
    assert_eq!(body["error"], "failed_precondition");
}

#[tokio::test]
async fn test_payment_intent_rejects_bad_amounts() {
    let (app, _state) = common::create_test_app_with_stripe(Some("sk_test_123"));
    let token = common::create_test_token("user-1", &["member"]);

    for amount in [
        serde_json::json!(0),
        serde_json::json!(-100),
        serde_json::json!(10.5),
    ] {
        let response = app
            .clone()
            .oneshot(post_json(
                "/api/payments/intents",
                &token,
                serde_json::json!({"productId": "donation", "amount": amount}),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "amount {amount}");
    }
}

#[tokio::test]
async fn test_payment_intent_rejects_missing_product() {
    let (app, _state) = common::create_test_app_with_stripe(Some("sk_test_123"));
    let token = common::create_test_token("user-1", &["member"]);

    let response = app
        .oneshot(post_json(
            "/api/payments/intents",
            &token,
            serde_json::json!({"amount": 500}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert!(body["details"].as_str().unwrap().contains("productId"));
}

#[tokio::test]
async fn test_confirm_donation_requires_intent_id() {
    let (app, _state) = common::create_test_app_with_stripe(Some("sk_test_123"));
    let token = common::create_test_token("user-1", &["member"]);

    let response = app
        .oneshot(post_json(
            "/api/donations/confirm",
            &token,
            serde_json::json!({"paymentIntentId": "  "}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert!(body["details"].as_str().unwrap().contains("paymentIntentId"));
}
