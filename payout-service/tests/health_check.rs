mod common;

use common::{balance_body, TestApp, TEST_ACCOUNT_ID};
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

#[tokio::test]
async fn health_check_reports_stripe_mode() {
    let app = TestApp::spawn().await;

    let response = app
        .client
        .get(format!("{}/health", app.http_address))
        .send()
        .await
        .expect("Failed to execute request");

    assert!(response.status().is_success());
    assert_eq!(
        response.headers()["access-control-allow-methods"],
        "GET, OPTIONS"
    );

    let body: serde_json::Value = response.json().await.expect("Failed to parse JSON");
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "payout-service");
    assert_eq!(body["stripe"]["configured"], true);
    assert_eq!(body["stripe"]["mode"], "test");
}

#[tokio::test]
async fn readiness_check_works() {
    let app = TestApp::spawn().await;

    let response = app
        .client
        .get(format!("{}/ready", app.http_address))
        .send()
        .await
        .expect("Failed to execute request");

    assert!(response.status().is_success());
}

#[tokio::test]
async fn readiness_fails_without_secret_key() {
    let app = TestApp::spawn_unconfigured().await;

    let response = app
        .client
        .get(format!("{}/ready", app.http_address))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status().as_u16(), 503);
    let body: serde_json::Value = response.json().await.expect("Failed to parse JSON");
    assert_eq!(body["status"], "not_ready");
}

#[tokio::test]
async fn metrics_endpoint_exposes_request_counters() {
    let app = TestApp::spawn().await;

    Mock::given(method("GET"))
        .and(path("/v1/balance"))
        .respond_with(ResponseTemplate::new(200).set_body_json(balance_body(&[(1_000, "brl")])))
        .mount(&app.stripe_server)
        .await;

    let response = app
        .post_json(
            "/api/stripe/verify-balance",
            json!({ "stripeAccountId": TEST_ACCOUNT_ID }),
        )
        .await;
    assert!(response.status().is_success());

    let response = app
        .client
        .get(format!("{}/metrics", app.http_address))
        .send()
        .await
        .expect("Failed to execute request");

    assert!(response.status().is_success());
    let content_type = response.headers()["content-type"].to_str().unwrap().to_string();
    assert!(content_type.starts_with("text/plain"));

    let body = response.text().await.expect("Failed to read metrics body");
    assert!(body.contains("reconciliation_requests_total"));
    assert!(body.contains("http_requests_total"));
    assert!(body.contains("stripe_api_calls_total"));
}
