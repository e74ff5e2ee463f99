//! HTTP handlers for payout-service.

pub mod stripe;

use crate::services::get_metrics;
use crate::startup::AppState;
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use service_core::error::AppError;

/// Liveness plus a summary of the provider credential.
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({
            "status": "ok",
            "service": state.config.service_name,
            "version": env!("CARGO_PKG_VERSION"),
            "stripe": {
                "configured": state.stripe.is_configured(),
                "mode": state.config.stripe.mode().as_str(),
            }
        })),
    )
}

/// Ready only when reconciliation requests can reach Stripe.
pub async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    if state.stripe.is_configured() {
        (StatusCode::OK, Json(json!({ "status": "ready" })))
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "status": "not_ready",
                "reason": "STRIPE_SECRET_KEY is not configured"
            })),
        )
    }
}

pub async fn metrics() -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        get_metrics(),
    )
}

/// CORS preflight: headers come from the CORS middleware, the body stays empty.
pub async fn preflight() -> StatusCode {
    StatusCode::OK
}

pub async fn method_not_allowed() -> AppError {
    AppError::MethodNotAllowed("Method not allowed. Use POST.".to_string())
}

/// 405 for the operational GET routes.
pub async fn get_method_not_allowed() -> AppError {
    AppError::MethodNotAllowed("Method not allowed. Use GET.".to_string())
}

pub async fn not_found() -> AppError {
    AppError::NotFound(anyhow::anyhow!("No route"))
}
