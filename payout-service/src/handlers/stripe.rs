//! Reconciliation endpoints.
//!
//! Every handler accepts the raw body so that malformed JSON surfaces as the
//! same `{success:false, ...}` contract as any other validation failure.

use crate::dtos::{
    AccountRequest, BalanceResponse, BodyRejection, FailureResponse, ListingResponse,
    PayoutsResponse,
};
use crate::services::metrics::record_reconciliation;
use crate::services::reconciliation;
use crate::services::{FailureDetail, FailureKind, Operation, ReconciliationError};
use crate::startup::AppState;
use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Extension, Json,
};
use service_core::middleware::tracing::RequestId;
use std::time::Instant;

pub async fn verify_balance(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    body: Bytes,
) -> Response {
    let started = Instant::now();
    let operation = Operation::VerifyBalance;

    let result = match parse_body(operation, &body) {
        Ok(request) => {
            reconciliation::verify_balance(
                state.stripe.as_ref(),
                &state.config.reconciliation,
                request.account_id(),
            )
            .await
        }
        Err(err) => Err(err),
    };

    match result {
        Ok(summary) => {
            let include_raw = state.config.reconciliation.include_raw_payload;
            succeed(operation, &request_id, started, BalanceResponse::new(summary, include_raw))
        }
        Err(err) => fail(operation, &request_id, started, &err),
    }
}

pub async fn verify_payouts(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    body: Bytes,
) -> Response {
    let started = Instant::now();
    let operation = Operation::VerifyPayouts;

    let result = match parse_body(operation, &body) {
        Ok(request) => {
            reconciliation::verify_payouts(
                state.stripe.as_ref(),
                &state.config.reconciliation,
                request.account_id(),
            )
            .await
        }
        Err(err) => Err(err),
    };

    match result {
        Ok(summary) => {
            let include_raw = state.config.reconciliation.include_raw_payload;
            succeed(operation, &request_id, started, PayoutsResponse::new(summary, include_raw))
        }
        Err(err) => fail(operation, &request_id, started, &err),
    }
}

pub async fn list_payouts(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    body: Bytes,
) -> Response {
    let started = Instant::now();
    let operation = Operation::ListPayouts;

    let request = match parse_body(operation, &body) {
        Ok(request) => request,
        Err(err) => return fail(operation, &request_id, started, &err),
    };

    let result = reconciliation::list_payouts(
        state.stripe.as_ref(),
        &state.config.reconciliation,
        request.account_id(),
    )
    .await;

    match result {
        Ok((listing, api_call)) => {
            let body =
                ListingResponse::new(listing, request.account_id(), api_call, started.elapsed());
            succeed(operation, &request_id, started, body)
        }
        Err(err) => fail(operation, &request_id, started, &err),
    }
}

fn parse_body(operation: Operation, body: &[u8]) -> Result<AccountRequest, ReconciliationError> {
    AccountRequest::from_body(body).map_err(|rejection| match rejection {
        BodyRejection::Malformed(message) => ReconciliationError::Validation(message),
        BodyRejection::MissingAccount => {
            ReconciliationError::Validation(operation.missing_account_message().to_string())
        }
    })
}

fn succeed<T: serde::Serialize>(
    operation: Operation,
    request_id: &RequestId,
    started: Instant,
    body: T,
) -> Response {
    record_reconciliation(operation.as_str(), "success");
    tracing::info!(
        request_id = %request_id.as_str(),
        operation = operation.as_str(),
        status = 200,
        duration_ms = started.elapsed().as_millis() as u64,
        "Reconciliation request completed"
    );

    (StatusCode::OK, Json(body)).into_response()
}

fn fail(
    operation: Operation,
    request_id: &RequestId,
    started: Instant,
    err: &ReconciliationError,
) -> Response {
    let detail = FailureDetail::classify(err);
    let status = status_for(detail.kind);
    let elapsed = started.elapsed();

    record_reconciliation(operation.as_str(), detail.kind.as_str());
    tracing::warn!(
        request_id = %request_id.as_str(),
        operation = operation.as_str(),
        status = status.as_u16(),
        error_type = detail.error_type,
        is_network_error = detail.is_network_error,
        duration_ms = elapsed.as_millis() as u64,
        "Reconciliation request failed"
    );

    (status, Json(FailureResponse::new(detail, elapsed))).into_response()
}

/// The dashboards branch on 400 vs 500 only.
fn status_for(kind: FailureKind) -> StatusCode {
    match kind {
        FailureKind::Validation => StatusCode::BAD_REQUEST,
        FailureKind::Configuration | FailureKind::Network | FailureKind::Provider => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}
