//! Request and response bodies of the reconciliation endpoints.

use crate::models::{BalanceSummary, PayoutListing, PayoutRecord, PayoutStatistics, PayoutSummary};
use crate::services::FailureDetail;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use validator::Validate;

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AccountRequest {
    #[validate(required, length(min = 1, message = "stripeAccountId cannot be empty"))]
    pub stripe_account_id: Option<String>,
}

/// Why a request body was refused before reaching an operation.
#[derive(Debug, PartialEq, Eq)]
pub enum BodyRejection {
    /// Not JSON, or JSON of the wrong shape.
    Malformed(String),
    /// Well-formed, but without a usable account id.
    MissingAccount,
}

impl AccountRequest {
    /// Decode and validate a raw request body.
    ///
    /// An empty body counts as a missing account id rather than as bad JSON.
    pub fn from_body(body: &[u8]) -> Result<Self, BodyRejection> {
        let request: Self = if body.iter().all(u8::is_ascii_whitespace) {
            Self::default()
        } else {
            serde_json::from_slice(body)
                .map_err(|e| BodyRejection::Malformed(format!("Invalid JSON body: {}", e)))?
        };

        request.validate().map_err(|e| {
            tracing::debug!(errors = %e, "Account request failed validation");
            BodyRejection::MissingAccount
        })?;

        if request
            .stripe_account_id
            .as_deref()
            .is_some_and(|id| id.trim().is_empty())
        {
            return Err(BodyRejection::MissingAccount);
        }

        Ok(request)
    }

    pub fn account_id(&self) -> &str {
        self.stripe_account_id.as_deref().unwrap_or_default()
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceResponse {
    pub success: bool,
    pub pending_amount: f64,
    pub currency: String,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub mixed_currencies: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_balance: Option<serde_json::Value>,
}

impl BalanceResponse {
    pub fn new(summary: BalanceSummary, include_raw: bool) -> Self {
        Self {
            success: true,
            pending_amount: summary.pending_amount,
            message: summary.message(),
            currency: summary.currency,
            mixed_currencies: summary.mixed_currencies,
            raw_balance: include_raw.then_some(summary.raw),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PayoutsResponse {
    pub success: bool,
    pub total_paid_out: f64,
    pub currency: String,
    pub payouts_count: usize,
    pub total_transactions_found: usize,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub mixed_currencies: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_response: Option<serde_json::Value>,
}

impl PayoutsResponse {
    pub fn new(summary: PayoutSummary, include_raw: bool) -> Self {
        Self {
            success: true,
            total_paid_out: summary.total_paid_out,
            message: summary.message(),
            currency: summary.currency,
            payouts_count: summary.payouts_count,
            total_transactions_found: summary.total_transactions_found,
            mixed_currencies: summary.mixed_currencies,
            raw_response: include_raw.then_some(summary.raw),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingMetadata {
    pub stripe_account_id: String,
    pub api_call_duration_ms: u64,
    pub total_duration_ms: u64,
    pub timestamp: String,
}

#[derive(Debug, Serialize)]
pub struct ListingResponse {
    pub success: bool,
    pub payouts: Vec<PayoutRecord>,
    pub statistics: PayoutStatistics,
    pub message: String,
    pub metadata: ListingMetadata,
}

impl ListingResponse {
    pub fn new(
        listing: PayoutListing,
        stripe_account_id: &str,
        api_call: Duration,
        total: Duration,
    ) -> Self {
        Self {
            success: true,
            message: format!("{} payouts found", listing.payouts.len()),
            payouts: listing.payouts,
            statistics: listing.statistics,
            metadata: ListingMetadata {
                stripe_account_id: stripe_account_id.trim().to_string(),
                api_call_duration_ms: api_call.as_millis() as u64,
                total_duration_ms: total.as_millis() as u64,
                timestamp: chrono::Utc::now().to_rfc3339(),
            },
        }
    }
}

/// Provider fields echoed back on provider failures.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StripeErrorBody {
    #[serde(rename = "type")]
    pub error_type: String,
    pub code: Option<String>,
    pub param: Option<String>,
    pub decline_code: Option<String>,
    pub request_id: Option<String>,
    pub status_code: Option<u16>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureResponse {
    pub success: bool,
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_network_error: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stripe_error: Option<StripeErrorBody>,
    pub timestamp: String,
    pub duration: String,
}

impl FailureResponse {
    pub fn new(detail: FailureDetail, elapsed: Duration) -> Self {
        let stripe_error = detail.provider_error.map(|e| StripeErrorBody {
            error_type: e.error_type,
            code: e.code,
            param: e.param,
            decline_code: e.decline_code,
            request_id: e.request_id,
            status_code: detail.provider_status,
        });

        Self {
            success: false,
            error: detail.message,
            error_type: Some(detail.error_type.to_string()),
            is_network_error: Some(detail.is_network_error),
            stripe_error,
            timestamp: chrono::Utc::now().to_rfc3339(),
            duration: format_duration(elapsed),
        }
    }
}

pub fn format_duration(elapsed: Duration) -> String {
    format!("{}ms", elapsed.as_millis())
}
