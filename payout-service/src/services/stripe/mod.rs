//! Stripe provider abstraction.
//!
//! The reconciliation operations only see [`StripeApi`], so tests swap the
//! HTTP client for [`MockStripeApi`] without touching the environment.

pub mod client;
pub mod mock;

use crate::models::{
    Balance, BalanceTransactionList, BalanceTransactionQuery, ConnectedAccountId, ProviderPayload,
};
use async_trait::async_trait;
use serde::Deserialize;
use service_core::retry::Retryable;
use std::time::Duration;
use thiserror::Error;

pub use client::StripeClient;
pub use mock::MockStripeApi;

/// Error fields Stripe reports for a failed request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct StripeErrorDetail {
    #[serde(rename = "type", default)]
    pub error_type: String,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub param: Option<String>,
    #[serde(default)]
    pub decline_code: Option<String>,
    /// Filled from the `Request-Id` response header.
    #[serde(skip)]
    pub request_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct StripeErrorEnvelope {
    pub error: StripeErrorDetail,
}

#[derive(Debug, Clone, Error)]
pub enum StripeError {
    #[error("Stripe credentials not configured")]
    NotConfigured,

    /// The request never produced an HTTP response.
    #[error("{message}")]
    Transport {
        message: String,
        timeout: bool,
        connect: bool,
    },

    /// Stripe answered with a non-success status.
    #[error("{}", .detail.message)]
    Api {
        status: u16,
        detail: StripeErrorDetail,
        should_retry: Option<bool>,
        retry_after: Option<Duration>,
    },

    #[error("Unexpected Stripe response: {0}")]
    Decode(String),
}

impl StripeError {
    /// Name of the matching error class in Stripe's own SDKs.
    pub fn error_name(&self) -> &'static str {
        match self {
            StripeError::NotConfigured => "ConfigurationError",
            StripeError::Transport { .. } => "StripeConnectionError",
            StripeError::Decode(_) => "StripeDecodeError",
            StripeError::Api { status, detail, .. } => match (*status, detail.error_type.as_str()) {
                (401, _) | (_, "authentication_error") => "StripeAuthenticationError",
                (403, _) => "StripePermissionError",
                (429, _) | (_, "rate_limit_error") => "StripeRateLimitError",
                (_, "card_error") => "StripeCardError",
                (_, "idempotency_error") => "StripeIdempotencyError",
                (_, "invalid_request_error") => "StripeInvalidRequestError",
                _ => "StripeAPIError",
            },
        }
    }

    pub fn detail(&self) -> Option<&StripeErrorDetail> {
        match self {
            StripeError::Api { detail, .. } => Some(detail),
            _ => None,
        }
    }

    pub fn status_code(&self) -> Option<u16> {
        match self {
            StripeError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl Retryable for StripeError {
    fn is_retryable(&self) -> bool {
        match self {
            StripeError::Transport { .. } => true,
            StripeError::Api {
                status,
                should_retry,
                ..
            } => should_retry.unwrap_or(*status == 409 || *status == 429 || *status >= 500),
            StripeError::NotConfigured | StripeError::Decode(_) => false,
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            StripeError::Api { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

/// The slice of the Stripe API the reconciliation flow depends on.
#[async_trait]
pub trait StripeApi: Send + Sync {
    /// Whether a secret key is available.
    fn is_configured(&self) -> bool;

    /// `GET /v1/balance` on behalf of `account`.
    async fn retrieve_balance(
        &self,
        account: &ConnectedAccountId,
    ) -> Result<ProviderPayload<Balance>, StripeError>;

    /// `GET /v1/balance_transactions` on behalf of `account`.
    async fn list_balance_transactions(
        &self,
        account: &ConnectedAccountId,
        query: &BalanceTransactionQuery,
    ) -> Result<ProviderPayload<BalanceTransactionList>, StripeError>;
}
