//! Stripe REST client.
//!
//! Every call carries the platform secret key plus the `Stripe-Account` header
//! of the connected account it acts for. Calls are bounded by the configured
//! timeout and retried on transient failures.

use super::{StripeApi, StripeError, StripeErrorDetail, StripeErrorEnvelope};
use crate::config::StripeConfig;
use crate::models::{
    Balance, BalanceTransactionList, BalanceTransactionQuery, ConnectedAccountId, ProviderPayload,
};
use anyhow::Result;
use async_trait::async_trait;
use reqwest::{header::HeaderMap, Client};
use secrecy::ExposeSecret;
use serde::de::DeserializeOwned;
use service_core::retry::retry_call;
use std::time::Duration;

const STRIPE_ACCOUNT_HEADER: &str = "Stripe-Account";
const STRIPE_VERSION_HEADER: &str = "Stripe-Version";
const REQUEST_ID_HEADER: &str = "request-id";
const SHOULD_RETRY_HEADER: &str = "stripe-should-retry";

/// Stripe client for the balance endpoints.
#[derive(Clone)]
pub struct StripeClient {
    client: Client,
    config: StripeConfig,
}

impl StripeClient {
    /// Create a new Stripe client bounded by `config.timeout`.
    pub fn new(config: StripeConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("payout-service/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { client, config })
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
        account: &ConnectedAccountId,
    ) -> Result<ProviderPayload<T>, StripeError> {
        let secret_key = self
            .config
            .secret_key
            .as_ref()
            .filter(|_| self.config.is_configured())
            .ok_or(StripeError::NotConfigured)?;

        let url = format!("{}{}", self.config.api_base_url, path);

        let mut request = self
            .client
            .get(&url)
            .bearer_auth(secret_key.expose_secret())
            .header(STRIPE_ACCOUNT_HEADER, account.as_str())
            .query(query);
        if let Some(version) = &self.config.api_version {
            request = request.header(STRIPE_VERSION_HEADER, version);
        }

        let response = request.send().await.map_err(transport_error)?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response.text().await.map_err(transport_error)?;

        tracing::debug!(
            status = %status,
            path = %path,
            stripe_account = %account,
            request_id = ?header_str(&headers, REQUEST_ID_HEADER),
            "Stripe response received"
        );

        if status.is_success() {
            let raw: serde_json::Value =
                serde_json::from_str(&body).map_err(|e| StripeError::Decode(e.to_string()))?;
            let data: T = serde_json::from_value(raw.clone())
                .map_err(|e| StripeError::Decode(e.to_string()))?;
            Ok(ProviderPayload { data, raw })
        } else {
            let mut detail = serde_json::from_str::<StripeErrorEnvelope>(&body)
                .map(|envelope| envelope.error)
                .unwrap_or_else(|_| StripeErrorDetail {
                    error_type: "api_error".to_string(),
                    message: if body.is_empty() {
                        format!("Stripe returned HTTP {}", status.as_u16())
                    } else {
                        body.clone()
                    },
                    ..Default::default()
                });
            detail.request_id = header_str(&headers, REQUEST_ID_HEADER).map(str::to_string);

            Err(StripeError::Api {
                status: status.as_u16(),
                detail,
                should_retry: header_str(&headers, SHOULD_RETRY_HEADER)
                    .and_then(|v| v.parse::<bool>().ok()),
                retry_after: header_str(&headers, reqwest::header::RETRY_AFTER.as_str())
                    .and_then(|v| v.parse::<u64>().ok())
                    .map(Duration::from_secs),
            })
        }
    }
}

#[async_trait]
impl StripeApi for StripeClient {
    fn is_configured(&self) -> bool {
        self.config.is_configured()
    }

    async fn retrieve_balance(
        &self,
        account: &ConnectedAccountId,
    ) -> Result<ProviderPayload<Balance>, StripeError> {
        retry_call(&self.config.retry, "stripe.balance.retrieve", || {
            self.get::<Balance>("/v1/balance", &[], account)
        })
        .await
    }

    async fn list_balance_transactions(
        &self,
        account: &ConnectedAccountId,
        query: &BalanceTransactionQuery,
    ) -> Result<ProviderPayload<BalanceTransactionList>, StripeError> {
        let params = [
            ("type", query.kind.clone()),
            ("limit", query.limit.to_string()),
        ];
        retry_call(&self.config.retry, "stripe.balance_transactions.list", || {
            self.get::<BalanceTransactionList>("/v1/balance_transactions", &params, account)
        })
        .await
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Flatten a transport failure, including its causes, into one message.
fn transport_error(err: reqwest::Error) -> StripeError {
    let mut message = err.to_string();
    let mut source = std::error::Error::source(&err);
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }

    StripeError::Transport {
        message,
        timeout: err.is_timeout(),
        connect: err.is_connect(),
    }
}
