//! Balance and payout reconciliation for connected accounts.
//!
//! Each operation validates the account id, checks that a provider credential
//! exists, makes a single provider call and reduces the answer to a summary.
//! Nothing is cached between calls.

use crate::config::ReconciliationSettings;
use crate::models::{
    minor_to_major, Balance, BalanceSummary, BalanceTransactionList, BalanceTransactionQuery,
    ConnectedAccountId, PayoutListing, PayoutRecord, PayoutStatistics, PayoutSummary,
    ProviderPayload,
};
use crate::services::metrics::record_provider_call;
use crate::services::stripe::{StripeApi, StripeError, StripeErrorDetail};
use std::collections::BTreeSet;
use std::time::{Duration, Instant};
use thiserror::Error;

/// The reconciliation operations exposed over HTTP.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    VerifyBalance,
    VerifyPayouts,
    ListPayouts,
}

impl Operation {
    /// Metric and log label.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::VerifyBalance => "verify_balance",
            Self::VerifyPayouts => "verify_payouts",
            Self::ListPayouts => "list_payouts",
        }
    }

    pub fn missing_account_message(&self) -> &'static str {
        match self {
            Self::VerifyBalance => "stripeAccountId is required to verify balance",
            Self::VerifyPayouts => "stripeAccountId is required to verify payouts",
            Self::ListPayouts => "stripeAccountId is required to list payouts",
        }
    }
}

/// Lowercase substrings that mark a failure as a network problem.
const NETWORK_ERROR_MARKERS: &[&str] = &[
    "timeout",
    "timed out",
    "econnreset",
    "connection reset",
    "enotfound",
    "dns error",
    "failed to lookup address",
    "fetch",
    "error sending request",
];

#[derive(Debug, Error)]
pub enum ReconciliationError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Configuration(String),

    #[error(transparent)]
    Provider(#[from] StripeError),
}

/// Broad failure class, used by the transport layer to choose a status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Validation,
    Configuration,
    Network,
    Provider,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::Configuration => "configuration",
            Self::Network => "network",
            Self::Provider => "provider",
        }
    }
}

/// Everything a caller needs to report a failed operation.
#[derive(Debug, Clone)]
pub struct FailureDetail {
    pub kind: FailureKind,
    pub message: String,
    pub error_type: &'static str,
    pub is_network_error: bool,
    pub provider_status: Option<u16>,
    pub provider_error: Option<StripeErrorDetail>,
}

impl FailureDetail {
    /// Shared classification for every reconciliation operation.
    pub fn classify(err: &ReconciliationError) -> Self {
        match err {
            ReconciliationError::Validation(message) => Self {
                kind: FailureKind::Validation,
                message: message.clone(),
                error_type: "ValidationError",
                is_network_error: false,
                provider_status: None,
                provider_error: None,
            },
            ReconciliationError::Configuration(message) => Self {
                kind: FailureKind::Configuration,
                message: message.clone(),
                error_type: "ConfigurationError",
                is_network_error: false,
                provider_status: None,
                provider_error: None,
            },
            ReconciliationError::Provider(StripeError::NotConfigured) => Self {
                kind: FailureKind::Configuration,
                message: StripeError::NotConfigured.to_string(),
                error_type: "ConfigurationError",
                is_network_error: false,
                provider_status: None,
                provider_error: None,
            },
            ReconciliationError::Provider(provider) => {
                let message = provider.to_string();
                let is_network_error = match provider {
                    StripeError::Transport {
                        timeout, connect, ..
                    } => *timeout || *connect || is_network_message(&message),
                    _ => is_network_message(&message),
                };
                Self {
                    kind: if is_network_error {
                        FailureKind::Network
                    } else {
                        FailureKind::Provider
                    },
                    message,
                    error_type: provider.error_name(),
                    is_network_error,
                    provider_status: provider.status_code(),
                    provider_error: provider.detail().cloned(),
                }
            }
        }
    }
}

/// Message-based heuristic for network failures.
pub fn is_network_message(message: &str) -> bool {
    let lowered = message.to_lowercase();
    NETWORK_ERROR_MARKERS
        .iter()
        .any(|marker| lowered.contains(marker))
}

/// Pending (not yet settled) balance of a connected account.
pub async fn verify_balance(
    api: &dyn StripeApi,
    settings: &ReconciliationSettings,
    stripe_account_id: &str,
) -> Result<BalanceSummary, ReconciliationError> {
    let account = prepare(api, Operation::VerifyBalance, stripe_account_id)?;

    tracing::info!(stripe_account = %account, "Retrieving connected account balance");

    let (payload, _) =
        call_provider(Operation::VerifyBalance, &account, api.retrieve_balance(&account)).await?;

    let summary = summarize_balance(payload, &settings.default_currency);
    if summary.mixed_currencies {
        tracing::warn!(
            stripe_account = %account,
            currency = %summary.currency,
            "Pending balance spans several currencies; amounts were summed as-is"
        );
    }

    tracing::info!(
        stripe_account = %account,
        pending_minor = summary.pending_minor,
        pending_amount = summary.pending_amount,
        currency = %summary.currency,
        pending_entries = summary.pending_entries,
        "Pending balance computed"
    );

    Ok(summary)
}

/// Total already paid out, from the most recent payout ledger entries.
pub async fn verify_payouts(
    api: &dyn StripeApi,
    settings: &ReconciliationSettings,
    stripe_account_id: &str,
) -> Result<PayoutSummary, ReconciliationError> {
    let account = prepare(api, Operation::VerifyPayouts, stripe_account_id)?;
    let query = BalanceTransactionQuery::payouts(settings.payout_limit);

    tracing::info!(
        stripe_account = %account,
        limit = query.limit,
        "Listing connected account payout transactions"
    );

    let (payload, _) = call_provider(
        Operation::VerifyPayouts,
        &account,
        api.list_balance_transactions(&account, &query),
    )
    .await?;

    if payload.data.has_more {
        tracing::debug!(
            stripe_account = %account,
            limit = query.limit,
            "More payout transactions exist beyond the first page; they are not summed"
        );
    }

    let summary = summarize_payouts(payload, &settings.default_currency);
    if summary.mixed_currencies {
        tracing::warn!(
            stripe_account = %account,
            currency = %summary.currency,
            "Settled payouts span several currencies; amounts were summed as-is"
        );
    }

    tracing::info!(
        stripe_account = %account,
        total_paid_out_minor = summary.total_paid_out_minor,
        total_paid_out = summary.total_paid_out,
        currency = %summary.currency,
        payouts_count = summary.payouts_count,
        total_transactions_found = summary.total_transactions_found,
        "Payout total computed"
    );

    Ok(summary)
}

/// Recent payouts with per-row settlement state and aggregate statistics.
pub async fn list_payouts(
    api: &dyn StripeApi,
    settings: &ReconciliationSettings,
    stripe_account_id: &str,
) -> Result<(PayoutListing, Duration), ReconciliationError> {
    let account = prepare(api, Operation::ListPayouts, stripe_account_id)?;
    let query = BalanceTransactionQuery::payouts(settings.listing_limit);

    let (payload, elapsed) = call_provider(
        Operation::ListPayouts,
        &account,
        api.list_balance_transactions(&account, &query),
    )
    .await?;

    let listing = summarize_listing(&payload.data, &settings.default_currency);

    tracing::info!(
        stripe_account = %account,
        total = listing.statistics.total,
        completed = listing.statistics.completed,
        pending = listing.statistics.pending,
        "Payout listing computed"
    );

    Ok((listing, elapsed))
}

/// Input validation first, then credentials; neither touches the network.
fn prepare(
    api: &dyn StripeApi,
    operation: Operation,
    stripe_account_id: &str,
) -> Result<ConnectedAccountId, ReconciliationError> {
    let account = ConnectedAccountId::parse(stripe_account_id).ok_or_else(|| {
        tracing::warn!(operation = operation.as_str(), "Request without stripeAccountId");
        ReconciliationError::Validation(operation.missing_account_message().to_string())
    })?;

    if !api.is_configured() {
        tracing::error!(
            operation = operation.as_str(),
            stripe_account = %account,
            "STRIPE_SECRET_KEY is not configured"
        );
        return Err(ReconciliationError::Configuration(
            "Stripe configuration not found".to_string(),
        ));
    }

    Ok(account)
}

async fn call_provider<T, F>(
    operation: Operation,
    account: &ConnectedAccountId,
    call: F,
) -> Result<(T, Duration), ReconciliationError>
where
    F: std::future::Future<Output = Result<T, StripeError>>,
{
    let started = Instant::now();
    let result = call.await;
    let elapsed = started.elapsed();

    match result {
        Ok(value) => {
            record_provider_call(operation.as_str(), "success", elapsed);
            tracing::info!(
                operation = operation.as_str(),
                stripe_account = %account,
                duration_ms = elapsed.as_millis() as u64,
                "Stripe call completed"
            );
            Ok((value, elapsed))
        }
        Err(err) => {
            record_provider_call(operation.as_str(), "error", elapsed);
            let err = ReconciliationError::from(err);
            log_failure(operation, account, &err, elapsed);
            Err(err)
        }
    }
}

fn log_failure(
    operation: Operation,
    account: &ConnectedAccountId,
    err: &ReconciliationError,
    elapsed: Duration,
) {
    let detail = FailureDetail::classify(err);
    let provider = detail.provider_error.as_ref();

    tracing::error!(
        operation = operation.as_str(),
        stripe_account = %account,
        error_type = detail.error_type,
        error_message = %detail.message,
        is_network_error = detail.is_network_error,
        status_code = ?detail.provider_status,
        stripe_error_type = ?provider.map(|p| p.error_type.as_str()),
        stripe_code = ?provider.and_then(|p| p.code.as_deref()),
        stripe_param = ?provider.and_then(|p| p.param.as_deref()),
        stripe_decline_code = ?provider.and_then(|p| p.decline_code.as_deref()),
        stripe_request_id = ?provider.and_then(|p| p.request_id.as_deref()),
        duration_ms = elapsed.as_millis() as u64,
        "Stripe call failed"
    );
}

/// Sum every pending entry; the reported currency is the last one seen.
pub fn summarize_balance(payload: ProviderPayload<Balance>, default_currency: &str) -> BalanceSummary {
    let mut total: i64 = 0;
    let mut currency = default_currency.to_string();
    let mut seen = BTreeSet::new();

    for (index, entry) in payload.data.pending.iter().enumerate() {
        tracing::debug!(
            index,
            amount = entry.amount,
            currency = %entry.currency,
            "Pending balance entry"
        );
        total += entry.amount;
        currency = entry.currency.clone();
        seen.insert(entry.currency.to_lowercase());
    }

    BalanceSummary {
        pending_minor: total,
        pending_amount: minor_to_major(total),
        currency,
        pending_entries: payload.data.pending.len(),
        mixed_currencies: seen.len() > 1,
        raw: payload.raw,
    }
}

/// Sum `|amount|` over settled payouts; the currency is the last qualifying one.
pub fn summarize_payouts(
    payload: ProviderPayload<BalanceTransactionList>,
    default_currency: &str,
) -> PayoutSummary {
    let mut total: i64 = 0;
    let mut count = 0usize;
    let mut currency = default_currency.to_string();
    let mut seen = BTreeSet::new();

    for transaction in &payload.data.data {
        if transaction.is_settled_payout() {
            total += transaction.amount.abs();
            count += 1;
            currency = transaction.currency.clone();
            seen.insert(transaction.currency.to_lowercase());
            tracing::debug!(
                id = %transaction.id,
                amount = transaction.amount,
                currency = %transaction.currency,
                "Settled payout counted"
            );
        } else {
            tracing::debug!(
                id = %transaction.id,
                kind = %transaction.kind,
                status = %transaction.status,
                "Transaction skipped"
            );
        }
    }

    PayoutSummary {
        total_paid_out_minor: total,
        total_paid_out: minor_to_major(total),
        currency,
        payouts_count: count,
        total_transactions_found: payload.data.data.len(),
        mixed_currencies: seen.len() > 1,
        raw: payload.raw,
    }
}

/// Map every row for display and aggregate the payout rows.
pub fn summarize_listing(list: &BalanceTransactionList, default_currency: &str) -> PayoutListing {
    let mut total = 0usize;
    let mut total_minor: i64 = 0;
    let mut completed = 0usize;
    let mut pending = 0usize;
    let mut currency = default_currency.to_string();

    for transaction in list.data.iter().filter(|t| t.is_payout()) {
        total += 1;
        total_minor += transaction.amount.abs();
        currency = transaction.currency.clone();
        if transaction.is_settled_payout() {
            completed += 1;
        } else {
            pending += 1;
        }
    }

    PayoutListing {
        payouts: list.data.iter().map(PayoutRecord::from).collect(),
        statistics: PayoutStatistics {
            total,
            total_amount: minor_to_major(total_minor),
            pending,
            completed,
            currency,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BalanceAmount, BalanceTransaction, PayoutState};
    use crate::services::stripe::MockStripeApi;

    fn settings() -> ReconciliationSettings {
        ReconciliationSettings::default()
    }

    fn pending(amount: i64, currency: &str) -> BalanceAmount {
        BalanceAmount {
            amount,
            currency: currency.to_string(),
            source_types: None,
        }
    }

    fn txn(id: &str, kind: &str, status: &str, amount: i64, currency: &str) -> BalanceTransaction {
        BalanceTransaction {
            id: id.to_string(),
            kind: kind.to_string(),
            status: status.to_string(),
            amount,
            currency: currency.to_string(),
            created: 1_700_000_000,
            available_on: Some(1_700_086_400),
            description: Some("STRIPE PAYOUT".to_string()),
            net: Some(amount),
            fee: Some(0),
            source: Some(format!("po_{}", id)),
        }
    }

    fn balance(entries: Vec<BalanceAmount>) -> Balance {
        Balance {
            available: Vec::new(),
            pending: entries,
            livemode: false,
        }
    }

    fn page(data: Vec<BalanceTransaction>) -> BalanceTransactionList {
        BalanceTransactionList {
            data,
            has_more: false,
        }
    }

    fn mixed_batch() -> BalanceTransactionList {
        page(vec![
            txn("1", "payout", "available", -5000, "brl"),
            txn("2", "payout", "pending", -2000, "brl"),
            txn("3", "payout", "available", -1500, "usd"),
        ])
    }

    #[tokio::test]
    async fn pending_amount_is_sum_over_pending_bucket() {
        let api = MockStripeApi::new().with_balance(balance(vec![
            pending(10_000, "brl"),
            pending(2_550, "brl"),
        ]));

        let summary = verify_balance(&api, &settings(), "acct_123").await.unwrap();

        assert_eq!(summary.pending_minor, 12_550);
        assert_eq!(summary.pending_amount, 125.5);
        assert_eq!(summary.currency, "brl");
        assert_eq!(summary.pending_entries, 2);
        assert!(!summary.mixed_currencies);
        assert_eq!(summary.message(), "Pending balance: 125.5 BRL");
        assert_eq!(api.call_count(), 1);
    }

    #[tokio::test]
    async fn balance_currency_is_last_pending_entry() {
        let api = MockStripeApi::new()
            .with_balance(balance(vec![pending(100, "brl"), pending(200, "usd")]));

        let summary = verify_balance(&api, &settings(), "acct_123").await.unwrap();

        assert_eq!(summary.pending_minor, 300);
        assert_eq!(summary.currency, "usd");
        assert!(summary.mixed_currencies);
    }

    #[tokio::test]
    async fn empty_pending_bucket_reports_zero_in_default_currency() {
        let api = MockStripeApi::new();

        let summary = verify_balance(&api, &settings(), "acct_123").await.unwrap();

        assert_eq!(summary.pending_amount, 0.0);
        assert_eq!(summary.currency, "brl");
        assert_eq!(summary.pending_entries, 0);
    }

    #[tokio::test]
    async fn missing_account_id_makes_no_provider_call() {
        let api = MockStripeApi::new();

        for id in ["", "   "] {
            let err = verify_balance(&api, &settings(), id).await.unwrap_err();
            assert!(matches!(err, ReconciliationError::Validation(_)));

            let err = verify_payouts(&api, &settings(), id).await.unwrap_err();
            assert!(matches!(err, ReconciliationError::Validation(_)));
        }

        assert_eq!(api.call_count(), 0);
    }

    #[tokio::test]
    async fn validation_precedes_configuration() {
        let api = MockStripeApi::unconfigured();

        let err = verify_balance(&api, &settings(), "").await.unwrap_err();
        assert!(matches!(err, ReconciliationError::Validation(_)));
    }

    #[tokio::test]
    async fn missing_credential_is_configuration_error() {
        let api = MockStripeApi::unconfigured();

        let err = verify_payouts(&api, &settings(), "acct_123").await.unwrap_err();

        assert!(matches!(err, ReconciliationError::Configuration(_)));
        let detail = FailureDetail::classify(&err);
        assert_eq!(detail.kind, FailureKind::Configuration);
        assert_eq!(detail.error_type, "ConfigurationError");
        assert_eq!(api.call_count(), 0);
    }

    #[tokio::test]
    async fn payout_total_counts_only_settled_payouts() {
        let api = MockStripeApi::new().with_transactions(page(vec![
            txn("1", "payout", "available", -5000, "brl"),
            txn("2", "payout", "pending", -2000, "brl"),
            txn("3", "payout_cancel", "available", 700, "brl"),
            txn("4", "payout", "available", -1000, "brl"),
        ]));

        let summary = verify_payouts(&api, &settings(), "acct_123").await.unwrap();

        assert_eq!(summary.total_paid_out_minor, 6000);
        assert_eq!(summary.total_paid_out, 60.0);
        assert_eq!(summary.payouts_count, 2);
        assert_eq!(summary.total_transactions_found, 4);
        assert!(summary.payouts_count <= summary.total_transactions_found);
        assert_eq!(summary.message(), "Total paid out: 60.00 BRL across 2 payouts");
    }

    #[tokio::test]
    async fn payout_query_requests_first_hundred_payouts() {
        let api = MockStripeApi::new();

        verify_payouts(&api, &settings(), "acct_123").await.unwrap();

        assert_eq!(api.last_query(), Some(BalanceTransactionQuery::payouts(100)));
    }

    #[tokio::test]
    async fn mixed_currency_batch_is_summed_naively_and_flagged() {
        let api = MockStripeApi::new().with_transactions(mixed_batch());

        let summary = verify_payouts(&api, &settings(), "acct_123").await.unwrap();

        assert_eq!(summary.payouts_count, 2);
        assert_eq!(summary.total_transactions_found, 3);
        assert_eq!(summary.total_paid_out_minor, 6500);
        assert_eq!(summary.total_paid_out, 65.0);
        assert_eq!(summary.currency, "usd");
        assert!(summary.mixed_currencies);
    }

    #[tokio::test]
    async fn repeated_calls_return_identical_results() {
        let api = MockStripeApi::new()
            .with_balance(balance(vec![pending(4200, "brl")]))
            .with_transactions(mixed_batch());

        let first = verify_balance(&api, &settings(), "acct_123").await.unwrap();
        let second = verify_balance(&api, &settings(), "acct_123").await.unwrap();
        assert_eq!(first, second);

        let first = verify_payouts(&api, &settings(), "acct_123").await.unwrap();
        let second = verify_payouts(&api, &settings(), "acct_123").await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn econnreset_is_flagged_as_network_error() {
        let api = MockStripeApi::new().failing(StripeError::Transport {
            message: "read ECONNRESET".to_string(),
            timeout: false,
            connect: false,
        });

        let err = verify_balance(&api, &settings(), "acct_123").await.unwrap_err();
        let detail = FailureDetail::classify(&err);

        assert!(detail.is_network_error);
        assert_eq!(detail.kind, FailureKind::Network);
        assert_eq!(detail.error_type, "StripeConnectionError");
    }

    #[tokio::test]
    async fn provider_business_error_keeps_its_fields() {
        let api = MockStripeApi::new().failing(StripeError::Api {
            status: 403,
            detail: StripeErrorDetail {
                error_type: "invalid_request_error".to_string(),
                code: Some("account_invalid".to_string()),
                message: "The provided key does not have access to account 'acct_x'".to_string(),
                param: None,
                decline_code: None,
                request_id: Some("req_123".to_string()),
            },
            should_retry: None,
            retry_after: None,
        });

        let err = verify_payouts(&api, &settings(), "acct_x").await.unwrap_err();
        let detail = FailureDetail::classify(&err);

        assert!(!detail.is_network_error);
        assert_eq!(detail.kind, FailureKind::Provider);
        assert_eq!(detail.error_type, "StripePermissionError");
        assert_eq!(detail.provider_status, Some(403));
        assert_eq!(
            detail.provider_error.unwrap().request_id.as_deref(),
            Some("req_123")
        );
    }

    #[test]
    fn both_operations_share_the_classification() {
        let err = ReconciliationError::Provider(StripeError::Transport {
            message: "operation timed out".to_string(),
            timeout: true,
            connect: false,
        });
        let detail = FailureDetail::classify(&err);
        assert!(detail.is_network_error);

        let err = ReconciliationError::Provider(StripeError::Decode("missing field".to_string()));
        let detail = FailureDetail::classify(&err);
        assert!(!detail.is_network_error);
        assert_eq!(detail.error_type, "StripeDecodeError");
    }

    #[test]
    fn network_heuristic_matches_known_markers() {
        assert!(is_network_message("Request timeout after 15000ms"));
        assert!(is_network_message("getaddrinfo ENOTFOUND api.stripe.com"));
        assert!(is_network_message("error sending request for url"));
        assert!(is_network_message("fetch failed"));
        assert!(!is_network_message("No such account: 'acct_x'"));
    }

    #[tokio::test]
    async fn listing_maps_rows_and_aggregates_payouts() {
        let api = MockStripeApi::new().with_transactions(mixed_batch());

        let (listing, _) = list_payouts(&api, &settings(), "acct_123").await.unwrap();

        assert_eq!(api.last_query(), Some(BalanceTransactionQuery::payouts(10)));
        assert_eq!(listing.payouts.len(), 3);
        assert_eq!(listing.payouts[0].id, "po_1");
        assert_eq!(listing.payouts[0].amount, 50.0);
        assert_eq!(listing.payouts[0].status, PayoutState::Paid);
        assert_eq!(listing.payouts[1].status, PayoutState::Pending);
        assert_eq!(listing.statistics.total, 3);
        assert_eq!(listing.statistics.completed, 2);
        assert_eq!(listing.statistics.pending, 1);
        assert_eq!(listing.statistics.total_amount, 85.0);
        assert_eq!(listing.statistics.currency, "usd");
    }
}
