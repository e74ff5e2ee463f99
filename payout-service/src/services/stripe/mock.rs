//! Mock Stripe implementation for testing.

use super::{StripeApi, StripeError};
use crate::models::{
    Balance, BalanceTransactionList, BalanceTransactionQuery, ConnectedAccountId, ProviderPayload,
};
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// Serves canned balances and transaction pages and counts outbound calls.
pub struct MockStripeApi {
    configured: bool,
    balance: Result<Balance, StripeError>,
    transactions: Result<BalanceTransactionList, StripeError>,
    call_count: AtomicU64,
    last_query: Mutex<Option<BalanceTransactionQuery>>,
}

impl MockStripeApi {
    pub fn new() -> Self {
        Self {
            configured: true,
            balance: Ok(Balance {
                available: Vec::new(),
                pending: Vec::new(),
                livemode: false,
            }),
            transactions: Ok(BalanceTransactionList {
                data: Vec::new(),
                has_more: false,
            }),
            call_count: AtomicU64::new(0),
            last_query: Mutex::new(None),
        }
    }

    pub fn unconfigured() -> Self {
        Self {
            configured: false,
            ..Self::new()
        }
    }

    pub fn with_balance(mut self, balance: Balance) -> Self {
        self.balance = Ok(balance);
        self
    }

    pub fn with_transactions(mut self, transactions: BalanceTransactionList) -> Self {
        self.transactions = Ok(transactions);
        self
    }

    /// Make every call fail with `error`.
    pub fn failing(mut self, error: StripeError) -> Self {
        self.balance = Err(error.clone());
        self.transactions = Err(error);
        self
    }

    pub fn call_count(&self) -> u64 {
        self.call_count.load(Ordering::SeqCst)
    }

    pub fn last_query(&self) -> Option<BalanceTransactionQuery> {
        self.last_query
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or(None)
    }
}

impl Default for MockStripeApi {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StripeApi for MockStripeApi {
    fn is_configured(&self) -> bool {
        self.configured
    }

    async fn retrieve_balance(
        &self,
        account: &ConnectedAccountId,
    ) -> Result<ProviderPayload<Balance>, StripeError> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        tracing::info!(stripe_account = %account, "[MOCK] Balance would be retrieved");

        let balance = self.balance.clone()?;
        Ok(ProviderPayload {
            raw: serde_json::json!({
                "object": "balance",
                "pending": balance.pending.iter().map(|p| serde_json::json!({
                    "amount": p.amount,
                    "currency": p.currency,
                })).collect::<Vec<_>>(),
                "livemode": balance.livemode,
            }),
            data: balance,
        })
    }

    async fn list_balance_transactions(
        &self,
        account: &ConnectedAccountId,
        query: &BalanceTransactionQuery,
    ) -> Result<ProviderPayload<BalanceTransactionList>, StripeError> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut last) = self.last_query.lock() {
            *last = Some(query.clone());
        }
        tracing::info!(
            stripe_account = %account,
            kind = %query.kind,
            limit = query.limit,
            "[MOCK] Balance transactions would be listed"
        );

        let list = self.transactions.clone()?;
        Ok(ProviderPayload {
            raw: serde_json::json!({
                "object": "list",
                "data": list.data.iter().map(|t| serde_json::json!({
                    "id": t.id,
                    "type": t.kind,
                    "status": t.status,
                    "amount": t.amount,
                    "currency": t.currency,
                })).collect::<Vec<_>>(),
                "has_more": list.has_more,
            }),
            data: list,
        })
    }
}
