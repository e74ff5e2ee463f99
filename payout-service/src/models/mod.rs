//! Domain models for payout-service.
//!
//! The provider types hold only the subset of Stripe's response fields the
//! reconciliation reads; everything else in the payload is ignored on decode
//! and only survives in the raw JSON kept for diagnostics.

use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Identifiers
// ============================================================================

/// Identifier of a connected (sub-merchant) account at the payment provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectedAccountId(String);

impl ConnectedAccountId {
    /// Accepts any non-blank string; the provider is the authority on validity.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectedAccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Provider payloads
// ============================================================================

/// Typed view of a provider response together with the document it came from.
#[derive(Debug, Clone)]
pub struct ProviderPayload<T> {
    pub data: T,
    pub raw: serde_json::Value,
}

/// One (currency, amount) entry of a balance bucket.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BalanceAmount {
    /// Minor units (cents).
    pub amount: i64,
    pub currency: String,
    #[serde(default)]
    pub source_types: Option<serde_json::Value>,
}

/// Point-in-time balance of a connected account.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Balance {
    #[serde(default)]
    pub available: Vec<BalanceAmount>,
    #[serde(default)]
    pub pending: Vec<BalanceAmount>,
    #[serde(default)]
    pub livemode: bool,
}

/// One ledger entry from the balance-transaction history.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BalanceTransaction {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub status: String,
    /// Minor units; negative for money leaving the account.
    pub amount: i64,
    pub currency: String,
    /// Unix seconds.
    pub created: i64,
    #[serde(default)]
    pub available_on: Option<i64>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub net: Option<i64>,
    #[serde(default)]
    pub fee: Option<i64>,
    /// Id of the object that produced the entry (the payout for payout rows).
    #[serde(default)]
    pub source: Option<String>,
}

pub const PAYOUT_KIND: &str = "payout";
pub const AVAILABLE_STATUS: &str = "available";

impl BalanceTransaction {
    pub fn is_payout(&self) -> bool {
        self.kind == PAYOUT_KIND
    }

    /// Settled payout: the only kind of row that counts towards "paid out".
    pub fn is_settled_payout(&self) -> bool {
        self.is_payout() && self.status == AVAILABLE_STATUS
    }
}

/// A page of balance transactions.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BalanceTransactionList {
    #[serde(default)]
    pub data: Vec<BalanceTransaction>,
    #[serde(default)]
    pub has_more: bool,
}

/// Filter for the balance-transaction list call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalanceTransactionQuery {
    pub kind: String,
    pub limit: u8,
}

impl BalanceTransactionQuery {
    pub fn payouts(limit: u8) -> Self {
        Self {
            kind: PAYOUT_KIND.to_string(),
            limit,
        }
    }
}

// ============================================================================
// Reconciliation results
// ============================================================================

/// Convert integer minor units to a major-unit amount.
pub fn minor_to_major(minor: i64) -> f64 {
    minor as f64 / 100.0
}

/// Pending balance of a connected account.
#[derive(Debug, Clone, PartialEq)]
pub struct BalanceSummary {
    pub pending_minor: i64,
    pub pending_amount: f64,
    pub currency: String,
    pub pending_entries: usize,
    /// The pending bucket held more than one currency and was summed anyway.
    pub mixed_currencies: bool,
    pub raw: serde_json::Value,
}

impl BalanceSummary {
    pub fn message(&self) -> String {
        format!(
            "Pending balance: {} {}",
            self.pending_amount,
            self.currency.to_uppercase()
        )
    }
}

/// Total already paid out from a connected account.
#[derive(Debug, Clone, PartialEq)]
pub struct PayoutSummary {
    pub total_paid_out_minor: i64,
    pub total_paid_out: f64,
    pub currency: String,
    pub payouts_count: usize,
    pub total_transactions_found: usize,
    pub mixed_currencies: bool,
    pub raw: serde_json::Value,
}

impl PayoutSummary {
    pub fn message(&self) -> String {
        format!(
            "Total paid out: {:.2} {} across {} payouts",
            self.total_paid_out,
            self.currency.to_uppercase(),
            self.payouts_count
        )
    }
}

/// Settlement state of a listed payout as the dashboards show it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PayoutState {
    Paid,
    Pending,
}

/// One row of the payout listing.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PayoutRecord {
    pub id: String,
    pub amount: f64,
    pub currency: String,
    pub status: PayoutState,
    pub arrival_date: Option<i64>,
    pub created: i64,
    pub description: Option<String>,
}

impl From<&BalanceTransaction> for PayoutRecord {
    fn from(t: &BalanceTransaction) -> Self {
        Self {
            id: t.source.clone().unwrap_or_else(|| t.id.clone()),
            amount: minor_to_major(t.amount.abs()),
            currency: t.currency.clone(),
            status: if t.status == AVAILABLE_STATUS {
                PayoutState::Paid
            } else {
                PayoutState::Pending
            },
            arrival_date: t.available_on,
            created: t.created,
            description: t.description.clone(),
        }
    }
}

/// Aggregates over the listed payouts.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PayoutStatistics {
    pub total: usize,
    pub total_amount: f64,
    pub pending: usize,
    pub completed: usize,
    pub currency: String,
}

/// Recent payouts of a connected account.
#[derive(Debug, Clone, PartialEq)]
pub struct PayoutListing {
    pub payouts: Vec<PayoutRecord>,
    pub statistics: PayoutStatistics,
}
