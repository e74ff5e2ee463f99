pub mod metrics;
pub mod reconciliation;
pub mod stripe;

pub use metrics::{get_metrics, init_metrics};
pub use reconciliation::{
    list_payouts, verify_balance, verify_payouts, FailureDetail, FailureKind, Operation,
    ReconciliationError,
};
pub use stripe::{MockStripeApi, StripeApi, StripeClient, StripeError};
