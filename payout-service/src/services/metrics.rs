use metrics::{counter, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use service_core::error::AppError;
use std::sync::{Mutex, OnceLock};
use std::time::Duration;

pub static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

static INSTALL_LOCK: Mutex<()> = Mutex::new(());

/// Install the Prometheus recorder. Safe to call more than once, from any thread.
pub fn init_metrics() -> Result<(), AppError> {
    if METRICS_HANDLE.get().is_some() {
        return Ok(());
    }

    let _guard = INSTALL_LOCK
        .lock()
        .map_err(|_| AppError::InternalError(anyhow::anyhow!("metrics install lock poisoned")))?;
    if METRICS_HANDLE.get().is_some() {
        return Ok(());
    }

    let handle = PrometheusBuilder::new().install_recorder().map_err(|e| {
        AppError::InternalError(anyhow::anyhow!("failed to install Prometheus recorder: {}", e))
    })?;

    let _ = METRICS_HANDLE.set(handle);
    Ok(())
}

pub fn get_metrics() -> String {
    METRICS_HANDLE
        .get()
        .map(|handle| handle.render())
        .unwrap_or_else(|| "# Metrics recorder not initialized\n".to_string())
}

/// Record one outbound Stripe call.
pub fn record_provider_call(operation: &'static str, outcome: &'static str, elapsed: Duration) {
    counter!(
        "stripe_api_calls_total",
        "operation" => operation,
        "outcome" => outcome
    )
    .increment(1);
    histogram!("stripe_api_call_duration_seconds", "operation" => operation)
        .record(elapsed.as_secs_f64());
}

/// Record the outcome of one reconciliation request.
pub fn record_reconciliation(operation: &'static str, outcome: &'static str) {
    counter!(
        "reconciliation_requests_total",
        "operation" => operation,
        "outcome" => outcome
    )
    .increment(1);
}
