//! Prometheus Metrics Module
//!
//! Exposes application metrics via Prometheus format for monitoring.
//!
//! # Metrics Categories
//!
//! - **Bootstrap**: Initialization attempts, retries and ready outcomes
//! - **Feed**: Price fetches by outcome, fetch latency, tracked symbols
//! - **Monitoring**: Active monitors and delivered updates
//!
//! # Integration
//!
//! Metrics are exposed at `/metrics` on the health server port. Recording
//! before [`init_metrics`] is a no-op.

use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

use crate::domain::snapshot::FeedErrorKind;

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// Repeated calls return the handle installed by the first call.
///
/// # Errors
///
/// Returns an error if the global recorder cannot be installed.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    register_metrics();
    Ok(PROMETHEUS_HANDLE.get_or_init(|| handle).clone())
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    // Bootstrap
    describe_counter!(
        "market_data_init_attempts_total",
        "Total market data fetch attempts made during bootstrap"
    );
    describe_counter!(
        "market_data_init_retries_total",
        "Total bootstrap retries scheduled after an unusable fetch"
    );
    describe_counter!(
        "market_data_ready_total",
        "Total bootstrap sequences that reported readiness, by outcome"
    );
    describe_gauge!(
        "market_data_ready",
        "1 once any initializer reported readiness"
    );

    // Feed
    describe_counter!(
        "market_data_fetches_total",
        "Total price fetches by outcome"
    );
    describe_histogram!(
        "market_data_fetch_seconds",
        "Time spent fetching prices from the upstream feed"
    );
    describe_gauge!(
        "market_data_symbols",
        "Number of symbols in the current snapshot"
    );

    // Monitoring
    describe_gauge!(
        "market_data_monitors_active",
        "Number of active market data monitors"
    );
    describe_counter!(
        "market_data_updates_delivered_total",
        "Total snapshot updates delivered to observers"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// How a bootstrap sequence reached readiness.
#[derive(Debug, Clone, Copy)]
pub enum ReadyOutcome {
    /// A usable snapshot was fetched.
    Ready,
    /// Attempts were exhausted.
    Degraded,
}

impl ReadyOutcome {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Ready => "ready",
            Self::Degraded => "degraded",
        }
    }
}

/// Record a bootstrap fetch attempt.
pub fn record_init_attempt() {
    counter!("market_data_init_attempts_total").increment(1);
}

/// Record a scheduled bootstrap retry.
pub fn record_init_retry() {
    counter!("market_data_init_retries_total").increment(1);
}

/// Record a bootstrap that reported readiness.
pub fn record_ready(outcome: ReadyOutcome) {
    counter!(
        "market_data_ready_total",
        "outcome" => outcome.as_str()
    )
    .increment(1);
    gauge!("market_data_ready").set(1.0);
}

/// Record a successful price fetch.
pub fn record_fetch_success(symbols: usize, duration: Duration) {
    counter!("market_data_fetches_total", "outcome" => "success").increment(1);
    histogram!("market_data_fetch_seconds").record(duration.as_secs_f64());
    #[allow(clippy::cast_precision_loss)]
    gauge!("market_data_symbols").set(symbols as f64);
}

/// Record a failed price fetch.
pub fn record_fetch_failure(kind: FeedErrorKind, duration: Duration) {
    counter!("market_data_fetches_total", "outcome" => kind.as_str()).increment(1);
    histogram!("market_data_fetch_seconds").record(duration.as_secs_f64());
}

/// Record a monitor starting.
pub fn monitor_started() {
    gauge!("market_data_monitors_active").increment(1.0);
}

/// Record a monitor stopping.
pub fn monitor_stopped() {
    gauge!("market_data_monitors_active").decrement(1.0);
}

/// Record a snapshot delivered to an observer.
pub fn record_update_delivered(has_errors: bool) {
    counter!(
        "market_data_updates_delivered_total",
        "has_errors" => if has_errors { "true" } else { "false" }
    )
    .increment(1);
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ready_outcome_as_str() {
        assert_eq!(ReadyOutcome::Ready.as_str(), "ready");
        assert_eq!(ReadyOutcome::Degraded.as_str(), "degraded");
    }

    #[test]
    fn recording_without_recorder_is_noop() {
        record_init_attempt();
        record_fetch_failure(FeedErrorKind::Timeout, Duration::from_millis(5));
        monitor_started();
        monitor_stopped();
    }
}
