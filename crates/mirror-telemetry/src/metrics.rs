//! Prometheus metrics for alpha-mirror.
//!
//! Covers:
//! - Price poller outcomes and phase
//! - Per-provider failures and latency
//! - Store fetches and operator close commands
//! - Open positions and dashboard clients
//!
//! # Panics
//!
//! Metric registration uses `unwrap()` intentionally. If registration fails,
//! it indicates a fatal configuration error (e.g., duplicate metric names)
//! that should cause an immediate crash at startup rather than silent failure.
//! These panics only occur during static initialization, never at runtime.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, register_int_gauge, CounterVec, Encoder,
    HistogramVec, IntGauge, TextEncoder,
};

use crate::error::{TelemetryError, TelemetryResult};

/// Price polls by outcome.
/// Labels: outcome (ok/stale/cancelled)
pub static PRICE_POLLS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "mirror_price_polls_total",
        "Total price polls by outcome",
        &["outcome"]
    )
    .unwrap()
});

/// Provider failures.
/// Labels: provider, reason (timeout/http/body)
pub static PROVIDER_FAILURES_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "mirror_provider_failures_total",
        "Total price provider failures",
        &["provider", "reason"]
    )
    .unwrap()
});

/// Provider round-trip latency in milliseconds.
pub static PROVIDER_LATENCY_MS: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "mirror_provider_latency_ms",
        "Price provider round-trip latency in milliseconds",
        &["provider"],
        vec![10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2000.0, 4000.0]
    )
    .unwrap()
});

/// Open positions seen in the latest store snapshot.
pub static OPEN_POSITIONS: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!("mirror_open_positions", "Open positions in the latest snapshot").unwrap()
});

/// Store fetches.
/// Labels: source (positions/indicators), outcome (ok/error)
pub static STORE_FETCHES_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "mirror_store_fetches_total",
        "Total persistence fetches by source and outcome",
        &["source", "outcome"]
    )
    .unwrap()
});

/// Operator close commands.
/// Labels: outcome (sent/failed/duplicate)
pub static CLOSE_COMMANDS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "mirror_close_commands_total",
        "Total operator close commands by outcome",
        &["outcome"]
    )
    .unwrap()
});

/// Price poller phase (1=polling, 0=idle).
pub static POLLER_POLLING: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!("mirror_poller_polling", "Price poller phase (1=polling, 0=idle)").unwrap()
});

/// Connected dashboard WebSocket clients.
pub static DASHBOARD_CLIENTS: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "mirror_dashboard_clients",
        "Connected dashboard WebSocket clients"
    )
    .unwrap()
});

/// Metrics helper for convenient access.
pub struct Metrics;

impl Metrics {
    /// Record a completed price poll.
    pub fn price_poll(outcome: &str) {
        PRICE_POLLS_TOTAL.with_label_values(&[outcome]).inc();
    }

    /// Record a provider failure.
    pub fn provider_failure(provider: &str, reason: &str) {
        PROVIDER_FAILURES_TOTAL
            .with_label_values(&[provider, reason])
            .inc();
    }

    /// Record provider latency.
    pub fn provider_latency(provider: &str, latency_ms: f64) {
        PROVIDER_LATENCY_MS
            .with_label_values(&[provider])
            .observe(latency_ms);
    }

    pub fn open_positions(count: usize) {
        OPEN_POSITIONS.set(i64::try_from(count).unwrap_or(i64::MAX));
    }

    /// Record a store fetch.
    pub fn store_fetch(source: &str, ok: bool) {
        let outcome = if ok { "ok" } else { "error" };
        STORE_FETCHES_TOTAL
            .with_label_values(&[source, outcome])
            .inc();
    }

    /// Record an operator close command.
    pub fn close_command(outcome: &str) {
        CLOSE_COMMANDS_TOTAL.with_label_values(&[outcome]).inc();
    }

    pub fn poller_polling(polling: bool) {
        POLLER_POLLING.set(if polling { 1 } else { 0 });
    }

    pub fn dashboard_client_connected() {
        DASHBOARD_CLIENTS.inc();
    }

    pub fn dashboard_client_disconnected() {
        DASHBOARD_CLIENTS.dec();
    }
}

/// Render every registered metric in the Prometheus text format.
pub fn render_metrics() -> TelemetryResult<String> {
    let encoder = TextEncoder::new();
    let families = prometheus::gather();
    let mut buf = Vec::new();
    encoder
        .encode(&families, &mut buf)
        .map_err(|e| TelemetryError::Metrics(e.to_string()))?;
    String::from_utf8(buf).map_err(|e| TelemetryError::Metrics(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_failure_counter_increments() {
        let before = PROVIDER_FAILURES_TOTAL
            .with_label_values(&["test-provider", "timeout"])
            .get();
        Metrics::provider_failure("test-provider", "timeout");
        let after = PROVIDER_FAILURES_TOTAL
            .with_label_values(&["test-provider", "timeout"])
            .get();
        assert_eq!(after - before, 1.0);
    }

    #[test]
    fn test_render_contains_registered_metric() {
        Metrics::close_command("sent");
        let text = render_metrics().unwrap();
        assert!(text.contains("mirror_close_commands_total"));
    }
}
