//! Prometheus metrics for rekon.
//!
//! Covers the reconciliation pipeline end to end:
//! - Strategy ticks and their outcome
//! - Scheduled actions per kind
//! - Executor dispatch, failures and discarded batches
//! - Open orders tracked per destination
//!
//! # Panics
//!
//! Metric registration uses `unwrap()` intentionally. A registration failure
//! means duplicate metric names, which must crash at startup. These panics
//! only occur during static initialization, never at runtime.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, register_int_gauge_vec, CounterVec,
    Encoder, HistogramVec, IntGaugeVec, TextEncoder,
};

use crate::error::{TelemetryError, TelemetryResult};

/// Actions handed to a venue.
/// Labels: destination, kind (order_create/order_stop)
pub static ACTIONS_DISPATCHED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "rekon_actions_dispatched_total",
        "Total actions dispatched to a venue",
        &["destination", "kind"]
    )
    .unwrap()
});

/// Actions that failed at the venue.
/// Labels: destination, kind, reason (error/status)
pub static ACTIONS_FAILED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "rekon_actions_failed_total",
        "Total actions that failed or were rejected by a venue",
        &["destination", "kind", "reason"]
    )
    .unwrap()
});

/// Actions dropped from a queue because a newer batch replaced them.
pub static ACTIONS_DISCARDED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "rekon_actions_discarded_total",
        "Total queued actions discarded by a newer batch",
        &["destination"]
    )
    .unwrap()
});

/// Venue round-trip per action in milliseconds.
pub static ACTION_LATENCY_MS: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "rekon_action_latency_ms",
        "Venue round-trip per action in milliseconds",
        &["destination", "kind"],
        vec![1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 5000.0]
    )
    .unwrap()
});

/// Batches waiting in an executor lane.
pub static EXECUTOR_QUEUE_DEPTH: Lazy<IntGaugeVec> = Lazy::new(|| {
    register_int_gauge_vec!(
        "rekon_executor_queue_depth",
        "Batches waiting in an executor lane",
        &["destination"]
    )
    .unwrap()
});

/// Strategy ticks.
/// Labels: strategy, outcome (scheduled/idle/skipped/error)
pub static TICKS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "rekon_ticks_total",
        "Total reconciliation ticks per strategy and outcome",
        &["strategy", "outcome"]
    )
    .unwrap()
});

/// Tick duration in milliseconds.
pub static TICK_DURATION_MS: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "rekon_tick_duration_ms",
        "Reconciliation tick duration in milliseconds",
        &["strategy"],
        vec![0.5, 1.0, 5.0, 10.0, 50.0, 100.0, 500.0, 1000.0]
    )
    .unwrap()
});

/// Actions produced by schedulers.
pub static SCHEDULED_ACTIONS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "rekon_scheduled_actions_total",
        "Total actions produced by schedulers",
        &["strategy", "kind"]
    )
    .unwrap()
});

/// Live orders tracked per destination and market.
pub static OPEN_ORDERS: Lazy<IntGaugeVec> = Lazy::new(|| {
    register_int_gauge_vec!(
        "rekon_open_orders",
        "Live orders tracked per destination and market",
        &["destination", "market"]
    )
    .unwrap()
});

/// Metrics helper for recording values.
pub struct Metrics;

impl Metrics {
    // =========================================================================
    // Executor
    // =========================================================================

    /// Record an action sent to a venue.
    pub fn action_dispatched(destination: &str, kind: &str) {
        ACTIONS_DISPATCHED_TOTAL
            .with_label_values(&[destination, kind])
            .inc();
    }

    /// Record an action that errored or came back with a non-success status.
    pub fn action_failed(destination: &str, kind: &str, reason: &str) {
        ACTIONS_FAILED_TOTAL
            .with_label_values(&[destination, kind, reason])
            .inc();
    }

    pub fn actions_discarded(destination: &str, count: usize) {
        ACTIONS_DISCARDED_TOTAL
            .with_label_values(&[destination])
            .inc_by(count as f64);
    }

    pub fn action_latency(destination: &str, kind: &str, latency_ms: f64) {
        ACTION_LATENCY_MS
            .with_label_values(&[destination, kind])
            .observe(latency_ms);
    }

    pub fn queue_depth(destination: &str, depth: usize) {
        EXECUTOR_QUEUE_DEPTH
            .with_label_values(&[destination])
            .set(depth as i64);
    }

    // =========================================================================
    // Reconciliation
    // =========================================================================

    /// Record a finished tick.
    pub fn tick(strategy: &str, outcome: &str, duration_ms: f64) {
        TICKS_TOTAL.with_label_values(&[strategy, outcome]).inc();
        TICK_DURATION_MS
            .with_label_values(&[strategy])
            .observe(duration_ms);
    }

    pub fn actions_scheduled(strategy: &str, kind: &str, count: usize) {
        SCHEDULED_ACTIONS_TOTAL
            .with_label_values(&[strategy, kind])
            .inc_by(count as f64);
    }

    pub fn open_orders(destination: &str, market: &str, count: usize) {
        OPEN_ORDERS
            .with_label_values(&[destination, market])
            .set(count as i64);
    }

    /// Render every registered metric in the Prometheus text format.
    pub fn render() -> TelemetryResult<String> {
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&prometheus::gather(), &mut buffer)
            .map_err(|e| TelemetryError::Metrics(e.to_string()))?;
        String::from_utf8(buffer).map_err(|e| TelemetryError::Metrics(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        Metrics::action_dispatched("acc-test", "order_create");
        Metrics::action_dispatched("acc-test", "order_create");
        assert_eq!(
            ACTIONS_DISPATCHED_TOTAL
                .with_label_values(&["acc-test", "order_create"])
                .get(),
            2.0
        );

        Metrics::actions_discarded("acc-test", 3);
        assert_eq!(
            ACTIONS_DISCARDED_TOTAL.with_label_values(&["acc-test"]).get(),
            3.0
        );
    }

    #[test]
    fn test_gauges_overwrite() {
        Metrics::open_orders("acc-gauge", "btcusd", 4);
        Metrics::open_orders("acc-gauge", "btcusd", 1);
        assert_eq!(OPEN_ORDERS.with_label_values(&["acc-gauge", "btcusd"]).get(), 1);
    }

    #[test]
    fn test_render_contains_metric_names() {
        Metrics::tick("render-test", "idle", 1.5);
        let text = Metrics::render().unwrap();
        assert!(text.contains("rekon_ticks_total"));
        assert!(text.contains("render-test"));
    }
}
