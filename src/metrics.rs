//! Prometheus metrics for the control loop and execution paths.

use std::time::Instant;

use metrics::{counter, describe_counter, describe_histogram, histogram};
use tracing::debug;

// === Metric Name Constants ===

/// Control loop cycles counter metric name.
pub const METRIC_CYCLES: &str = "controller_cycles_total";
/// Opportunities detected counter metric name.
pub const METRIC_OPPORTUNITIES_DETECTED: &str = "opportunities_detected_total";
/// Pairs opened counter metric name.
pub const METRIC_PAIRS_OPENED: &str = "pairs_opened_total";
/// Pairs closed counter metric name.
pub const METRIC_PAIRS_CLOSED: &str = "pairs_closed_total";
/// Pairs reverted counter metric name.
pub const METRIC_PAIRS_REVERTED: &str = "pairs_reverted_total";
/// Compensation failures counter metric name.
pub const METRIC_COMPENSATION_FAILURES: &str = "compensation_failures_total";
/// Urgent closes counter metric name.
pub const METRIC_URGENT_CLOSES: &str = "urgent_closes_total";
/// Failed orders counter metric name.
pub const METRIC_ORDERS_FAILED: &str = "orders_failed_total";
/// Scan latency metric name.
pub const METRIC_SCAN_LATENCY: &str = "scan_latency_ms";
/// Full cycle latency metric name.
pub const METRIC_CYCLE_LATENCY: &str = "cycle_latency_ms";

/// Initialize all metric descriptions.
/// Call this once at startup to register metrics with descriptions.
pub fn init_metrics() {
    describe_histogram!(METRIC_SCAN_LATENCY, "Opportunity scan latency in milliseconds");
    describe_histogram!(METRIC_CYCLE_LATENCY, "Full control cycle latency in milliseconds");

    describe_counter!(METRIC_CYCLES, "Total control loop cycles run");
    describe_counter!(
        METRIC_OPPORTUNITIES_DETECTED,
        "Total opportunities that cleared the margin threshold"
    );
    describe_counter!(METRIC_PAIRS_OPENED, "Total hedged pairs opened");
    describe_counter!(METRIC_PAIRS_CLOSED, "Total hedged pairs closed");
    describe_counter!(
        METRIC_PAIRS_REVERTED,
        "Total pairs rolled back after a failed short leg"
    );
    describe_counter!(
        METRIC_COMPENSATION_FAILURES,
        "Total compensating closes that failed and need an operator"
    );
    describe_counter!(
        METRIC_URGENT_CLOSES,
        "Total closes triggered by liquidation risk"
    );
    describe_counter!(METRIC_ORDERS_FAILED, "Total orders that failed to land");

    debug!("Metrics initialized");
}

/// Increment the cycle counter.
pub fn inc_cycles() {
    counter!(METRIC_CYCLES).increment(1);
}

/// Increment opportunities detected counter.
pub fn inc_opportunities_detected() {
    counter!(METRIC_OPPORTUNITIES_DETECTED).increment(1);
}

/// Increment pairs opened counter.
pub fn inc_pairs_opened() {
    counter!(METRIC_PAIRS_OPENED).increment(1);
}

/// Increment pairs closed counter.
pub fn inc_pairs_closed() {
    counter!(METRIC_PAIRS_CLOSED).increment(1);
}

/// Increment pairs reverted counter.
pub fn inc_pairs_reverted() {
    counter!(METRIC_PAIRS_REVERTED).increment(1);
}

/// Increment compensation failures counter.
pub fn inc_compensation_failures() {
    counter!(METRIC_COMPENSATION_FAILURES).increment(1);
}

/// Increment urgent closes counter.
pub fn inc_urgent_closes() {
    counter!(METRIC_URGENT_CLOSES).increment(1);
}

/// Increment failed orders counter.
pub fn inc_orders_failed() {
    counter!(METRIC_ORDERS_FAILED).increment(1);
}

/// Record scan latency.
pub fn record_scan_latency(start: Instant) {
    let latency_ms = start.elapsed().as_secs_f64() * 1000.0;
    histogram!(METRIC_SCAN_LATENCY).record(latency_ms);
}

/// RAII guard for timing operations.
/// Automatically records latency when dropped.
pub struct LatencyTimer {
    start: Instant,
    metric_name: &'static str,
}

impl LatencyTimer {
    /// Create a new latency timer for the given metric.
    pub fn new(metric_name: &'static str) -> Self {
        Self {
            start: Instant::now(),
            metric_name,
        }
    }

    /// Get elapsed time in milliseconds (without recording).
    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }
}

impl Drop for LatencyTimer {
    fn drop(&mut self) {
        let latency_ms = self.start.elapsed().as_secs_f64() * 1000.0;
        histogram!(self.metric_name).record(latency_ms);
    }
}

/// Create a latency timer for a full control cycle.
pub fn timer_cycle() -> LatencyTimer {
    LatencyTimer::new(METRIC_CYCLE_LATENCY)
}
