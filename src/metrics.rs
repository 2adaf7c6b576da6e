//! Metrics for observability.
//!
//! Exports Prometheus-compatible metrics for:
//! - Sweep passes and their duration
//! - Per-location outcomes
//! - Per-entry outcomes and unlinks
//! - Per-replica deliveries
//! - Queue retries on SQLite contention
//!
//! # Metric Naming Convention
//!
//! All metrics are prefixed with `updater_` and follow Prometheus conventions:
//! - Counters end in `_total`
//! - Gauges represent current state
//! - Histograms track distributions (duration)
//!
//! No recorder is installed by this crate; without one every call is a no-op.
//!
//! # Usage
//!
//! ```rust,no_run
//! use update_sweeper::metrics;
//! use std::time::Duration;
//!
//! // After a location pass
//! metrics::record_location_sweep("10.0.0.1:8123", "success", Duration::from_millis(800));
//!
//! // After a full sweep
//! metrics::record_sweep_complete(12, 10, 2, 10, Duration::from_secs(4));
//! ```

use metrics::{counter, gauge, histogram};
use std::time::Duration;

/// Record a completed sweep over every location.
pub fn record_sweep_complete(
    found: u64,
    successes: u64,
    failures: u64,
    unlinks: u64,
    duration: Duration,
) {
    counter!("updater_sweeps_total").increment(1);
    counter!("updater_found_updates_total").increment(found);
    counter!("updater_sweep_successes_total").increment(successes);
    counter!("updater_sweep_failures_total").increment(failures);
    counter!("updater_sweep_unlinks_total").increment(unlinks);
    histogram!("updater_sweep_duration_seconds").record(duration.as_secs_f64());
    gauge!("updater_last_sweep_duration_seconds").set(duration.as_secs_f64());
}

/// Record one location pass.
///
/// `outcome` is `success`, `interrupted`, or a failure kind label.
pub fn record_location_sweep(location: &str, outcome: &str, duration: Duration) {
    counter!(
        "updater_location_sweeps_total",
        "location" => location.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
    histogram!("updater_location_sweep_duration_seconds", "location" => location.to_string())
        .record(duration.as_secs_f64());
}

/// Record the result of processing one entry.
pub fn record_update_outcome(op: &str, fully_delivered: bool) {
    let status = if fully_delivered { "success" } else { "failure" };
    counter!("updater_updates_total", "op" => op.to_string(), "status" => status).increment(1);
}

/// Record an entry removed from its queue.
pub fn record_unlink() {
    counter!("updater_unlinks_total").increment(1);
}

/// Record one delivery attempt to one replica.
pub fn record_delivery(op: &str, acknowledged: bool, duration: Duration) {
    let status = if acknowledged { "acked" } else { "failed" };
    counter!("updater_deliveries_total", "op" => op.to_string(), "status" => status).increment(1);
    histogram!("updater_delivery_duration_seconds", "op" => op.to_string())
        .record(duration.as_secs_f64());
}

/// Record queue SQLite retry (for SQLITE_BUSY/SQLITE_LOCKED).
pub fn queue_retries_total(operation: &str) {
    counter!("updater_queue_retries_total", "operation" => operation.to_string()).increment(1);
}

/// Record errors by kind.
pub fn record_error(location: &str, kind: &str) {
    counter!(
        "updater_errors_total",
        "location" => location.to_string(),
        "kind" => kind.to_string()
    )
    .increment(1);
}

/// Gauge for locations being swept concurrently.
pub fn set_active_locations(count: usize) {
    gauge!("updater_active_locations").set(count as f64);
}

/// Gauge for sweeper state.
pub fn set_sweeper_state(state: &str) {
    // Numeric for alerting (0=created .. 4=failed)
    let value = match state {
        "Created" => 0.0,
        "Running" => 1.0,
        "ShuttingDown" => 2.0,
        "Stopped" => 3.0,
        "Failed" => 4.0,
        _ => -1.0,
    };
    gauge!("updater_sweeper_state").set(value);
}
