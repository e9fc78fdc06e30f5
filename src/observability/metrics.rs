//! Metric recording for connection workers.
//!
//! Only the `metrics` facade is used here; the embedding process installs
//! whichever recorder it wants. Without one, every call is a no-op.

use std::time::Duration;

/// Records one executed command.
///
/// Emits `courier_commands_total` and `courier_command_duration_ms`, both
/// labelled by operation and status (`"success"` or `"error"`).
pub fn record_command(operation: &'static str, status: &'static str, elapsed: Duration) {
    metrics::counter!(
        "courier_commands_total",
        "operation" => operation,
        "status" => status
    )
    .increment(1);
    metrics::histogram!(
        "courier_command_duration_ms",
        "operation" => operation,
        "status" => status
    )
    .record(elapsed.as_secs_f64() * 1000.0);
}

/// Records a worker thread starting.
pub fn record_connection_started() {
    metrics::counter!("courier_connections_started_total").increment(1);
}

/// Records a worker thread exiting.
pub fn record_connection_stopped() {
    metrics::counter!("courier_connections_stopped_total").increment(1);
}

/// Records one prepare retry after the engine reported busy.
pub fn record_prepare_busy_retry() {
    metrics::counter!("courier_prepare_busy_retries_total").increment(1);
}

/// Records a reply whose mailbox was gone.
pub fn record_undeliverable_reply(operation: &'static str) {
    metrics::counter!(
        "courier_replies_undeliverable_total",
        "operation" => operation
    )
    .increment(1);
}
