//! Prometheus Metrics Module
//!
//! Exposes stream loop metrics via Prometheus format for monitoring.
//!
//! # Metrics Categories
//!
//! - **Events**: upstream events received, decode failures, poll timeouts
//! - **Series**: merge outcomes, series length, publishes, gated records
//! - **Connection**: DXLink connect attempts
//! - **Heartbeat**: heartbeat ticks
//!
//! [`PrometheusMetrics`] adapts the recording functions to the
//! [`StreamMetrics`] port. Without an installed recorder every recording
//! function is a no-op.

use std::net::SocketAddr;

use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

use crate::application::ports::StreamMetrics;
use crate::domain::series::MergeOutcome;

// =============================================================================
// Installation
// =============================================================================

/// Install the Prometheus recorder with an HTTP listener on `port`.
///
/// A port of `0` leaves metrics disabled and returns `Ok(false)`.
///
/// # Errors
///
/// Returns an error if the listener cannot be bound or a recorder is
/// already installed.
pub fn init_metrics(port: u16) -> Result<bool, BuildError> {
    if port == 0 {
        return Ok(false);
    }

    PrometheusBuilder::new()
        .with_http_listener(SocketAddr::from(([0, 0, 0, 0], port)))
        .install()?;

    register_metrics();
    Ok(true)
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    describe_counter!(
        "candle_stream_events_received_total",
        "Total raw events received from the upstream source"
    );
    describe_counter!(
        "candle_stream_decode_failures_total",
        "Total upstream events discarded because they could not be decoded"
    );
    describe_counter!(
        "candle_stream_poll_timeouts_total",
        "Total polls that timed out without an event"
    );
    describe_counter!(
        "candle_stream_merges_total",
        "Total records merged into the series by outcome"
    );
    describe_counter!(
        "candle_stream_publishes_total",
        "Total series snapshots handed to the renderer"
    );
    describe_counter!(
        "candle_stream_suppressed_total",
        "Total records merged while the snapshot gate was suppressed"
    );
    describe_counter!(
        "candle_stream_connect_attempts_total",
        "Total upstream connection attempts"
    );
    describe_counter!(
        "candle_stream_heartbeat_ticks_total",
        "Total heartbeat ticks"
    );
    describe_gauge!(
        "candle_stream_series_length",
        "Number of records currently held in the series"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Record a raw event received from upstream.
pub fn record_event_received() {
    counter!("candle_stream_events_received_total").increment(1);
}

/// Record a discarded, undecodable event.
pub fn record_decode_failure(reason: &'static str) {
    counter!("candle_stream_decode_failures_total", "reason" => reason).increment(1);
}

/// Record a poll that timed out.
pub fn record_poll_timeout() {
    counter!("candle_stream_poll_timeouts_total").increment(1);
}

/// Record one merge and the resulting series length.
#[allow(clippy::cast_precision_loss)]
pub fn record_merge(outcome: MergeOutcome, series_len: usize) {
    counter!("candle_stream_merges_total", "outcome" => outcome.as_str()).increment(1);
    gauge!("candle_stream_series_length").set(series_len as f64);
}

/// Record a publish to the renderer.
pub fn record_publish() {
    counter!("candle_stream_publishes_total").increment(1);
}

/// Record a record merged while publishing was gated.
pub fn record_suppressed() {
    counter!("candle_stream_suppressed_total").increment(1);
}

/// Record an upstream connection attempt.
pub fn record_connect_attempt() {
    counter!("candle_stream_connect_attempts_total").increment(1);
}

/// Record a heartbeat tick.
pub fn record_heartbeat_tick() {
    counter!("candle_stream_heartbeat_ticks_total").increment(1);
}

// =============================================================================
// Port Adapter
// =============================================================================

/// Reports stream loop activity to the global metrics recorder.
#[derive(Debug, Default, Clone, Copy)]
pub struct PrometheusMetrics;

impl StreamMetrics for PrometheusMetrics {
    fn event_received(&self) {
        record_event_received();
    }

    fn decode_failure(&self, reason: &'static str) {
        record_decode_failure(reason);
    }

    fn merged(&self, outcome: MergeOutcome, series_len: usize) {
        record_merge(outcome, series_len);
    }

    fn published(&self) {
        record_publish();
    }

    fn suppressed(&self) {
        record_suppressed();
    }

    fn poll_timeout(&self) {
        record_poll_timeout();
    }

    fn heartbeat_tick(&self) {
        record_heartbeat_tick();
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_port_installs_nothing() {
        assert!(!init_metrics(0).unwrap());
    }

    #[test]
    fn recording_without_recorder_is_noop() {
        record_event_received();
        record_decode_failure("missing_field");
        record_poll_timeout();
        record_merge(MergeOutcome::Inserted, 1);
        record_publish();
        record_suppressed();
        record_connect_attempt();
        record_heartbeat_tick();
    }

    #[test]
    fn adapter_records_through_the_port() {
        let metrics: &dyn StreamMetrics = &PrometheusMetrics;
        metrics.event_received();
        metrics.decode_failure("dxlink_frame");
        metrics.merged(MergeOutcome::Removed, 0);
        metrics.published();
        metrics.suppressed();
        metrics.poll_timeout();
        metrics.heartbeat_tick();
    }
}
