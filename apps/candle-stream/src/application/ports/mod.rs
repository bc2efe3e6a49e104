//! Port Interfaces
//!
//! Boundaries between the merge core and its external collaborators,
//! following the Hexagonal Architecture pattern. Infrastructure adapters
//! implement these traits.
//!
//! ## Driven Ports (Outbound)
//!
//! - `CandleSource`: upstream candle subscription (DXLink in production)
//! - `SeriesSink`: rendering hand-off for published series
//! - `StreamMetrics`: loop instrumentation

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::record::CandleRecord;
use crate::domain::series::MergeOutcome;

/// One raw upstream event, shape not yet validated.
pub type RawEvent = serde_json::Value;

// =============================================================================
// Upstream Source
// =============================================================================

/// Parameters of a candle subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandleSubscription {
    /// Underlying symbol (e.g. `SPY`).
    pub symbol: String,
    /// Candle period in dxFeed notation (e.g. `5m`, `1h`, `1d`).
    pub interval: String,
    /// Earliest candle to deliver.
    pub from_time: DateTime<Utc>,
    /// Include extended trading hours.
    pub extended_hours: bool,
}

impl CandleSubscription {
    /// dxFeed candle symbol, e.g. `SPY{=5m,tho=true}`.
    #[must_use]
    pub fn candle_symbol(&self) -> String {
        if self.extended_hours {
            format!("{}{{={}}}", self.symbol, self.interval)
        } else {
            format!("{}{{={},tho=true}}", self.symbol, self.interval)
        }
    }
}

/// Errors surfaced by a [`CandleSource`].
#[derive(Debug, Clone, thiserror::Error)]
pub enum SourceError {
    /// The connection could not be established or was lost.
    #[error("upstream unavailable: {0}")]
    Unavailable(String),

    /// The source was used after `close`.
    #[error("upstream subscription closed")]
    Closed,
}

/// Upstream candle feed.
///
/// `next_event` must be cancel-safe: the stream loop wraps it in a timeout
/// and drops the future when the bound elapses.
#[async_trait]
pub trait CandleSource: Send {
    /// Open the subscription.
    async fn subscribe(&mut self, subscription: &CandleSubscription) -> Result<(), SourceError>;

    /// Wait for the next raw event.
    async fn next_event(&mut self) -> Result<RawEvent, SourceError>;

    /// Close the subscription. Closing twice is a no-op.
    async fn close(&mut self) -> Result<(), SourceError>;
}

// =============================================================================
// Rendering Hand-off
// =============================================================================

/// A consistent series snapshot handed to the rendering collaborator.
#[derive(Debug, Clone, PartialEq)]
pub struct PublishedSeries {
    /// Underlying symbol.
    pub symbol: String,
    /// Records in ascending `time` order.
    pub records: Arc<[CandleRecord]>,
    /// Cumulative VWAP per record, aligned with `records`.
    pub indicator: Arc<[Option<f64>]>,
}

impl PublishedSeries {
    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the series is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Close of the most recent candle.
    #[must_use]
    pub fn last_close(&self) -> Option<f64> {
        self.records.last().map(|r| r.close)
    }

    /// Indicator at the most recent candle.
    #[must_use]
    pub fn last_indicator(&self) -> Option<f64> {
        self.indicator.last().copied().flatten()
    }
}

/// Receives published series. Must not block.
#[cfg_attr(test, mockall::automock)]
pub trait SeriesSink: Send {
    /// Hand over one published snapshot.
    fn publish(&mut self, series: PublishedSeries);
}

// =============================================================================
// Instrumentation
// =============================================================================

/// Counters reported by the stream loop. Every method defaults to a no-op.
pub trait StreamMetrics: Send + Sync {
    /// A raw event arrived from upstream.
    fn event_received(&self) {}

    /// A raw event was discarded as undecodable.
    fn decode_failure(&self, _reason: &'static str) {}

    /// A record was merged; `series_len` is the length afterwards.
    fn merged(&self, _outcome: MergeOutcome, _series_len: usize) {}

    /// A snapshot was handed to the sink.
    fn published(&self) {}

    /// A record was merged while publishing was gated.
    fn suppressed(&self) {}

    /// A poll timed out.
    fn poll_timeout(&self) {}

    /// The heartbeat ticked.
    fn heartbeat_tick(&self) {}
}

/// Metrics that record nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetrics;

impl StreamMetrics for NoopMetrics {}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::atomic::{AtomicU64, Ordering};

    use super::*;

    /// Counts every call.
    #[derive(Debug, Default)]
    pub struct CountingMetrics {
        pub events: AtomicU64,
        pub decode_failures: AtomicU64,
        pub merges: AtomicU64,
        pub published: AtomicU64,
        pub suppressed: AtomicU64,
        pub poll_timeouts: AtomicU64,
        pub heartbeat_ticks: AtomicU64,
    }

    impl CountingMetrics {
        pub fn get(counter: &AtomicU64) -> u64 {
            counter.load(Ordering::Relaxed)
        }
    }

    impl StreamMetrics for CountingMetrics {
        fn event_received(&self) {
            self.events.fetch_add(1, Ordering::Relaxed);
        }

        fn decode_failure(&self, _reason: &'static str) {
            self.decode_failures.fetch_add(1, Ordering::Relaxed);
        }

        fn merged(&self, _outcome: MergeOutcome, _series_len: usize) {
            self.merges.fetch_add(1, Ordering::Relaxed);
        }

        fn published(&self) {
            self.published.fetch_add(1, Ordering::Relaxed);
        }

        fn suppressed(&self) {
            self.suppressed.fetch_add(1, Ordering::Relaxed);
        }

        fn poll_timeout(&self) {
            self.poll_timeouts.fetch_add(1, Ordering::Relaxed);
        }

        fn heartbeat_tick(&self) {
            self.heartbeat_ticks.fetch_add(1, Ordering::Relaxed);
        }
    }
}
