//! Series Pipeline
//!
//! The synchronous per-event step of the stream loop:
//! decode → classify flags → merge → gate → (recompute indicator).
//!
//! Everything here runs between two suspension points of the poller, so a
//! merge and its publish decision are never observed half-done.

use std::sync::Arc;

use tracing::{debug, trace, warn};

use crate::application::ports::{NoopMetrics, PublishedSeries, RawEvent, StreamMetrics};
use crate::domain::gate::{GateState, SnapshotGate};
use crate::domain::indicator::cumulative_vwap;
use crate::domain::record::decode_candle;
use crate::domain::series::{MergeOutcome, SeriesStore};

/// Counters accumulated by the pipeline.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PipelineStats {
    /// Raw events processed.
    pub events: u64,
    /// Events discarded as undecodable.
    pub decode_failures: u64,
    /// Records added under a new key.
    pub inserted: u64,
    /// Records that replaced an existing key.
    pub overwritten: u64,
    /// Tombstones that deleted a key.
    pub removed: u64,
    /// Tombstones for keys that were not present.
    pub remove_missing: u64,
    /// Snapshots handed to the renderer.
    pub publishes: u64,
    /// Records merged while the gate was suppressed.
    pub suppressed: u64,
}

impl PipelineStats {
    /// Total merges that changed or attempted to change the series.
    #[must_use]
    pub const fn merges(&self) -> u64 {
        self.inserted + self.overwritten + self.removed + self.remove_missing
    }

    fn count(&mut self, outcome: MergeOutcome) {
        match outcome {
            MergeOutcome::Inserted => self.inserted += 1,
            MergeOutcome::Overwritten => self.overwritten += 1,
            MergeOutcome::Removed => self.removed += 1,
            MergeOutcome::RemoveMissing => self.remove_missing += 1,
        }
    }
}

/// Owns the series and gate for one subscription.
pub struct SeriesPipeline {
    symbol: String,
    series: SeriesStore,
    gate: SnapshotGate,
    stats: PipelineStats,
    metrics: Arc<dyn StreamMetrics>,
}

impl SeriesPipeline {
    /// Create an empty pipeline; the gate starts suppressed.
    #[must_use]
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            series: SeriesStore::new(),
            gate: SnapshotGate::new(),
            stats: PipelineStats::default(),
            metrics: Arc::new(NoopMetrics),
        }
    }

    /// Report counters to `metrics`.
    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<dyn StreamMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Process one raw event.
    ///
    /// Returns the snapshot to publish when the gate is open and the series
    /// is non-empty. Undecodable events are logged and dropped.
    pub fn process(&mut self, raw: &RawEvent) -> Option<PublishedSeries> {
        self.stats.events += 1;
        self.metrics.event_received();

        let record = match decode_candle(raw) {
            Ok(record) => record,
            Err(e) => {
                self.stats.decode_failures += 1;
                self.metrics.decode_failure(e.reason());
                warn!(error = %e, raw = %raw, "Discarding undecodable event");
                return None;
            }
        };

        let flags = record.flags;
        let time = record.time;
        debug!(time = %time, flags = %flags, close = record.close, "Candle event");

        let outcome = self.series.apply(record);
        self.stats.count(outcome);
        self.metrics.merged(outcome, self.series.len());
        trace!(time = %time, outcome = outcome.as_str(), len = self.series.len(), "Merged");

        if let Some(state) = self.gate.observe(flags) {
            debug!(state = state.as_str(), len = self.series.len(), "Snapshot gate transition");
        }

        if !self.gate.is_publishable() {
            self.stats.suppressed += 1;
            self.metrics.suppressed();
            return None;
        }
        if self.series.is_empty() {
            return None;
        }

        Some(self.snapshot())
    }

    /// Build a published snapshot with a freshly recomputed indicator.
    fn snapshot(&mut self) -> PublishedSeries {
        let records: Arc<[_]> = self.series.to_vec().into();
        let indicator: Arc<[_]> = cumulative_vwap(records.iter()).into();

        self.stats.publishes += 1;
        self.metrics.published();
        debug!(len = records.len(), "Publishing series");

        PublishedSeries {
            symbol: self.symbol.clone(),
            records,
            indicator,
        }
    }

    /// Current gate state.
    #[must_use]
    pub const fn gate_state(&self) -> GateState {
        self.gate.state()
    }

    /// The merged series.
    #[must_use]
    pub const fn series(&self) -> &SeriesStore {
        &self.series
    }

    /// Counters so far.
    #[must_use]
    pub const fn stats(&self) -> PipelineStats {
        self.stats
    }
}
