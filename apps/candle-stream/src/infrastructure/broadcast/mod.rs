//! Broadcast Channel Adapters
//!
//! Implements the rendering hand-off over a tokio broadcast channel.
//!
//! # Architecture
//!
//! `SeriesBroadcast` is the [`SeriesSink`] the stream loop publishes into.
//! Each publish is an `Arc`-backed snapshot, so fan-out to several
//! renderers is a reference-count bump. A renderer that falls behind skips
//! the oldest snapshots (`RecvError::Lagged`); the poller never blocks on it.

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::application::ports::{PublishedSeries, SeriesSink};

/// Default capacity of the series channel.
pub const DEFAULT_CAPACITY: usize = 16;

/// Fan-out of published series to rendering consumers.
#[derive(Debug, Clone)]
pub struct SeriesBroadcast {
    tx: broadcast::Sender<PublishedSeries>,
}

impl SeriesBroadcast {
    /// Create a broadcast with the given capacity.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero (tokio rejects zero-capacity channels).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            tx: broadcast::channel(capacity).0,
        }
    }

    /// Create a broadcast with default capacity.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }

    /// Get a new receiver for published series.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<PublishedSeries> {
        self.tx.subscribe()
    }

    /// Get the number of active receivers.
    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl SeriesSink for SeriesBroadcast {
    fn publish(&mut self, series: PublishedSeries) {
        if self.tx.send(series).is_err() {
            tracing::trace!("No renderer attached; snapshot dropped");
        }
    }
}

/// Console renderer: logs `SYMBOL close vwap` for every snapshot.
///
/// Snapshots already queued are rendered before `stop` is honored. Returns
/// the number of snapshots rendered once `stop` is cancelled or the channel
/// closes.
pub async fn log_series(
    mut rx: broadcast::Receiver<PublishedSeries>,
    stop: CancellationToken,
) -> u64 {
    let mut rendered = 0u64;
    loop {
        let received = tokio::select! {
            biased;
            received = rx.recv() => received,
            () = stop.cancelled() => break,
        };

        match received {
            Ok(series) => {
                rendered += 1;
                tracing::info!(
                    "{} {} {}",
                    series.symbol,
                    format_value(series.last_close()),
                    format_value(series.last_indicator()),
                );
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Renderer lagging; skipped snapshots");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
    rendered
}

fn format_value(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{v:.2}"))
}

// =============================================================================
// Tests
// =============================================================================
