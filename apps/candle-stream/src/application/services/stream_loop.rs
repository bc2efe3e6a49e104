//! Stream Loop
//!
//! Cooperative scheduling core. Two logical tasks share one execution
//! context via `tokio::join!`:
//!
//! - **Heartbeat**: rotates a display token every period.
//! - **Poller**: waits up to `poll_timeout` for the next upstream event,
//!   runs the [`SeriesPipeline`], hands published snapshots to the sink and
//!   yields after every iteration.
//!
//! Both check the `running` token at the top of each iteration. The
//! upstream subscription is closed only after both have returned.
//!
//! ```text
//!  subscribe ──► join!(heartbeat, poller) ──► close
//!                  │            │
//!                sleep     timeout(next_event) → pipeline → sink
//!                               yield_now
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, trace, warn};

use super::heartbeat::HeartbeatTask;
use super::pipeline::{PipelineStats, SeriesPipeline};
use crate::application::ports::{
    CandleSource, CandleSubscription, NoopMetrics, SeriesSink, SourceError, StreamMetrics,
};

/// Default bounded wait for one upstream event.
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(2);

/// The only error that leaves the stream loop.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    /// The upstream connection could not be established or was lost.
    #[error(transparent)]
    UpstreamUnavailable(#[from] SourceError),
}

/// Summary of a finished loop.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LoopReport {
    /// Pipeline counters.
    pub pipeline: PipelineStats,
    /// Polls that timed out.
    pub timeouts: u64,
    /// Heartbeat ticks.
    pub heartbeat_ticks: u64,
}

/// Drives one subscription from `subscribe` to `close`.
pub struct StreamLoop<S, K> {
    subscription: CandleSubscription,
    poll_timeout: Duration,
    source: S,
    sink: K,
    heartbeat: HeartbeatTask,
    running: CancellationToken,
    metrics: Arc<dyn StreamMetrics>,
}

impl<S, K> StreamLoop<S, K>
where
    S: CandleSource,
    K: SeriesSink,
{
    /// Create a loop. Cancelling `stop` ends it.
    #[must_use]
    pub fn new(
        subscription: CandleSubscription,
        poll_timeout: Duration,
        source: S,
        sink: K,
        heartbeat: HeartbeatTask,
        stop: &CancellationToken,
    ) -> Self {
        Self {
            subscription,
            poll_timeout,
            source,
            sink,
            heartbeat,
            running: stop.child_token(),
            metrics: Arc::new(NoopMetrics),
        }
    }

    /// Report loop, pipeline and heartbeat activity to `metrics`.
    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<dyn StreamMetrics>) -> Self {
        self.heartbeat = self.heartbeat.with_metrics(Arc::clone(&metrics));
        self.metrics = metrics;
        self
    }

    /// Subscribe, run both tasks until stopped, then close the subscription.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::UpstreamUnavailable`] when subscribing fails or
    /// the source fails mid-stream. The subscription is closed first.
    pub async fn run(self) -> Result<LoopReport, StreamError> {
        let Self {
            subscription,
            poll_timeout,
            mut source,
            sink,
            heartbeat,
            running,
            metrics,
        } = self;

        let subscribed = tokio::select! {
            biased;
            () = running.cancelled() => None,
            result = source.subscribe(&subscription) => Some(result),
        };

        match subscribed {
            None => {
                info!("Stopped before subscription completed");
                close_source(&mut source).await;
                return Ok(LoopReport::default());
            }
            Some(Err(e)) => {
                error!(error = %e, "Subscription failed");
                close_source(&mut source).await;
                return Err(e.into());
            }
            Some(Ok(())) => {
                info!(
                    symbol = %subscription.candle_symbol(),
                    from = %subscription.from_time,
                    "Subscribed"
                );
            }
        }

        let mut poller = Poller {
            source: &mut source,
            sink,
            pipeline: SeriesPipeline::new(subscription.symbol.clone())
                .with_metrics(Arc::clone(&metrics)),
            poll_timeout,
            timeouts: 0,
            metrics,
        };

        let (heartbeat_ticks, polled) =
            tokio::join!(heartbeat.run(running.clone()), poller.run(&running));

        let report = LoopReport {
            pipeline: poller.pipeline.stats(),
            timeouts: poller.timeouts,
            heartbeat_ticks,
        };

        close_source(&mut source).await;

        match polled {
            Ok(()) => {
                info!(
                    events = report.pipeline.events,
                    publishes = report.pipeline.publishes,
                    timeouts = report.timeouts,
                    "Stream loop stopped"
                );
                Ok(report)
            }
            Err(e) => {
                error!(error = %e, "Stream loop terminated");
                Err(e)
            }
        }
    }
}

async fn close_source<S: CandleSource>(source: &mut S) {
    match source.close().await {
        Ok(()) => info!("Subscription closed"),
        Err(e) => warn!(error = %e, "Failed to close subscription cleanly"),
    }
}

/// Polling half of the loop.
struct Poller<'a, S, K> {
    source: &'a mut S,
    sink: K,
    pipeline: SeriesPipeline,
    poll_timeout: Duration,
    timeouts: u64,
    metrics: Arc<dyn StreamMetrics>,
}

impl<S, K> Poller<'_, S, K>
where
    S: CandleSource,
    K: SeriesSink,
{
    async fn run(&mut self, running: &CancellationToken) -> Result<(), StreamError> {
        while !running.is_cancelled() {
            match tokio::time::timeout(self.poll_timeout, self.source.next_event()).await {
                Ok(Ok(raw)) => {
                    if let Some(series) = self.pipeline.process(&raw) {
                        self.sink.publish(series);
                    }
                }
                Ok(Err(e)) => {
                    running.cancel();
                    return Err(e.into());
                }
                Err(_elapsed) => {
                    self.timeouts += 1;
                    self.metrics.poll_timeout();
                    trace!("Poll timed out");
                }
            }

            tokio::task::yield_now().await;
        }
        Ok(())
    }
}
