//! Heartbeat Task
//!
//! A periodic task that rotates a display token so an operator can see the
//! process is alive. It shares the poller's execution context and touches
//! nothing but its own spinner and label channel.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::application::ports::{NoopMetrics, StreamMetrics};

/// Default spinner frames.
pub const DEFAULT_FRAMES: &str = "░▒▒▒▒▒";

/// Rotating display token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Spinner {
    frames: Vec<char>,
}

impl Default for Spinner {
    fn default() -> Self {
        Self::new(DEFAULT_FRAMES)
    }
}

impl Spinner {
    /// Create a spinner from its frame characters.
    #[must_use]
    pub fn new(frames: &str) -> Self {
        Self {
            frames: frames.chars().collect(),
        }
    }

    /// Current label.
    #[must_use]
    pub fn label(&self) -> String {
        self.frames.iter().collect()
    }

    /// Rotate the frames left by one.
    pub fn advance(&mut self) {
        if !self.frames.is_empty() {
            self.frames.rotate_left(1);
        }
    }
}

/// Periodically advances a [`Spinner`] and publishes its label.
pub struct HeartbeatTask {
    period: Duration,
    spinner: Spinner,
    label_tx: watch::Sender<String>,
    metrics: Arc<dyn StreamMetrics>,
}

impl HeartbeatTask {
    /// Create a heartbeat with the given period.
    #[must_use]
    pub fn new(period: Duration, spinner: Spinner) -> Self {
        let (label_tx, _) = watch::channel(spinner.label());
        Self {
            period,
            spinner,
            label_tx,
            metrics: Arc::new(NoopMetrics),
        }
    }

    /// Report ticks to `metrics`.
    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<dyn StreamMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Receiver for the display label.
    #[must_use]
    pub fn label(&self) -> watch::Receiver<String> {
        self.label_tx.subscribe()
    }

    /// Tick until `running` is cancelled. Returns the number of ticks.
    pub async fn run(mut self, running: CancellationToken) -> u64 {
        let mut ticks = 0_u64;

        while !running.is_cancelled() {
            self.label_tx.send_replace(self.spinner.label());
            self.spinner.advance();
            ticks += 1;
            self.metrics.heartbeat_tick();

            tokio::time::sleep(self.period).await;
        }

        tracing::debug!(ticks, "Heartbeat stopped");
        ticks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::testing::CountingMetrics;

    #[test]
    fn spinner_rotates_left() {
        let mut spinner = Spinner::new("abc");
        assert_eq!(spinner.label(), "abc");
        spinner.advance();
        assert_eq!(spinner.label(), "bca");
        spinner.advance();
        spinner.advance();
        assert_eq!(spinner.label(), "abc");
    }

    #[test]
    fn default_spinner_uses_block_frames() {
        let mut spinner = Spinner::default();
        assert_eq!(spinner.label(), "░▒▒▒▒▒");
        spinner.advance();
        assert_eq!(spinner.label(), "▒▒▒▒▒░");
    }

    #[test]
    fn empty_spinner_is_stable() {
        let mut spinner = Spinner::new("");
        spinner.advance();
        assert_eq!(spinner.label(), "");
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_at_configured_period() {
        let task = HeartbeatTask::new(Duration::from_millis(100), Spinner::new("abc"));
        let label = task.label();
        let running = CancellationToken::new();

        let stopper = running.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(1_050)).await;
            stopper.cancel();
        });

        let ticks = task.run(running).await;

        // Ticks at 0, 100, ..., 1000 ms; the 11th tick shows ten rotations.
        assert_eq!(ticks, 11);
        assert_eq!(*label.borrow(), "bca");
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_are_reported_to_metrics() {
        let metrics = Arc::new(CountingMetrics::default());
        let task = HeartbeatTask::new(Duration::from_millis(100), Spinner::default())
            .with_metrics(metrics.clone());
        let running = CancellationToken::new();

        let stopper = running.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(450)).await;
            stopper.cancel();
        });

        let ticks = task.run(running).await;
        assert_eq!(ticks, 5);
        assert_eq!(CountingMetrics::get(&metrics.heartbeat_ticks), 5);
    }

    #[tokio::test]
    async fn stops_immediately_when_already_cancelled() {
        let task = HeartbeatTask::new(Duration::from_secs(60), Spinner::default());
        let running = CancellationToken::new();
        running.cancel();
        assert_eq!(task.run(running).await, 0);
    }
}
