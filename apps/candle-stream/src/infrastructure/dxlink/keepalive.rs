//! Keepalive Manager
//!
//! DXLink drops a client that stays silent longer than the negotiated
//! keepalive timeout, and expects the client to do the same. The manager
//! paces outgoing `KEEPALIVE` messages and detects server silence.
//!
//! It is polled inline by the connection's read loop rather than spawned,
//! so it needs no shared state: the read loop records every inbound frame
//! and awaits [`KeepaliveManager::tick`] alongside the socket.

use std::time::Duration;

use tokio::time::{Instant, Interval, MissedTickBehavior};

use crate::infrastructure::config::DxLinkSettings;

/// Configuration for keepalive behavior.
#[derive(Debug, Clone)]
pub struct KeepaliveConfig {
    /// Interval between outgoing keepalives.
    pub interval: Duration,
    /// Inbound silence after which the connection is considered dead.
    pub timeout: Duration,
}

impl Default for KeepaliveConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            timeout: Duration::from_secs(60),
        }
    }
}

impl KeepaliveConfig {
    /// Create configuration from `DxLinkSettings`.
    #[must_use]
    pub const fn from_settings(settings: &DxLinkSettings) -> Self {
        Self {
            interval: settings.keepalive_interval,
            timeout: settings.keepalive_timeout,
        }
    }
}

/// Outcome of one keepalive tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeepaliveEvent {
    /// Send a `KEEPALIVE` message.
    SendKeepalive,
    /// The server has been silent too long.
    Timeout {
        /// Time since the last inbound frame.
        silent_for: Duration,
    },
}

/// Paces keepalives and tracks inbound silence for one connection.
#[derive(Debug)]
pub struct KeepaliveManager {
    config: KeepaliveConfig,
    interval: Interval,
    last_received: Instant,
}

impl KeepaliveManager {
    /// Create a manager; the first tick fires one interval from now.
    #[must_use]
    pub fn new(config: KeepaliveConfig) -> Self {
        let now = Instant::now();
        let mut interval = tokio::time::interval_at(now + config.interval, config.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        Self {
            config,
            interval,
            last_received: now,
        }
    }

    /// Record an inbound frame.
    pub fn record_received(&mut self) {
        self.last_received = Instant::now();
    }

    /// Time since the last inbound frame.
    #[must_use]
    pub fn time_since_received(&self) -> Duration {
        self.last_received.elapsed()
    }

    /// Wait for the next tick. Cancel-safe.
    pub async fn tick(&mut self) -> KeepaliveEvent {
        self.interval.tick().await;

        let silent_for = self.time_since_received();
        if silent_for > self.config.timeout {
            tracing::warn!(
                silent_secs = silent_for.as_secs(),
                timeout_secs = self.config.timeout.as_secs(),
                "Keepalive timeout detected"
            );
            KeepaliveEvent::Timeout { silent_for }
        } else {
            KeepaliveEvent::SendKeepalive
        }
    }
}
