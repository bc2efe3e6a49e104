//! Snapshot Gate
//!
//! Decides whether the series is in a publishable state. Upstream delivers
//! history as snapshot batches bracketed by `SNAPSHOT_BEGIN` and
//! `SNAPSHOT_END`; publishing mid-batch would show a half-applied series.
//!
//! ```text
//!            SNAPSHOT_BEGIN
//!     ┌──────────────────────────┐
//!     ▼                          │
//! Suppressed ──SNAPSHOT_END──► Publishable
//! ```
//!
//! No other flag drives a transition and `Suppressed` has no timeout.

use crate::domain::flags::EventFlags;

/// Publish eligibility of the series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GateState {
    /// A snapshot is in progress (or none has completed yet).
    #[default]
    Suppressed,
    /// The last observed snapshot completed.
    Publishable,
}

impl GateState {
    /// Label for logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Suppressed => "suppressed",
            Self::Publishable => "publishable",
        }
    }
}

/// State machine over observed snapshot flags.
#[derive(Debug, Default, Clone)]
pub struct SnapshotGate {
    state: GateState,
}

impl SnapshotGate {
    /// Create a gate in the `Suppressed` state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the flags of one observed record.
    ///
    /// Returns the new state when it changed.
    pub fn observe(&mut self, flags: EventFlags) -> Option<GateState> {
        let previous = self.state;

        // A record carrying both bits is a complete one-record snapshot.
        if flags.is_snapshot_begin() {
            self.state = GateState::Suppressed;
        }
        if flags.is_snapshot_end() {
            self.state = GateState::Publishable;
        }

        (self.state != previous).then_some(self.state)
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> GateState {
        self.state
    }

    /// Whether publishing is currently allowed.
    #[must_use]
    pub const fn is_publishable(&self) -> bool {
        matches!(self.state, GateState::Publishable)
    }
}
