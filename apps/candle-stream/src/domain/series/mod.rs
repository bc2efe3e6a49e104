//! Series Store
//!
//! Ordered, deduplicated buffer of candle records keyed by `time`.
//!
//! # Merge Rules
//!
//! - A record flagged `REMOVE_EVENT` deletes the entry at its key (no-op when
//!   absent) and is never inserted.
//! - Any other record replaces the entry at its key in full (last write wins).
//!
//! Iteration is always ascending by `time`; the `BTreeMap` keeps that
//! invariant after every mutation.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::domain::record::CandleRecord;

/// Effect of applying one record to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// A new key was added.
    Inserted,
    /// An existing key was replaced.
    Overwritten,
    /// A tombstone deleted an existing key.
    Removed,
    /// A tombstone arrived for a key that was not present.
    RemoveMissing,
}

impl MergeOutcome {
    /// Label for logs and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Inserted => "inserted",
            Self::Overwritten => "overwritten",
            Self::Removed => "removed",
            Self::RemoveMissing => "remove_missing",
        }
    }
}

/// Time-ordered candle series for one subscription.
#[derive(Debug, Default, Clone)]
pub struct SeriesStore {
    records: BTreeMap<DateTime<Utc>, CandleRecord>,
}

impl SeriesStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge one decoded record.
    pub fn apply(&mut self, record: CandleRecord) -> MergeOutcome {
        if record.is_removal() {
            return match self.records.remove(&record.time) {
                Some(_) => MergeOutcome::Removed,
                None => MergeOutcome::RemoveMissing,
            };
        }

        match self.records.insert(record.time, record) {
            Some(_) => MergeOutcome::Overwritten,
            None => MergeOutcome::Inserted,
        }
    }

    /// Number of records held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the store holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Record at `time`, if any.
    #[must_use]
    pub fn get(&self, time: &DateTime<Utc>) -> Option<&CandleRecord> {
        self.records.get(time)
    }

    /// Records in ascending `time` order.
    pub fn iter(&self) -> impl ExactSizeIterator<Item = &CandleRecord> + Clone {
        self.records.values()
    }

    /// Copy of the records in ascending `time` order.
    #[must_use]
    pub fn to_vec(&self) -> Vec<CandleRecord> {
        self.records.values().cloned().collect()
    }
}
