//! Cumulative VWAP Indicator
//!
//! For position `i` of an ascending series:
//!
//! ```text
//! vwap_i = Σ(volume_j · vwap_j) / Σ(volume_j),  j ∈ 0..=i
//! ```
//!
//! Positions whose cumulative volume is zero (or whose result is not a
//! finite number) have no value.

use crate::domain::record::CandleRecord;

/// Recompute the cumulative VWAP for every record of an ascending series.
///
/// The output is aligned with the input: one entry per record.
pub fn cumulative_vwap<'a, I>(records: I) -> Vec<Option<f64>>
where
    I: IntoIterator<Item = &'a CandleRecord>,
{
    let mut running = RunningVwap::new();
    records.into_iter().map(|r| running.push(r)).collect()
}

/// Incremental form of [`cumulative_vwap`] for append-only series.
#[derive(Debug, Default, Clone, Copy)]
pub struct RunningVwap {
    notional: f64,
    volume: f64,
}

impl RunningVwap {
    /// Start from an empty series.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            notional: 0.0,
            volume: 0.0,
        }
    }

    /// Fold the next record in and return the indicator at its position.
    pub fn push(&mut self, record: &CandleRecord) -> Option<f64> {
        self.notional += record.notional();
        self.volume += record.volume;
        self.value()
    }

    /// Indicator value for everything pushed so far.
    #[must_use]
    pub fn value(&self) -> Option<f64> {
        if self.volume == 0.0 {
            return None;
        }
        let value = self.notional / self.volume;
        value.is_finite().then_some(value)
    }
}
