//! Candle Event Records
//!
//! The canonical, decoded form of one upstream candle observation.
//! Records are keyed by `time`: two records sharing a `time` describe the
//! same logical candle and the later arrival replaces the earlier one.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::flags::EventFlags;

mod decode;

pub use decode::{DecodeError, decode_candle};

/// One OHLCV observation for a single candle period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandleRecord {
    /// Candle symbol as sent upstream (e.g. `SPY{=5m}`).
    pub symbol: String,
    /// Upstream-assigned event time (epoch millis, 0 when unset).
    pub event_time: i64,
    /// Event flags bitmask.
    pub flags: EventFlags,
    /// Upstream ordering hint.
    pub sequence_index: i64,
    /// Sequence number within the same `time`.
    pub sequence: i64,
    /// Number of trades aggregated into the candle.
    pub count: i64,
    /// Candle start instant; the identity and sort key.
    pub time: DateTime<Utc>,
    /// Opening price.
    pub open: f64,
    /// Highest price.
    pub high: f64,
    /// Lowest price.
    pub low: f64,
    /// Closing price.
    pub close: f64,
    /// Traded volume.
    pub volume: f64,
    /// Volume-weighted average price within the candle.
    pub vwap: f64,
    /// Volume traded at the bid, when reported.
    pub bid_volume: Option<f64>,
    /// Volume traded at the ask, when reported.
    pub ask_volume: Option<f64>,
    /// Implied volatility, when reported.
    pub implied_volatility: Option<f64>,
    /// Open interest, when reported.
    pub open_interest: Option<i64>,
}

impl CandleRecord {
    /// Whether this record is a tombstone for its `time` key.
    #[must_use]
    pub const fn is_removal(&self) -> bool {
        self.flags.is_remove()
    }

    /// `volume * vwap`, the record's contribution to a cumulative VWAP numerator.
    #[must_use]
    pub fn notional(&self) -> f64 {
        self.volume * self.vwap
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn removal_follows_flags() {
        assert!(!candle(0, 1.0, 1.0, 1.0).is_removal());
        assert!(flagged(0, 1.0, EventFlags::REMOVE).is_removal());
        assert!(flagged(0, 1.0, EventFlags::REMOVE | EventFlags::SNAPSHOT_END).is_removal());
    }

    #[test]
    fn notional_is_volume_times_vwap() {
        let record = candle(0, 10.0, 3.0, 20.0);
        assert!((record.notional() - 60.0).abs() < f64::EPSILON);
    }

    #[test]
    fn serializes_optional_fields_as_null() {
        let json = serde_json::to_value(candle(0, 10.0, 1.0, 10.0)).unwrap();
        assert!(json["bid_volume"].is_null());
        assert!(json["open_interest"].is_null());
    }
}
