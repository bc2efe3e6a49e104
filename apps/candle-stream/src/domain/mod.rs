//! Domain Layer - Core candle series types and algorithms.
//!
//! Pure, synchronous logic with no I/O: the decoded record type, flag
//! interpretation, the merge store, the publish gate and the indicator.

/// Decoded candle records.
pub mod record;

/// Upstream event flag bitmask.
pub mod flags;

/// Ordered, deduplicated candle storage.
pub mod series;

/// Snapshot publish gate.
pub mod gate;

/// Cumulative VWAP indicator.
pub mod indicator;
