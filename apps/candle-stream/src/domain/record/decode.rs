//! Candle decoding from dynamically shaped upstream events.
//!
//! Upstream events are JSON objects using the dxFeed `Candle` field names.
//! Numeric fields may arrive as JSON numbers or as strings (`"NaN"` is how
//! dxFeed spells a missing value).
//!
//! - Required prices and volumes (`open`..`vwap`) must coerce to `f64`,
//!   otherwise the whole event is rejected.
//! - Optional fields that are absent, `null` or non-finite decode to `None`.

use chrono::{DateTime, TimeZone, Utc};
use serde_json::{Map, Value};

use super::CandleRecord;
use crate::domain::flags::EventFlags;

/// Event type name for candles.
pub const CANDLE_EVENT_TYPE: &str = "Candle";

/// Reasons an upstream event cannot become a [`CandleRecord`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// The event is not a JSON object.
    #[error("event is not an object")]
    NotAnObject,

    /// The event carries a type other than `Candle`.
    #[error("unexpected event type: {0}")]
    UnexpectedEventType(String),

    /// A required field is absent or null.
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    /// A field is present but cannot be coerced to its type.
    #[error("invalid value for {field}: {value}")]
    InvalidField {
        /// Field name.
        field: &'static str,
        /// Offending value, as JSON.
        value: String,
    },
}

impl DecodeError {
    /// Short label for metrics.
    #[must_use]
    pub const fn reason(&self) -> &'static str {
        match self {
            Self::NotAnObject => "not_an_object",
            Self::UnexpectedEventType(_) => "unexpected_event_type",
            Self::MissingField(_) => "missing_field",
            Self::InvalidField { .. } => "invalid_field",
        }
    }
}

/// Decode one upstream event into a candle record.
///
/// # Errors
///
/// Returns a [`DecodeError`] when the event is not a candle object or any
/// required field is missing or malformed. No partial record is produced.
pub fn decode_candle(raw: &Value) -> Result<CandleRecord, DecodeError> {
    let object = raw.as_object().ok_or(DecodeError::NotAnObject)?;

    if let Some(event_type) = object.get("eventType").and_then(Value::as_str)
        && event_type != CANDLE_EVENT_TYPE
    {
        return Err(DecodeError::UnexpectedEventType(event_type.to_string()));
    }

    let symbol = match object.get("eventSymbol") {
        Some(Value::String(s)) if !s.is_empty() => s.clone(),
        None | Some(Value::Null) => return Err(DecodeError::MissingField("eventSymbol")),
        Some(other) => return Err(invalid("eventSymbol", other)),
    };

    let time_millis = required_int(object, "time")?;
    let time = millis_to_utc(time_millis).ok_or_else(|| DecodeError::InvalidField {
        field: "time",
        value: time_millis.to_string(),
    })?;

    let flags = optional_int(object, "eventFlags")?.unwrap_or(0);
    let flags = u32::try_from(flags).map_err(|_| DecodeError::InvalidField {
        field: "eventFlags",
        value: flags.to_string(),
    })?;

    Ok(CandleRecord {
        symbol,
        event_time: optional_int(object, "eventTime")?.unwrap_or(0),
        flags: EventFlags::from_bits(flags),
        sequence_index: optional_int(object, "index")?.unwrap_or(0),
        sequence: optional_int(object, "sequence")?.unwrap_or(0),
        count: optional_int(object, "count")?.unwrap_or(0),
        time,
        open: required_float(object, "open")?,
        high: required_float(object, "high")?,
        low: required_float(object, "low")?,
        close: required_float(object, "close")?,
        volume: required_float(object, "volume")?,
        vwap: required_float(object, "vwap")?,
        bid_volume: optional_float(object, "bidVolume")?,
        ask_volume: optional_float(object, "askVolume")?,
        implied_volatility: optional_float(object, "impVolatility")?,
        open_interest: optional_int(object, "openInterest")?,
    })
}

fn invalid(field: &'static str, value: &Value) -> DecodeError {
    DecodeError::InvalidField {
        field,
        value: value.to_string(),
    }
}

fn millis_to_utc(millis: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(millis).single()
}

/// Coerce a JSON number or numeric string to `f64`.
fn coerce_float(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// Coerce a JSON number or numeric string to `i64`.
///
/// Floats are accepted only when they carry an integral value; `NaN` is not
/// an integer and yields `None`.
#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
fn coerce_int(value: &Value) -> Option<i64> {
    if let Some(i) = value.as_i64() {
        return Some(i);
    }
    let f = coerce_float(value)?;
    if f.is_finite() && f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
        Some(f as i64)
    } else {
        None
    }
}

fn required_float(object: &Map<String, Value>, field: &'static str) -> Result<f64, DecodeError> {
    match object.get(field) {
        None | Some(Value::Null) => Err(DecodeError::MissingField(field)),
        Some(value) => coerce_float(value).ok_or_else(|| invalid(field, value)),
    }
}

fn optional_float(
    object: &Map<String, Value>,
    field: &'static str,
) -> Result<Option<f64>, DecodeError> {
    match object.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => coerce_float(value)
            .map(|f| f.is_finite().then_some(f))
            .ok_or_else(|| invalid(field, value)),
    }
}

fn required_int(object: &Map<String, Value>, field: &'static str) -> Result<i64, DecodeError> {
    match object.get(field) {
        None | Some(Value::Null) => Err(DecodeError::MissingField(field)),
        Some(value) => coerce_int(value).ok_or_else(|| invalid(field, value)),
    }
}

fn optional_int(
    object: &Map<String, Value>,
    field: &'static str,
) -> Result<Option<i64>, DecodeError> {
    match object.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.trim().eq_ignore_ascii_case("nan") => Ok(None),
        Some(value) => coerce_int(value)
            .map(Some)
            .ok_or_else(|| invalid(field, value)),
    }
}
