//! DXLink Codec
//!
//! Encodes client messages, decodes server messages and splits `FEED_DATA`
//! payloads into one raw JSON object per event.
//!
//! # Payload layouts
//!
//! `FULL` sends an array of objects:
//! ```json
//! [{"eventType":"Candle","eventSymbol":"SPY{=5m}","time":1733495400000,...}, ...]
//! ```
//!
//! `COMPACT` sends the event type followed by a flat array of values in the
//! field order announced by `FEED_CONFIG`:
//! ```json
//! ["Candle", ["Candle","SPY{=5m}",1733495400000, ..., "Candle","SPY{=5m}",...]]
//! ```

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use super::messages::{ClientMessage, ServerMessage};
use crate::application::ports::RawEvent;

/// Codec errors.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// JSON encoding/decoding failed.
    #[error("JSON codec error: {0}")]
    Json(#[from] serde_json::Error),

    /// `COMPACT` payload for an event type with no announced field list.
    #[error("no field list announced for event type {0}")]
    UnknownEventFields(String),

    /// Invalid payload layout.
    #[error("invalid message format: {0}")]
    InvalidFormat(String),
}

/// JSON codec for DXLink text frames.
#[derive(Debug, Default, Clone)]
pub struct DxLinkCodec {
    event_fields: BTreeMap<String, Vec<String>>,
}

impl DxLinkCodec {
    /// Create a new codec.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode one text frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame is not a DXLink JSON message.
    pub fn decode(&self, text: &str) -> Result<ServerMessage, CodecError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Encode one client message.
    ///
    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn encode(&self, message: &ClientMessage) -> Result<String, CodecError> {
        Ok(serde_json::to_string(message)?)
    }

    /// Remember the field order announced by `FEED_CONFIG`.
    pub fn set_event_fields(&mut self, event_fields: BTreeMap<String, Vec<String>>) {
        if !event_fields.is_empty() {
            self.event_fields = event_fields;
        }
    }

    /// Split a `FEED_DATA` payload into individual raw events.
    ///
    /// Elements that are not objects are passed through untouched; the
    /// decoder downstream rejects them.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload is not an array, or a `COMPACT`
    /// payload names an event type without an announced field list.
    pub fn split_feed_data(&self, data: Value) -> Result<Vec<RawEvent>, CodecError> {
        let Value::Array(items) = data else {
            return Err(CodecError::InvalidFormat(
                "FEED_DATA payload is not an array".to_string(),
            ));
        };

        if matches!(items.first(), Some(Value::String(_))) {
            self.split_compact(items)
        } else {
            Ok(items)
        }
    }

    fn split_compact(&self, items: Vec<Value>) -> Result<Vec<RawEvent>, CodecError> {
        let mut events = Vec::new();
        let mut items = items.into_iter();

        while let Some(head) = items.next() {
            let Value::String(event_type) = head else {
                return Err(CodecError::InvalidFormat(format!(
                    "expected event type, got {head}"
                )));
            };
            let Some(Value::Array(values)) = items.next() else {
                return Err(CodecError::InvalidFormat(format!(
                    "missing value array for {event_type}"
                )));
            };
            let fields = self
                .event_fields
                .get(&event_type)
                .filter(|fields| !fields.is_empty())
                .ok_or_else(|| CodecError::UnknownEventFields(event_type.clone()))?;

            if values.len() % fields.len() != 0 {
                return Err(CodecError::InvalidFormat(format!(
                    "{} values for {} {event_type} fields",
                    values.len(),
                    fields.len()
                )));
            }

            for chunk in values.chunks(fields.len()) {
                let mut object: Map<String, Value> = fields
                    .iter()
                    .cloned()
                    .zip(chunk.iter().cloned())
                    .collect();
                object
                    .entry("eventType")
                    .or_insert_with(|| Value::String(event_type.clone()));
                events.push(Value::Object(object));
            }
        }

        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::infrastructure::dxlink::messages::AuthStatus;

    #[test]
    fn decodes_control_messages() {
        let codec = DxLinkCodec::new();
        let msg = codec
            .decode(r#"{"type":"AUTH_STATE","channel":0,"state":"AUTHORIZED","userId":"x"}"#)
            .unwrap();
        assert_eq!(
            msg,
            ServerMessage::AuthState {
                state: AuthStatus::Authorized
            }
        );
    }

    #[test]
    fn rejects_non_json() {
        let codec = DxLinkCodec::new();
        assert!(matches!(codec.decode("hello"), Err(CodecError::Json(_))));
    }

    #[test]
    fn encodes_keepalive() {
        let codec = DxLinkCodec::new();
        assert_eq!(
            codec.encode(&ClientMessage::keepalive()).unwrap(),
            r#"{"type":"KEEPALIVE","channel":0}"#
        );
    }

    #[test]
    fn full_payload_passes_objects_through() {
        let codec = DxLinkCodec::new();
        let events = codec
            .split_feed_data(json!([
                {"eventType": "Candle", "eventSymbol": "SPY{=5m}", "time": 1},
                {"eventType": "Quote", "eventSymbol": "SPY"},
                42,
            ]))
            .unwrap();

        assert_eq!(events.len(), 3);
        assert_eq!(events[0]["time"], 1);
        assert_eq!(events[1]["eventType"], "Quote");
        assert_eq!(events[2], json!(42));
    }

    #[test]
    fn compact_payload_is_zipped_with_announced_fields() {
        let mut codec = DxLinkCodec::new();
        codec.set_event_fields(BTreeMap::from([(
            "Candle".to_string(),
            vec![
                "eventType".to_string(),
                "eventSymbol".to_string(),
                "close".to_string(),
            ],
        )]));

        let events = codec
            .split_feed_data(json!([
                "Candle",
                ["Candle", "SPY{=5m}", 1.5, "Candle", "SPY{=5m}", "NaN"],
            ]))
            .unwrap();

        assert_eq!(
            events,
            vec![
                json!({"eventType": "Candle", "eventSymbol": "SPY{=5m}", "close": 1.5}),
                json!({"eventType": "Candle", "eventSymbol": "SPY{=5m}", "close": "NaN"}),
            ]
        );
    }

    #[test]
    fn compact_payload_without_fields_is_an_error() {
        let codec = DxLinkCodec::new();
        assert!(matches!(
            codec.split_feed_data(json!(["Candle", [1, 2]])),
            Err(CodecError::UnknownEventFields(t)) if t == "Candle"
        ));
    }

    #[test]
    fn ragged_compact_payload_is_an_error() {
        let mut codec = DxLinkCodec::new();
        codec.set_event_fields(BTreeMap::from([(
            "Candle".to_string(),
            vec!["eventSymbol".to_string(), "close".to_string()],
        )]));
        assert!(matches!(
            codec.split_feed_data(json!(["Candle", ["SPY", 1.0, "SPY"]])),
            Err(CodecError::InvalidFormat(_))
        ));
    }

    #[test]
    fn non_array_payload_is_an_error() {
        let codec = DxLinkCodec::new();
        assert!(matches!(
            codec.split_feed_data(json!({"eventType": "Candle"})),
            Err(CodecError::InvalidFormat(_))
        ));
    }
}
