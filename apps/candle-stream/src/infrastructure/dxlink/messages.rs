//! DXLink Message Types
//!
//! JSON messages exchanged with a DXLink WebSocket endpoint. Every message
//! carries a `type` discriminator and a `channel` number; channel 0 is the
//! connection's control channel, feed data flows on the channel opened by
//! `CHANNEL_REQUEST`.
//!
//! # Handshake
//!
//! ```text
//! client                              server
//!   SETUP ──────────────────────────►
//!         ◄────────────────────────── SETUP
//!         ◄────────────────────────── AUTH_STATE UNAUTHORIZED
//!   AUTH ───────────────────────────►
//!         ◄────────────────────────── AUTH_STATE AUTHORIZED
//!   CHANNEL_REQUEST ────────────────►
//!         ◄────────────────────────── CHANNEL_OPENED
//!   FEED_SETUP ─────────────────────►
//!   FEED_SUBSCRIPTION ──────────────►
//!         ◄────────────────────────── FEED_CONFIG
//!         ◄────────────────────────── FEED_DATA ...
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Control channel number.
pub const CONTROL_CHANNEL: u32 = 0;

/// Channel requested for the candle feed.
pub const FEED_CHANNEL: u32 = 1;

/// Protocol version announced in `SETUP`.
pub const CLIENT_VERSION: &str = concat!("0.1-candle-stream/", env!("CARGO_PKG_VERSION"));

/// dxFeed event type for OHLCV candles.
pub const CANDLE_EVENT: &str = "Candle";

/// Candle fields requested in `FEED_SETUP`.
pub const CANDLE_FIELDS: &[&str] = &[
    "eventType",
    "eventSymbol",
    "eventTime",
    "eventFlags",
    "index",
    "time",
    "sequence",
    "count",
    "open",
    "high",
    "low",
    "close",
    "volume",
    "vwap",
    "bidVolume",
    "askVolume",
    "impVolatility",
    "openInterest",
];

// =============================================================================
// Client → Server
// =============================================================================

/// Messages sent by the client.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientMessage {
    /// Connection setup.
    #[serde(rename_all = "camelCase")]
    Setup {
        /// Always the control channel.
        channel: u32,
        /// Client version string.
        version: String,
        /// Seconds the server may stay silent before we drop it.
        keepalive_timeout: u64,
        /// Seconds we may stay silent before the server drops us.
        accept_keepalive_timeout: u64,
    },
    /// Token authorization.
    Auth {
        /// Always the control channel.
        channel: u32,
        /// API quote token.
        token: String,
    },
    /// Open a service channel.
    ChannelRequest {
        /// Requested channel number.
        channel: u32,
        /// Service name (`FEED`).
        service: String,
        /// Service parameters.
        parameters: ChannelParameters,
    },
    /// Configure the data format of a feed channel.
    #[serde(rename_all = "camelCase")]
    FeedSetup {
        /// Feed channel.
        channel: u32,
        /// `FULL` (objects) or `COMPACT` (flattened arrays).
        accept_data_format: String,
        /// Requested fields per event type.
        accept_event_fields: BTreeMap<String, Vec<String>>,
    },
    /// Change the set of subscribed symbols.
    FeedSubscription {
        /// Feed channel.
        channel: u32,
        /// Drop existing subscriptions first.
        reset: bool,
        /// Subscriptions to add.
        add: Vec<FeedSubscriptionEntry>,
    },
    /// Liveness signal.
    Keepalive {
        /// Always the control channel.
        channel: u32,
    },
    /// Close a service channel.
    ChannelCancel {
        /// Channel to close.
        channel: u32,
    },
}

/// Parameters of a `CHANNEL_REQUEST`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelParameters {
    /// Feed contract (`AUTO`, `TICKER`, `HISTORY`, `STREAM`).
    pub contract: String,
}

/// One time-series subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedSubscriptionEntry {
    /// Event type.
    #[serde(rename = "type")]
    pub event_type: String,
    /// Candle symbol, e.g. `SPY{=5m}`.
    pub symbol: String,
    /// Earliest event, epoch milliseconds.
    pub from_time: i64,
}

impl ClientMessage {
    /// `SETUP` with symmetric keepalive timeouts.
    #[must_use]
    pub fn setup(keepalive_timeout_secs: u64) -> Self {
        Self::Setup {
            channel: CONTROL_CHANNEL,
            version: CLIENT_VERSION.to_string(),
            keepalive_timeout: keepalive_timeout_secs,
            accept_keepalive_timeout: keepalive_timeout_secs,
        }
    }

    /// `AUTH` carrying the API token.
    #[must_use]
    pub fn auth(token: &str) -> Self {
        Self::Auth {
            channel: CONTROL_CHANNEL,
            token: token.to_string(),
        }
    }

    /// `CHANNEL_REQUEST` for the feed service.
    #[must_use]
    pub fn feed_channel_request() -> Self {
        Self::ChannelRequest {
            channel: FEED_CHANNEL,
            service: "FEED".to_string(),
            parameters: ChannelParameters {
                contract: "AUTO".to_string(),
            },
        }
    }

    /// `FEED_SETUP` requesting full-format candle events.
    #[must_use]
    pub fn candle_feed_setup() -> Self {
        let fields = CANDLE_FIELDS.iter().map(ToString::to_string).collect();
        Self::FeedSetup {
            channel: FEED_CHANNEL,
            accept_data_format: "FULL".to_string(),
            accept_event_fields: BTreeMap::from([(CANDLE_EVENT.to_string(), fields)]),
        }
    }

    /// `FEED_SUBSCRIPTION` replacing all subscriptions with one candle series.
    #[must_use]
    pub fn candle_subscription(symbol: String, from_time_ms: i64) -> Self {
        Self::FeedSubscription {
            channel: FEED_CHANNEL,
            reset: true,
            add: vec![FeedSubscriptionEntry {
                event_type: CANDLE_EVENT.to_string(),
                symbol,
                from_time: from_time_ms,
            }],
        }
    }

    /// `KEEPALIVE` on the control channel.
    #[must_use]
    pub const fn keepalive() -> Self {
        Self::Keepalive {
            channel: CONTROL_CHANNEL,
        }
    }

    /// `CHANNEL_CANCEL` for the feed channel.
    #[must_use]
    pub const fn cancel_feed() -> Self {
        Self::ChannelCancel {
            channel: FEED_CHANNEL,
        }
    }
}

// =============================================================================
// Server → Client
// =============================================================================

/// Authorization status reported by `AUTH_STATE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthStatus {
    /// Token accepted.
    Authorized,
    /// Token required or rejected.
    Unauthorized,
}

/// Messages received from the server.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServerMessage {
    /// Server's half of the setup exchange.
    #[serde(rename_all = "camelCase")]
    Setup {
        /// Server version string.
        #[serde(default)]
        version: Option<String>,
        /// Seconds the server tolerates client silence.
        #[serde(default)]
        keepalive_timeout: Option<u64>,
    },
    /// Authorization state change.
    AuthState {
        /// New state.
        state: AuthStatus,
    },
    /// A requested channel is open.
    ChannelOpened {
        /// Channel number.
        channel: u32,
    },
    /// A channel was closed by the server.
    ChannelClosed {
        /// Channel number.
        channel: u32,
    },
    /// Effective feed configuration.
    #[serde(rename_all = "camelCase")]
    FeedConfig {
        /// Feed channel.
        channel: u32,
        /// `FULL` or `COMPACT`.
        #[serde(default)]
        data_format: Option<String>,
        /// Field order per event type, used by `COMPACT` payloads.
        #[serde(default)]
        event_fields: BTreeMap<String, Vec<String>>,
    },
    /// Batch of feed events.
    FeedData {
        /// Feed channel.
        channel: u32,
        /// Events, in `FULL` or `COMPACT` layout.
        data: serde_json::Value,
    },
    /// Liveness signal.
    Keepalive {
        /// Channel (always 0).
        #[serde(default)]
        channel: u32,
    },
    /// Protocol or authorization error.
    Error {
        /// Error kind, e.g. `UNAUTHORIZED`.
        #[serde(default)]
        error: String,
        /// Human-readable message.
        #[serde(default)]
        message: String,
    },
    /// Any message type this client does not act on.
    #[serde(other)]
    Unknown,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn setup_serializes_camel_case() {
        let value = serde_json::to_value(ClientMessage::setup(60)).unwrap();
        assert_eq!(value["type"], "SETUP");
        assert_eq!(value["channel"], 0);
        assert_eq!(value["keepaliveTimeout"], 60);
        assert_eq!(value["acceptKeepaliveTimeout"], 60);
    }

    #[test]
    fn channel_request_targets_feed_service() {
        let value = serde_json::to_value(ClientMessage::feed_channel_request()).unwrap();
        assert_eq!(
            value,
            json!({
                "type": "CHANNEL_REQUEST",
                "channel": 1,
                "service": "FEED",
                "parameters": {"contract": "AUTO"},
            })
        );
    }

    #[test]
    fn feed_setup_requests_candle_fields() {
        let value = serde_json::to_value(ClientMessage::candle_feed_setup()).unwrap();
        assert_eq!(value["type"], "FEED_SETUP");
        assert_eq!(value["acceptDataFormat"], "FULL");
        let fields = value["acceptEventFields"]["Candle"].as_array().unwrap();
        assert_eq!(fields.len(), CANDLE_FIELDS.len());
        assert_eq!(fields[0], "eventType");
    }

    #[test]
    fn candle_subscription_layout() {
        let msg = ClientMessage::candle_subscription("SPY{=5m}".to_string(), 1_733_443_200_000);
        assert_eq!(
            serde_json::to_value(msg).unwrap(),
            json!({
                "type": "FEED_SUBSCRIPTION",
                "channel": 1,
                "reset": true,
                "add": [{"type": "Candle", "symbol": "SPY{=5m}", "fromTime": 1_733_443_200_000_i64}],
            })
        );
    }

    #[test]
    fn control_messages() {
        assert_eq!(
            serde_json::to_value(ClientMessage::keepalive()).unwrap(),
            json!({"type": "KEEPALIVE", "channel": 0})
        );
        assert_eq!(
            serde_json::to_value(ClientMessage::cancel_feed()).unwrap(),
            json!({"type": "CHANNEL_CANCEL", "channel": 1})
        );
    }

    #[test]
    fn parses_auth_state() {
        let msg: ServerMessage =
            serde_json::from_value(json!({"type": "AUTH_STATE", "channel": 0, "state": "UNAUTHORIZED"}))
                .unwrap();
        assert_eq!(
            msg,
            ServerMessage::AuthState {
                state: AuthStatus::Unauthorized
            }
        );
    }

    #[test]
    fn parses_feed_config() {
        let msg: ServerMessage = serde_json::from_value(json!({
            "type": "FEED_CONFIG",
            "channel": 1,
            "dataFormat": "COMPACT",
            "aggregationPeriod": 0.1,
            "eventFields": {"Candle": ["eventType", "eventSymbol"]},
        }))
        .unwrap();
        let ServerMessage::FeedConfig {
            data_format,
            event_fields,
            ..
        } = msg
        else {
            panic!("expected FEED_CONFIG");
        };
        assert_eq!(data_format.as_deref(), Some("COMPACT"));
        assert_eq!(event_fields["Candle"].len(), 2);
    }

    #[test]
    fn unknown_types_parse_as_unknown() {
        let msg: ServerMessage =
            serde_json::from_value(json!({"type": "SOMETHING_NEW", "channel": 3})).unwrap();
        assert_eq!(msg, ServerMessage::Unknown);
    }
}
