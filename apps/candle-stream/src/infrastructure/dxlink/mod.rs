//! DXLink WebSocket Adapter
//!
//! Implements the upstream candle source over dxFeed's DXLink protocol
//! (JSON over WebSocket):
//!
//! - `messages`: protocol message types
//! - `codec`: frame encoding and `FEED_DATA` splitting
//! - `auth`: handshake state machine
//! - `keepalive`: outgoing keepalives and silence detection
//! - `reconnect`: backoff between connect attempts
//! - `client`: the [`CandleSource`](crate::application::ports::CandleSource) adapter

pub mod auth;
pub mod client;
pub mod codec;
pub mod keepalive;
pub mod messages;
pub mod reconnect;

pub use auth::{AuthError, AuthHandler, AuthState};
pub use client::{DxLinkClient, DxLinkClientConfig, DxLinkClientError};
pub use codec::{CodecError, DxLinkCodec};
pub use keepalive::{KeepaliveConfig, KeepaliveEvent, KeepaliveManager};
pub use messages::{ClientMessage, ServerMessage};
pub use reconnect::{ReconnectConfig, ReconnectPolicy};
