//! DXLink WebSocket Client
//!
//! Implements the [`CandleSource`] port over a DXLink endpoint.
//!
//! # Lifecycle
//!
//! - `subscribe`: connect, run the handshake, send `FEED_SETUP` and
//!   `FEED_SUBSCRIPTION`. Failed attempts are retried with backoff; a
//!   rejected token is not.
//! - `next_event`: pop the pending queue, otherwise read frames until a
//!   `FEED_DATA` batch refills it. Keepalives are sent from the same loop;
//!   a due keepalive stays queued until it has been written, so a
//!   cancelled poll never loses one. Undecodable frames are logged,
//!   counted and skipped.
//! - `close`: `CHANNEL_CANCEL`, then a close frame. Idempotent.
//!
//! Losing the connection after `subscribe` surfaces as
//! [`SourceError::Unavailable`]; the stream loop treats it as fatal.

use std::collections::VecDeque;

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use super::auth::{AuthError, AuthHandler, HANDSHAKE_TIMEOUT};
use super::codec::{CodecError, DxLinkCodec};
use super::keepalive::{KeepaliveConfig, KeepaliveEvent, KeepaliveManager};
use super::messages::{AuthStatus, ClientMessage, FEED_CHANNEL, ServerMessage};
use super::reconnect::{ReconnectConfig, ReconnectPolicy};
use crate::application::ports::{CandleSource, CandleSubscription, RawEvent, SourceError};
use crate::infrastructure::config::{Credentials, StreamConfig};
use crate::infrastructure::metrics;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

// =============================================================================
// Error Type
// =============================================================================

/// Errors that can occur in the DXLink client.
#[derive(Debug, thiserror::Error)]
pub enum DxLinkClientError {
    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Authentication failed.
    #[error("authentication failed: {0}")]
    Auth(#[from] AuthError),

    /// Codec error.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// Handshake did not complete in time.
    #[error("handshake timed out after {0:?}")]
    HandshakeTimeout(std::time::Duration),

    /// Server went silent.
    #[error("keepalive timeout: no message for {0:?}")]
    KeepaliveTimeout(std::time::Duration),

    /// Server reported an error.
    #[error("server error ({kind}): {message}")]
    Server {
        /// Error kind from the server.
        kind: String,
        /// Error message from the server.
        message: String,
    },

    /// Server closed the feed channel.
    #[error("feed channel {0} closed by server")]
    ChannelClosed(u32),

    /// Connection closed.
    #[error("connection closed")]
    ConnectionClosed,
}

impl DxLinkClientError {
    /// Whether another connect attempt could succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Auth(e) => e.is_retryable(),
            _ => true,
        }
    }
}

impl From<DxLinkClientError> for SourceError {
    fn from(e: DxLinkClientError) -> Self {
        Self::Unavailable(e.to_string())
    }
}

// =============================================================================
// Client Configuration
// =============================================================================

/// Configuration for the DXLink client.
#[derive(Debug, Clone)]
pub struct DxLinkClientConfig {
    /// WebSocket URL.
    pub url: String,
    /// API quote token.
    pub credentials: Credentials,
    /// Keepalive configuration.
    pub keepalive: KeepaliveConfig,
    /// Connect retry configuration.
    pub reconnect: ReconnectConfig,
}

impl DxLinkClientConfig {
    /// Create a configuration with default keepalive and retry settings.
    #[must_use]
    pub fn new(url: String, credentials: Credentials) -> Self {
        Self {
            url,
            credentials,
            keepalive: KeepaliveConfig::default(),
            reconnect: ReconnectConfig::default(),
        }
    }

    /// Create configuration from the stream configuration.
    #[must_use]
    pub fn from_config(config: &StreamConfig) -> Self {
        Self {
            url: config.dxlink.url.clone(),
            credentials: config.credentials.clone(),
            keepalive: KeepaliveConfig::from_settings(&config.dxlink),
            reconnect: ReconnectConfig::from_settings(&config.dxlink),
        }
    }
}

// =============================================================================
// Connection
// =============================================================================

/// One authorized socket with an open feed channel.
struct Connection {
    write: SplitSink<WsStream, Message>,
    read: SplitStream<WsStream>,
    keepalive: KeepaliveManager,
    keepalive_due: bool,
}

impl Connection {
    async fn send(
        &mut self,
        codec: &DxLinkCodec,
        message: &ClientMessage,
    ) -> Result<(), DxLinkClientError> {
        let text = codec.encode(message)?;
        self.write.send(Message::text(text)).await?;
        Ok(())
    }

    /// Read the next text frame. Control frames yield `None`.
    async fn receive(
        &mut self,
        codec: &DxLinkCodec,
    ) -> Result<Option<ServerMessage>, DxLinkClientError> {
        let frame = self.read.next().await;
        self.on_frame(codec, frame)
    }

    fn on_frame(
        &mut self,
        codec: &DxLinkCodec,
        frame: Option<Result<Message, tokio_tungstenite::tungstenite::Error>>,
    ) -> Result<Option<ServerMessage>, DxLinkClientError> {
        match frame {
            Some(Ok(Message::Text(text))) => {
                self.keepalive.record_received();
                Ok(Some(codec.decode(text.as_str())?))
            }
            Some(Ok(Message::Close(frame))) => {
                debug!(?frame, "Server sent close frame");
                Err(DxLinkClientError::ConnectionClosed)
            }
            Some(Ok(_)) => {
                self.keepalive.record_received();
                Ok(None)
            }
            Some(Err(e)) => Err(e.into()),
            None => Err(DxLinkClientError::ConnectionClosed),
        }
    }
}

// =============================================================================
// DXLink Client
// =============================================================================

/// DXLink candle feed client.
pub struct DxLinkClient {
    config: DxLinkClientConfig,
    codec: DxLinkCodec,
    connection: Option<Connection>,
    pending: VecDeque<RawEvent>,
    closed: bool,
}

impl DxLinkClient {
    /// Create a new client. No connection is made until `subscribe`.
    #[must_use]
    pub fn new(config: DxLinkClientConfig) -> Self {
        Self {
            config,
            codec: DxLinkCodec::new(),
            connection: None,
            pending: VecDeque::new(),
            closed: false,
        }
    }

    /// Check if a subscription is currently open.
    #[must_use]
    pub const fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    /// Connect and run the handshake once.
    async fn connect(
        &mut self,
        subscription: &CandleSubscription,
    ) -> Result<Connection, DxLinkClientError> {
        info!(url = %self.config.url, "Connecting to DXLink");

        let (ws_stream, _response) =
            tokio_tungstenite::connect_async(self.config.url.as_str()).await?;
        let (write, read) = ws_stream.split();
        let mut connection = Connection {
            write,
            read,
            keepalive: KeepaliveManager::new(self.config.keepalive.clone()),
            keepalive_due: false,
        };

        let mut auth = AuthHandler::new(self.config.credentials.token().to_string());
        let setup = auth.start(self.config.keepalive.timeout);
        connection.send(&self.codec, &setup).await?;

        while !auth.state().is_ready() {
            let Some(message) = connection.receive(&self.codec).await? else {
                continue;
            };
            if let ServerMessage::FeedConfig { event_fields, .. } = &message {
                self.codec.set_event_fields(event_fields.clone());
            }
            for reply in auth.on_message(&message)? {
                connection.send(&self.codec, &reply).await?;
            }
        }

        connection
            .send(&self.codec, &ClientMessage::candle_feed_setup())
            .await?;
        connection
            .send(
                &self.codec,
                &ClientMessage::candle_subscription(
                    subscription.candle_symbol(),
                    subscription.from_time.timestamp_millis(),
                ),
            )
            .await?;

        Ok(connection)
    }

    /// Apply one post-handshake server message.
    fn handle_message(&mut self, message: ServerMessage) -> Result<(), DxLinkClientError> {
        match message {
            ServerMessage::FeedData { channel, data } if channel == FEED_CHANNEL => {
                let events = self.codec.split_feed_data(data)?;
                debug!(count = events.len(), "Feed data batch");
                self.pending.extend(events);
            }
            ServerMessage::FeedConfig {
                data_format,
                event_fields,
                ..
            } => {
                debug!(?data_format, "Feed configuration received");
                self.codec.set_event_fields(event_fields);
            }
            ServerMessage::AuthState {
                state: AuthStatus::Unauthorized,
            } => return Err(AuthError::Revoked.into()),
            ServerMessage::ChannelClosed { channel } if channel == FEED_CHANNEL => {
                return Err(DxLinkClientError::ChannelClosed(channel));
            }
            ServerMessage::Error { error, message } => {
                return Err(DxLinkClientError::Server {
                    kind: error,
                    message,
                });
            }
            _ => {}
        }
        Ok(())
    }

    /// Read until the pending queue has an event.
    async fn fill_pending(&mut self) -> Result<(), DxLinkClientError> {
        while self.pending.is_empty() {
            let connection = self
                .connection
                .as_mut()
                .ok_or(DxLinkClientError::ConnectionClosed)?;

            if connection.keepalive_due {
                connection
                    .send(&self.codec, &ClientMessage::keepalive())
                    .await?;
                connection.keepalive_due = false;
            }

            let received = tokio::select! {
                event = connection.keepalive.tick() => {
                    match event {
                        KeepaliveEvent::SendKeepalive => connection.keepalive_due = true,
                        KeepaliveEvent::Timeout { silent_for } => {
                            return Err(DxLinkClientError::KeepaliveTimeout(silent_for));
                        }
                    }
                    continue;
                }
                frame = connection.read.next() => connection.on_frame(&self.codec, frame),
            };

            let handled = match received {
                Ok(Some(message)) => self.handle_message(message),
                Ok(None) => Ok(()),
                Err(e) => Err(e),
            };
            match handled {
                Err(DxLinkClientError::Codec(e)) => {
                    warn!(error = %e, "Discarding undecodable DXLink frame");
                    metrics::record_decode_failure("dxlink_frame");
                }
                other => other?,
            }
        }
        Ok(())
    }
}

#[async_trait]
impl CandleSource for DxLinkClient {
    async fn subscribe(&mut self, subscription: &CandleSubscription) -> Result<(), SourceError> {
        if self.closed {
            return Err(SourceError::Closed);
        }

        let mut policy = ReconnectPolicy::new(self.config.reconnect.clone());
        loop {
            metrics::record_connect_attempt();
            let error = match tokio::time::timeout(HANDSHAKE_TIMEOUT, self.connect(subscription))
                .await
            {
                Ok(Ok(connection)) => {
                    info!(symbol = %subscription.candle_symbol(), "DXLink feed subscribed");
                    self.connection = Some(connection);
                    return Ok(());
                }
                Ok(Err(e)) => e,
                Err(_elapsed) => DxLinkClientError::HandshakeTimeout(HANDSHAKE_TIMEOUT),
            };

            if !error.is_retryable() {
                warn!(error = %error, "DXLink connect failed permanently");
                return Err(error.into());
            }

            let Some(delay) = policy.next_delay() else {
                warn!(attempts = policy.failures(), error = %error, "DXLink connect attempts exhausted");
                return Err(error.into());
            };
            warn!(
                attempt = policy.failures(),
                delay_ms = delay.as_millis(),
                error = %error,
                "DXLink connect failed, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }

    async fn next_event(&mut self) -> Result<RawEvent, SourceError> {
        if self.closed {
            return Err(SourceError::Closed);
        }

        if let Err(e) = self.fill_pending().await {
            warn!(error = %e, "DXLink connection lost");
            self.connection = None;
            return Err(e.into());
        }

        self.pending
            .pop_front()
            .ok_or_else(|| SourceError::Unavailable("no pending event".to_string()))
    }

    async fn close(&mut self) -> Result<(), SourceError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.pending.clear();

        let Some(mut connection) = self.connection.take() else {
            return Ok(());
        };

        if let Err(e) = connection
            .send(&self.codec, &ClientMessage::cancel_feed())
            .await
        {
            debug!(error = %e, "Failed to send CHANNEL_CANCEL");
        }
        if let Err(e) = connection.write.send(Message::Close(None)).await {
            debug!(error = %e, "Failed to send close frame");
        }
        info!("DXLink connection closed");
        Ok(())
    }
}
