//! DXLink Authentication
//!
//! Drives the connection handshake up to an open feed channel. The server
//! announces `AUTH_STATE UNAUTHORIZED` after `SETUP`; the client answers
//! with its token and, once authorized, requests the feed channel.
//!
//! A second `UNAUTHORIZED` after the token was sent means the token was
//! rejected. `UNAUTHORIZED` after the channel is open means the session was
//! revoked. Neither is worth retrying with the same token.

use std::time::Duration;

use thiserror::Error;

use super::messages::{AuthStatus, ClientMessage, FEED_CHANNEL, ServerMessage};

/// Maximum time allowed from socket open to an open feed channel.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur during authentication.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// The server rejected the token.
    #[error("authorization rejected: invalid or expired token")]
    Rejected,

    /// Authorization was withdrawn after the channel opened.
    #[error("authorization revoked by server")]
    Revoked,

    /// The server reported an error during the handshake.
    #[error("server error ({kind}): {message}")]
    ServerError {
        /// Error kind from the server.
        kind: String,
        /// Error message from the server.
        message: String,
    },
}

impl AuthError {
    /// Whether reconnecting with the same token could succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Rejected | Self::Revoked => false,
            Self::ServerError { kind, .. } => kind != "UNAUTHORIZED",
        }
    }
}

// =============================================================================
// Authentication State
// =============================================================================

/// Handshake progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthState {
    /// Socket open, `SETUP` not yet sent.
    #[default]
    Connected,
    /// `SETUP` sent, waiting for the server's auth state.
    SetupSent,
    /// Token sent, awaiting response.
    Authenticating,
    /// Authorized, feed channel requested.
    ChannelRequested,
    /// Feed channel open.
    Ready,
    /// Handshake failed.
    Failed,
}

impl AuthState {
    /// Check if the feed channel is open.
    #[must_use]
    pub const fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }

    /// Check if a token has been accepted.
    #[must_use]
    pub const fn is_authorized(&self) -> bool {
        matches!(self, Self::ChannelRequested | Self::Ready)
    }
}

// =============================================================================
// Authentication Handler
// =============================================================================

/// Handshake state machine for one DXLink connection.
///
/// # Example
///
/// ```ignore
/// let mut handler = AuthHandler::new(token);
/// send(handler.start(keepalive_secs));
/// while !handler.state().is_ready() {
///     let msg = receive().await?;
///     for reply in handler.on_message(&msg)? {
///         send(reply);
///     }
/// }
/// ```
#[derive(Debug)]
pub struct AuthHandler {
    token: String,
    state: AuthState,
}

impl AuthHandler {
    /// Create a handler for a fresh connection.
    #[must_use]
    pub const fn new(token: String) -> Self {
        Self {
            token,
            state: AuthState::Connected,
        }
    }

    /// Get the current state.
    #[must_use]
    pub const fn state(&self) -> AuthState {
        self.state
    }

    /// Build the opening `SETUP` message.
    #[must_use]
    pub fn start(&mut self, keepalive_timeout: Duration) -> ClientMessage {
        self.state = AuthState::SetupSent;
        ClientMessage::setup(keepalive_timeout.as_secs())
    }

    /// Process one server message, returning the replies to send.
    ///
    /// # Errors
    ///
    /// Returns an [`AuthError`] if the token is rejected, authorization is
    /// revoked, or the server reports an error.
    pub fn on_message(&mut self, msg: &ServerMessage) -> Result<Vec<ClientMessage>, AuthError> {
        match msg {
            ServerMessage::AuthState {
                state: AuthStatus::Unauthorized,
            } => match self.state {
                AuthState::Authenticating => self.fail(AuthError::Rejected),
                AuthState::ChannelRequested | AuthState::Ready => self.fail(AuthError::Revoked),
                _ => {
                    self.state = AuthState::Authenticating;
                    Ok(vec![ClientMessage::auth(&self.token)])
                }
            },
            ServerMessage::AuthState {
                state: AuthStatus::Authorized,
            } => {
                if self.state.is_authorized() {
                    return Ok(vec![]);
                }
                self.state = AuthState::ChannelRequested;
                Ok(vec![ClientMessage::feed_channel_request()])
            }
            ServerMessage::ChannelOpened { channel } if *channel == FEED_CHANNEL => {
                self.state = AuthState::Ready;
                Ok(vec![])
            }
            ServerMessage::Error { error, message } => self.fail(AuthError::ServerError {
                kind: error.clone(),
                message: message.clone(),
            }),
            _ => Ok(vec![]),
        }
    }

    fn fail(&mut self, error: AuthError) -> Result<Vec<ClientMessage>, AuthError> {
        self.state = AuthState::Failed;
        Err(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn auth_state(state: AuthStatus) -> ServerMessage {
        ServerMessage::AuthState { state }
    }

    fn ready_handler() -> AuthHandler {
        let mut handler = AuthHandler::new("tok".to_string());
        let _ = handler.start(Duration::from_secs(60));
        handler
            .on_message(&auth_state(AuthStatus::Unauthorized))
            .unwrap();
        handler
            .on_message(&auth_state(AuthStatus::Authorized))
            .unwrap();
        handler
            .on_message(&ServerMessage::ChannelOpened {
                channel: FEED_CHANNEL,
            })
            .unwrap();
        handler
    }

    #[test]
    fn full_handshake() {
        let mut handler = AuthHandler::new("tok".to_string());
        assert_eq!(handler.state(), AuthState::Connected);

        let setup = handler.start(Duration::from_secs(60));
        assert!(matches!(setup, ClientMessage::Setup { keepalive_timeout: 60, .. }));
        assert_eq!(handler.state(), AuthState::SetupSent);

        let server_setup = ServerMessage::Setup {
            version: None,
            keepalive_timeout: Some(60),
        };
        assert!(handler.on_message(&server_setup).unwrap().is_empty());

        let replies = handler
            .on_message(&auth_state(AuthStatus::Unauthorized))
            .unwrap();
        assert_eq!(replies, vec![ClientMessage::auth("tok")]);
        assert_eq!(handler.state(), AuthState::Authenticating);

        let replies = handler
            .on_message(&auth_state(AuthStatus::Authorized))
            .unwrap();
        assert_eq!(replies, vec![ClientMessage::feed_channel_request()]);
        assert!(handler.state().is_authorized());

        let replies = handler
            .on_message(&ServerMessage::ChannelOpened {
                channel: FEED_CHANNEL,
            })
            .unwrap();
        assert!(replies.is_empty());
        assert!(handler.state().is_ready());
    }

    #[test]
    fn authorized_without_challenge_is_accepted() {
        let mut handler = AuthHandler::new("tok".to_string());
        let _ = handler.start(Duration::from_secs(60));

        let replies = handler
            .on_message(&auth_state(AuthStatus::Authorized))
            .unwrap();
        assert_eq!(replies, vec![ClientMessage::feed_channel_request()]);
    }

    #[test]
    fn second_unauthorized_rejects_token() {
        let mut handler = AuthHandler::new("bad".to_string());
        let _ = handler.start(Duration::from_secs(60));
        handler
            .on_message(&auth_state(AuthStatus::Unauthorized))
            .unwrap();

        let err = handler
            .on_message(&auth_state(AuthStatus::Unauthorized))
            .unwrap_err();
        assert_eq!(err, AuthError::Rejected);
        assert!(!err.is_retryable());
        assert_eq!(handler.state(), AuthState::Failed);
    }

    #[test]
    fn unauthorized_after_ready_is_revoked() {
        let mut handler = ready_handler();
        let err = handler
            .on_message(&auth_state(AuthStatus::Unauthorized))
            .unwrap_err();
        assert_eq!(err, AuthError::Revoked);
    }

    #[test]
    fn other_channels_do_not_complete_handshake() {
        let mut handler = AuthHandler::new("tok".to_string());
        let _ = handler.start(Duration::from_secs(60));
        handler
            .on_message(&auth_state(AuthStatus::Authorized))
            .unwrap();
        handler
            .on_message(&ServerMessage::ChannelOpened { channel: 7 })
            .unwrap();
        assert!(!handler.state().is_ready());
    }

    #[test]
    fn server_error_fails_handshake() {
        let mut handler = AuthHandler::new("tok".to_string());
        let err = handler
            .on_message(&ServerMessage::Error {
                error: "TIMEOUT".to_string(),
                message: "setup timeout".to_string(),
            })
            .unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(handler.state(), AuthState::Failed);

        let unauthorized = AuthError::ServerError {
            kind: "UNAUTHORIZED".to_string(),
            message: String::new(),
        };
        assert!(!unauthorized.is_retryable());
    }
}
