//! Error types for the game session layer.

use thiserror::Error;

/// Errors that can occur while running a game-room or matchmaking session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Failed to send a frame through the transport.
    #[error("transport send error: {0}")]
    TransportSend(String),

    /// Failed to receive a frame from the transport.
    #[error("transport receive error: {0}")]
    TransportReceive(String),

    /// The transport connection was closed.
    #[error("transport connection closed")]
    TransportClosed,

    /// Failed to serialize an outgoing message.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Attempted to send while the session is not connected.
    #[error("not connected to server")]
    NotConnected,

    /// An operation did not complete within its deadline.
    #[error("operation timed out")]
    Timeout,

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A server endpoint could not be parsed.
    #[error("invalid server URL: {0}")]
    InvalidUrl(String),

    /// Connecting failed and no reconnect attempts remain.
    #[error("connect failed after {attempts} reconnect attempt(s): {reason}")]
    ConnectFailed {
        /// Reconnect attempts spent before giving up.
        attempts: u32,
        /// Display form of the last underlying failure.
        reason: String,
    },

    /// The server sent an `error` message.
    #[error("server error: {message}")]
    Server {
        /// Human-readable error message from the server.
        message: String,
    },

    /// The matchmaking server removed the player from the queue.
    #[error("queue timeout: {message}")]
    QueueTimeout {
        /// Message supplied by the server.
        message: String,
    },

    /// A pending connect or reconnect was cancelled by `disconnect()`.
    #[error("connect cancelled")]
    Cancelled,

    /// The session is closing and accepts no further work.
    #[error("session is shutting down")]
    ShuttingDown,
}

impl SessionError {
    /// Returns `true` for failures of the underlying socket, which are the
    /// only failures the connection manager retries.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::TransportSend(_)
                | Self::TransportReceive(_)
                | Self::TransportClosed
                | Self::Timeout
                | Self::Io(_)
                | Self::ConnectFailed { .. }
        )
    }
}

/// Reasons an incoming frame is dropped by the codec.
///
/// Never propagated to callers: the receive path logs these and continues.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The frame is not valid JSON.
    #[error("malformed JSON: {0}")]
    Malformed(#[source] serde_json::Error),

    /// The frame has no string tag in the envelope field.
    #[error("missing `{field}` tag")]
    MissingTag {
        /// Envelope field that was expected.
        field: &'static str,
    },

    /// The tag is not part of this protocol.
    #[error("unknown tag `{0}`")]
    UnknownTag(String),

    /// The tag is known but its fields do not match.
    #[error("invalid `{tag}` payload: {source}")]
    InvalidPayload {
        /// Tag of the rejected frame.
        tag: String,
        /// Decoder failure.
        #[source]
        source: serde_json::Error,
    },
}

/// A specialized [`Result`] type for session operations.
pub type Result<T> = std::result::Result<T, SessionError>;
