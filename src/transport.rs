//! Transport abstraction for the game session layer.
//!
//! A [`Transport`] is one live bidirectional socket. It moves text frames and
//! reports close notifications; it knows nothing about the game protocol.
//! Frames may arrive fragmented: every [`TransportFrame::Text`] carries a
//! `last` marker and the codec reassembles fragments before parsing.
//!
//! A [`Connector`] builds a fresh, connected transport for a URL. The session
//! calls it once per connect attempt, so reconnecting always starts from a new
//! socket.
//!
//! # Implementing a Custom Transport
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use memory_match_client::error::SessionError;
//! use memory_match_client::transport::{Transport, TransportFrame};
//!
//! struct MyTransport { /* ... */ }
//!
//! #[async_trait]
//! impl Transport for MyTransport {
//!     async fn send(&mut self, message: String) -> Result<(), SessionError> {
//!         // Send one complete JSON text message
//!         todo!()
//!     }
//!
//!     async fn recv(&mut self) -> Option<Result<TransportFrame, SessionError>> {
//!         // Yield the next text fragment or close notification
//!         todo!()
//!     }
//!
//!     async fn close(&mut self) -> Result<(), SessionError> {
//!         // Send a normal-closure frame and wait for the peer
//!         todo!()
//!     }
//! }
//! ```

use async_trait::async_trait;

use crate::error::SessionError;

/// Close code for a normal, intentional closure (RFC 6455 §7.4.1).
pub const NORMAL_CLOSURE: u16 = 1000;

/// One unit delivered by a [`Transport`]'s receive path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportFrame {
    /// A text fragment. `last` is `true` on the final fragment of a message;
    /// unfragmented messages arrive as a single fragment with `last = true`.
    Text {
        /// Fragment payload.
        data: String,
        /// Whether this fragment completes the message.
        last: bool,
    },
    /// The peer closed the connection.
    Close {
        /// Close status code, e.g. [`NORMAL_CLOSURE`].
        code: u16,
        /// Close reason supplied by the peer.
        reason: String,
    },
}

impl TransportFrame {
    /// A complete, unfragmented text message.
    pub fn text(data: impl Into<String>) -> Self {
        Self::Text {
            data: data.into(),
            last: true,
        }
    }

    /// A text fragment with an explicit final-fragment marker.
    pub fn fragment(data: impl Into<String>, last: bool) -> Self {
        Self::Text {
            data: data.into(),
            last,
        }
    }

    /// A close notification.
    pub fn close(code: u16, reason: impl Into<String>) -> Self {
        Self::Close {
            code,
            reason: reason.into(),
        }
    }
}

/// A bidirectional text transport holding a single live socket.
///
/// # Object Safety
///
/// This trait is object-safe; the session stores transports as
/// `Box<dyn Transport>` so connectors for different backends are
/// interchangeable.
///
/// # Cancel Safety
///
/// [`recv`](Transport::recv) **MUST** be cancel-safe because the receive task
/// polls it inside `tokio::select!`. Channel-based implementations are
/// naturally cancel-safe.
#[async_trait]
pub trait Transport: Send + 'static {
    /// Send one complete JSON text message.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::TransportSend`] if the message could not be
    /// written, or [`SessionError::TransportClosed`] after [`close`](Transport::close).
    async fn send(&mut self, message: String) -> Result<(), SessionError>;

    /// Receive the next frame.
    ///
    /// Returns:
    /// - `Some(Ok(frame))`: a text fragment or a close notification
    /// - `Some(Err(e))`: a transport error occurred
    /// - `None`: the stream ended without a close frame
    async fn recv(&mut self) -> Option<Result<TransportFrame, SessionError>>;

    /// Send a normal-closure frame and wait for the peer to acknowledge it.
    ///
    /// Callers bound this with a timeout; implementations should still release
    /// resources if the handshake fails.
    ///
    /// # Errors
    ///
    /// Returns an error if the close frame could not be sent.
    async fn close(&mut self) -> Result<(), SessionError>;
}

/// Builds connected transports for a URL.
///
/// The session bounds every call with its connect timeout.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Open a fresh connection to `url`.
    ///
    /// # Errors
    ///
    /// Returns any error raised while establishing the connection.
    async fn connect(&self, url: &str) -> Result<Box<dyn Transport>, SessionError>;
}
