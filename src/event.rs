//! Events delivered to session handlers.

use std::sync::Arc;

use crate::error::SessionError;

/// One unit of work run on a session's dispatcher, in arrival order.
///
/// `M` is the decoded server message of the session's
/// [`MessageFamily`](crate::protocol::MessageFamily); `L` is handler-defined
/// local work (deferred flip-backs, countdown ticks, UI intents) that
/// re-enters the same queue.
#[derive(Debug, Clone)]
pub enum SessionEvent<M, L> {
    /// A transport was established.
    Connected,

    /// The transport closed.
    Closed {
        /// Close code from the peer, if one was received.
        code: Option<u16>,
        /// Close reason, empty if none was given.
        reason: String,
        /// Whether a background reconnect has been started.
        reconnecting: bool,
    },

    /// A connect attempt, send or receive failed.
    ///
    /// [`SessionError::ConnectFailed`] here means the reconnect budget is
    /// spent and the session stays disconnected.
    Error(Arc<SessionError>),

    /// A decoded server message.
    Message(M),

    /// Local work scheduled by a handler or the client handle.
    Local(L),
}

impl<M, L> SessionEvent<M, L> {
    /// Short name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Connected => "connected",
            Self::Closed { .. } => "closed",
            Self::Error(_) => "error",
            Self::Message(_) => "message",
            Self::Local(_) => "local",
        }
    }

    /// `true` when this event leaves the session permanently disconnected.
    pub fn is_terminal(&self) -> bool {
        match self {
            Self::Closed { reconnecting, .. } => !reconnecting,
            Self::Error(err) => matches!(**err, SessionError::ConnectFailed { .. }),
            _ => false,
        }
    }
}

/// Close details handed to `on_connection_closed` callbacks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseNotice {
    pub code: Option<u16>,
    pub reason: String,
    /// A reconnect is under way; the game may continue.
    pub reconnecting: bool,
}
