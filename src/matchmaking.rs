//! Matchmaking queue client.
//!
//! Runs the same session core as the game room with the queue message set.
//! On connect the client enters the queue with the player's credentials and
//! skill score, then waits for the server to announce a match. A match is
//! committed once; repeated `match_found` notices are ignored.

use std::fmt;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

use crate::config::{QueueConfig, SessionConfig};
use crate::error::{Result, SessionError};
use crate::event::{CloseNotice, SessionEvent};
use crate::identity::{IdentityProvider, PlayerIdentity};
use crate::protocol::{MatchFound, Matchmaking, QueueNotice, QueueRequest, QueueTicket};
use crate::session::{HandlerContext, HandlerEvent, Session, SessionHandler};
use crate::transport::Connector;

/// Observable progress through the queue.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueState {
    /// Id assigned in the server's `welcome`.
    pub client_id: Option<String>,
    /// A `queue` request was sent and not yet cancelled or timed out.
    pub queued: bool,
    /// The committed match.
    pub matched: Option<MatchFound>,
    /// The connection is gone for good.
    pub disconnected: bool,
}

/// Queue bookkeeping routed through the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueLocal {
    Entered,
    Left,
}

// ── Callbacks ───────────────────────────────────────────────────────

/// UI notification sink for the matchmaking queue.
///
/// Without an `on_queue_timeout` handler, a timeout makes the client send
/// `cancel` itself and report [`SessionError::QueueTimeout`] to `on_error`.
#[derive(Default)]
pub struct QueueHandlers {
    on_connected: Option<Box<dyn FnMut() + Send>>,
    on_welcome: Option<Box<dyn FnMut(Option<&str>) + Send>>,
    on_queue_success: Option<Box<dyn FnMut() + Send>>,
    on_match_found: Option<Box<dyn FnMut(&MatchFound) + Send>>,
    on_queue_timeout: Option<Box<dyn FnMut(&str) + Send>>,
    on_connection_closed: Option<Box<dyn FnMut(&CloseNotice) + Send>>,
    on_error: Option<Box<dyn FnMut(&SessionError) + Send>>,
}

impl QueueHandlers {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn on_connected(mut self, f: impl FnMut() + Send + 'static) -> Self {
        self.on_connected = Some(Box::new(f));
        self
    }

    /// Called with the server-assigned client id, if any.
    #[must_use]
    pub fn on_welcome(mut self, f: impl FnMut(Option<&str>) + Send + 'static) -> Self {
        self.on_welcome = Some(Box::new(f));
        self
    }

    #[must_use]
    pub fn on_queue_success(mut self, f: impl FnMut() + Send + 'static) -> Self {
        self.on_queue_success = Some(Box::new(f));
        self
    }

    /// Called once per client, for the first `match_found`.
    #[must_use]
    pub fn on_match_found(mut self, f: impl FnMut(&MatchFound) + Send + 'static) -> Self {
        self.on_match_found = Some(Box::new(f));
        self
    }

    #[must_use]
    pub fn on_queue_timeout(mut self, f: impl FnMut(&str) + Send + 'static) -> Self {
        self.on_queue_timeout = Some(Box::new(f));
        self
    }

    #[must_use]
    pub fn on_connection_closed(mut self, f: impl FnMut(&CloseNotice) + Send + 'static) -> Self {
        self.on_connection_closed = Some(Box::new(f));
        self
    }

    #[must_use]
    pub fn on_error(mut self, f: impl FnMut(&SessionError) + Send + 'static) -> Self {
        self.on_error = Some(Box::new(f));
        self
    }

    fn error(&mut self, err: &SessionError) {
        if let Some(f) = self.on_error.as_mut() {
            f(err);
        }
    }
}

impl fmt::Debug for QueueHandlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueHandlers")
            .field("on_connected", &self.on_connected.is_some())
            .field("on_welcome", &self.on_welcome.is_some())
            .field("on_queue_success", &self.on_queue_success.is_some())
            .field("on_match_found", &self.on_match_found.is_some())
            .field("on_queue_timeout", &self.on_queue_timeout.is_some())
            .field("on_connection_closed", &self.on_connection_closed.is_some())
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}

// ── Handler ─────────────────────────────────────────────────────────

struct QueueHandler {
    ticket: QueueTicket,
    queue_on_connect: bool,
    handlers: QueueHandlers,
    state: QueueState,
    state_tx: watch::Sender<QueueState>,
}

impl QueueHandler {
    fn publish(&self) {
        self.state_tx.send_replace(self.state.clone());
    }

    fn send(&mut self, request: &QueueRequest, ctx: &HandlerContext<Matchmaking, QueueLocal>) -> bool {
        match ctx.send(request) {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "queue request not sent");
                self.handlers.error(&e);
                false
            }
        }
    }

    fn notice(&mut self, notice: QueueNotice, ctx: &HandlerContext<Matchmaking, QueueLocal>) {
        match notice {
            QueueNotice::Welcome { message, client_id } => {
                debug!(?message, ?client_id, "welcome");
                self.state.client_id = client_id;
                self.publish();
                if let Some(f) = self.handlers.on_welcome.as_mut() {
                    f(self.state.client_id.as_deref());
                }
            }
            QueueNotice::QueueSuccess { message } => {
                debug!(?message, "queued");
                self.state.queued = true;
                self.publish();
                if let Some(f) = self.handlers.on_queue_success.as_mut() {
                    f();
                }
            }
            QueueNotice::MatchFound(found) => {
                if self.state.matched.is_some() {
                    debug!(room_id = %found.room_id, "duplicate match_found ignored");
                    return;
                }
                info!(room_id = %found.room_id, opponent = %found.opponent, "match found");
                self.state.queued = false;
                self.state.matched = Some(found.clone());
                self.publish();
                if let Some(f) = self.handlers.on_match_found.as_mut() {
                    f(&found);
                }
            }
            QueueNotice::QueueTimeout { message } | QueueNotice::QueueCleared { message } => {
                let message = message.unwrap_or_default();
                info!(%message, "removed from queue");
                self.state.queued = false;
                self.publish();
                match self.handlers.on_queue_timeout.as_mut() {
                    Some(f) => f(&message),
                    None => {
                        self.send(&QueueRequest::Cancel(self.ticket.clone()), ctx);
                        self.handlers.error(&SessionError::QueueTimeout { message });
                    }
                }
            }
            QueueNotice::ConnectionClosing { message, room_id } => {
                info!(?message, ?room_id, "server closing matchmaking connection");
            }
            QueueNotice::Error { message } => {
                let message = message.unwrap_or_default();
                warn!(%message, "server error");
                self.handlers.error(&SessionError::Server { message });
            }
        }
    }

    fn disconnected(&mut self) {
        self.state.queued = false;
        self.state.disconnected = true;
        self.publish();
    }
}

impl SessionHandler for QueueHandler {
    type Family = Matchmaking;
    type Local = QueueLocal;

    fn handle(&mut self, event: HandlerEvent<Self>, ctx: &HandlerContext<Matchmaking, QueueLocal>) {
        let terminal = event.is_terminal();
        match event {
            SessionEvent::Connected => {
                self.state.disconnected = false;
                self.publish();
                if let Some(f) = self.handlers.on_connected.as_mut() {
                    f();
                }
                if self.queue_on_connect && self.state.matched.is_none() {
                    let request = QueueRequest::Queue(self.ticket.clone());
                    if self.send(&request, ctx) {
                        self.state.queued = true;
                        self.publish();
                    }
                }
            }
            SessionEvent::Closed {
                code,
                reason,
                reconnecting,
            } => {
                if let Some(f) = self.handlers.on_connection_closed.as_mut() {
                    f(&CloseNotice {
                        code,
                        reason,
                        reconnecting,
                    });
                }
            }
            SessionEvent::Error(err) => self.handlers.error(&err),
            SessionEvent::Message(notice) => self.notice(notice, ctx),
            SessionEvent::Local(QueueLocal::Entered) => {
                self.state.queued = true;
                self.publish();
            }
            SessionEvent::Local(QueueLocal::Left) => {
                self.state.queued = false;
                self.publish();
            }
        }
        if terminal {
            self.disconnected();
        }
    }
}

// ── Client handle ───────────────────────────────────────────────────

/// Client for the matchmaking queue.
pub struct QueueClient {
    session: Session<QueueHandler>,
    state: watch::Receiver<QueueState>,
    identity: PlayerIdentity,
    ticket: QueueTicket,
}

impl QueueClient {
    /// Create a client with default queue and session settings.
    ///
    /// `identity` is read once, here. Must be called inside a Tokio runtime.
    pub fn new(
        url: Url,
        identity: impl IdentityProvider,
        connector: Arc<dyn Connector>,
        handlers: QueueHandlers,
    ) -> Self {
        Self::with_config(
            url,
            identity,
            connector,
            handlers,
            QueueConfig::default(),
            SessionConfig::default(),
        )
    }

    pub fn with_config(
        url: Url,
        identity: impl IdentityProvider,
        connector: Arc<dyn Connector>,
        handlers: QueueHandlers,
        queue: QueueConfig,
        session: SessionConfig,
    ) -> Self {
        let identity = identity.identity();
        let ticket = identity.ticket(queue.score);
        let (state_tx, state) = watch::channel(QueueState::default());
        let handler = QueueHandler {
            ticket: ticket.clone(),
            queue_on_connect: queue.queue_on_connect,
            handlers,
            state: QueueState::default(),
            state_tx,
        };
        Self {
            session: Session::new(url, session, connector, handler),
            state,
            identity,
            ticket,
        }
    }

    /// Create a WebSocket client for the matchmaking endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::InvalidUrl`] if the endpoint is invalid.
    #[cfg(feature = "transport-websocket")]
    pub fn websocket(
        endpoints: &crate::config::ServerEndpoints,
        identity: impl IdentityProvider,
        handlers: QueueHandlers,
    ) -> Result<Self> {
        let url = endpoints.matchmaking_url()?;
        Ok(Self::new(
            url,
            identity,
            Arc::new(crate::transports::WebSocketConnector::new()),
            handlers,
        ))
    }

    /// Connect to the matchmaker. Enters the queue on connect unless
    /// disabled in [`QueueConfig`].
    ///
    /// # Errors
    ///
    /// See [`Session::connect`].
    pub async fn connect(&self) -> Result<()> {
        self.session.connect().await
    }

    /// Send a `queue` request.
    ///
    /// # Errors
    ///
    /// See [`Outbox::send`](crate::session::Outbox::send).
    pub fn enter_queue(&self) -> Result<()> {
        self.session.send(&QueueRequest::Queue(self.ticket.clone()))?;
        self.session.dispatch_local(QueueLocal::Entered);
        Ok(())
    }

    /// Send a `cancel` request.
    ///
    /// # Errors
    ///
    /// See [`Outbox::send`](crate::session::Outbox::send).
    pub fn cancel_queue(&self) -> Result<()> {
        self.session.send(&QueueRequest::Cancel(self.ticket.clone()))?;
        self.session.dispatch_local(QueueLocal::Left);
        Ok(())
    }

    /// Wait until a match is committed.
    ///
    /// # Errors
    ///
    /// [`SessionError::TransportClosed`] if the connection is lost for good
    /// first, [`SessionError::ShuttingDown`] if the client is closed.
    pub async fn wait_for_match(&self) -> Result<MatchFound> {
        let mut rx = self.state.clone();
        loop {
            let state = rx.borrow_and_update().clone();
            if let Some(found) = state.matched {
                return Ok(found);
            }
            if state.disconnected {
                return Err(SessionError::TransportClosed);
            }
            rx.changed()
                .await
                .map_err(|_| SessionError::ShuttingDown)?;
        }
    }

    /// The latest published queue state.
    pub fn state(&self) -> QueueState {
        self.state.borrow().clone()
    }

    pub fn match_found(&self) -> Option<MatchFound> {
        self.state.borrow().matched.clone()
    }

    pub fn identity(&self) -> &PlayerIdentity {
        &self.identity
    }

    pub fn session_id(&self) -> Uuid {
        self.session.session_id()
    }

    pub fn is_connected(&self) -> bool {
        self.session.is_connected()
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.session.reconnect_attempts()
    }

    pub async fn disconnect(&self) {
        self.session.disconnect().await;
    }

    /// Shut the client down. No callback runs after this returns.
    pub async fn close(&self) {
        self.session.close().await;
    }
}

impl fmt::Debug for QueueClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueClient")
            .field("username", &self.identity.username)
            .field("session", &self.session)
            .finish()
    }
}
