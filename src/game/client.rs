//! Game-room client: a [`Session`] speaking the room protocol, a
//! [`Reconciler`] owned by the dispatcher, and the UI callbacks.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, warn};
use url::Url;
use uuid::Uuid;

use super::state::{GameState, Reconciler, StateChange};
use crate::config::{RoomConfig, SessionConfig};
use crate::error::{Result, SessionError};
use crate::event::{CloseNotice, SessionEvent};
use crate::identity::PlayerSession;
use crate::protocol::{GameRoom, RoomAction, RoomEvent};
use crate::session::{HandlerContext, HandlerEvent, Session, SessionHandler};
use crate::transport::Connector;

/// Local countdown step.
const TICK: Duration = Duration::from_secs(1);

/// Local work run on the room's dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomLocal {
    /// The player clicked a card.
    Flip(usize),
    /// Hide mismatched cards after the flip-back delay.
    FlipBack(Vec<usize>),
    /// Local countdown step, valid only for its clock generation.
    Tick(u64),
}

// ── Callbacks ───────────────────────────────────────────────────────

type ConnectedFn = Box<dyn FnMut() + Send>;
type ClosedFn = Box<dyn FnMut(&CloseNotice) + Send>;
type ErrorFn = Box<dyn FnMut(&SessionError) + Send>;
type StateFn = Box<dyn FnMut(&StateChange, &GameState) + Send>;

/// UI notification sink for a game room. Every callback is optional and
/// runs on the room's dispatcher task, never on the socket task.
///
/// # Example
///
/// ```
/// use memory_match_client::game::{RoomHandlers, StateChange};
///
/// let handlers = RoomHandlers::new()
///     .on_connected(|| println!("connected"))
///     .on_game_state_changed(|change, state| {
///         if let StateChange::BoardReady = change {
///             println!("{} cards dealt", state.cards.len());
///         }
///     });
/// ```
#[derive(Default)]
pub struct RoomHandlers {
    on_connected: Option<ConnectedFn>,
    on_connection_closed: Option<ClosedFn>,
    on_error: Option<ErrorFn>,
    on_game_state_changed: Option<StateFn>,
}

impl RoomHandlers {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn on_connected(mut self, f: impl FnMut() + Send + 'static) -> Self {
        self.on_connected = Some(Box::new(f));
        self
    }

    #[must_use]
    pub fn on_connection_closed(mut self, f: impl FnMut(&CloseNotice) + Send + 'static) -> Self {
        self.on_connection_closed = Some(Box::new(f));
        self
    }

    /// Transport failures, server `error` events and an exhausted reconnect
    /// budget all arrive here.
    #[must_use]
    pub fn on_error(mut self, f: impl FnMut(&SessionError) + Send + 'static) -> Self {
        self.on_error = Some(Box::new(f));
        self
    }

    #[must_use]
    pub fn on_game_state_changed(
        mut self,
        f: impl FnMut(&StateChange, &GameState) + Send + 'static,
    ) -> Self {
        self.on_game_state_changed = Some(Box::new(f));
        self
    }

    fn connected(&mut self) {
        if let Some(f) = self.on_connected.as_mut() {
            f();
        }
    }

    fn closed(&mut self, notice: &CloseNotice) {
        if let Some(f) = self.on_connection_closed.as_mut() {
            f(notice);
        }
    }

    fn error(&mut self, err: &SessionError) {
        if let Some(f) = self.on_error.as_mut() {
            f(err);
        }
    }

    fn state_changed(&mut self, change: &StateChange, state: &GameState) {
        if let Some(f) = self.on_game_state_changed.as_mut() {
            f(change, state);
        }
    }
}

impl fmt::Debug for RoomHandlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RoomHandlers")
            .field("on_connected", &self.on_connected.is_some())
            .field("on_connection_closed", &self.on_connection_closed.is_some())
            .field("on_error", &self.on_error.is_some())
            .field("on_game_state_changed", &self.on_game_state_changed.is_some())
            .finish()
    }
}

// ── Handler ─────────────────────────────────────────────────────────

/// Dispatcher-side half of a game room.
pub(crate) struct RoomHandler {
    reconciler: Reconciler,
    config: RoomConfig,
    handlers: RoomHandlers,
    state_tx: watch::Sender<GameState>,
}

impl RoomHandler {
    fn new(username: &str, config: RoomConfig, handlers: RoomHandlers) -> (Self, watch::Receiver<GameState>) {
        let reconciler = Reconciler::new(username);
        let (state_tx, state_rx) = watch::channel(reconciler.state().clone());
        (
            Self {
                reconciler,
                config,
                handlers,
                state_tx,
            },
            state_rx,
        )
    }

    fn publish(&mut self, change: StateChange) {
        let state = self.reconciler.state().clone();
        self.state_tx.send_replace(state.clone());
        self.handlers.state_changed(&change, &state);
    }

    fn server_event(&mut self, event: RoomEvent, ctx: &HandlerContext<GameRoom, RoomLocal>) {
        if let RoomEvent::Error { message } = event {
            warn!(%message, "server error");
            self.handlers.error(&SessionError::Server { message });
            return;
        }
        let from_server_clock = matches!(event, RoomEvent::TimerUpdate { .. } | RoomEvent::PlayersReady(_));
        let Some(change) = self.reconciler.apply(&event) else {
            return;
        };
        if let StateChange::TurnSwitched { flip_back } = &change {
            if !flip_back.is_empty() {
                ctx.schedule(self.config.flip_back_delay, RoomLocal::FlipBack(flip_back.clone()));
            }
        }
        if from_server_clock && self.config.local_countdown {
            let generation = self.reconciler.restart_clock();
            ctx.schedule(TICK, RoomLocal::Tick(generation));
        }
        self.publish(change);
    }

    fn local(&mut self, local: RoomLocal, ctx: &HandlerContext<GameRoom, RoomLocal>) {
        match local {
            RoomLocal::Flip(index) => {
                if let Err(rejection) = self.reconciler.state().check_flip(index) {
                    debug!(index, %rejection, "flip rejected locally");
                    return;
                }
                if let Err(e) = ctx.send(&RoomAction::Flip { card_index: index }) {
                    warn!(index, error = %e, "flip not sent");
                    return;
                }
                if let Ok(change) = self.reconciler.flip(index) {
                    self.publish(change);
                }
            }
            RoomLocal::FlipBack(indices) => {
                if let Some(change) = self.reconciler.flip_back(&indices) {
                    self.publish(change);
                }
            }
            RoomLocal::Tick(generation) => {
                if let Some(change) = self.reconciler.tick(generation) {
                    if self.reconciler.state().time_remaining > 0 {
                        ctx.schedule(TICK, RoomLocal::Tick(generation));
                    }
                    self.publish(change);
                }
            }
        }
    }

    fn connection_lost(&mut self) {
        if let Some(change) = self.reconciler.connection_lost() {
            self.publish(change);
        }
    }
}

impl SessionHandler for RoomHandler {
    type Family = GameRoom;
    type Local = RoomLocal;

    fn handle(&mut self, event: HandlerEvent<Self>, ctx: &HandlerContext<GameRoom, RoomLocal>) {
        let terminal = event.is_terminal();
        match event {
            SessionEvent::Connected => self.handlers.connected(),
            SessionEvent::Closed {
                code,
                reason,
                reconnecting,
            } => self.handlers.closed(&CloseNotice {
                code,
                reason,
                reconnecting,
            }),
            SessionEvent::Error(err) => self.handlers.error(&err),
            SessionEvent::Message(event) => self.server_event(event, ctx),
            SessionEvent::Local(local) => self.local(local, ctx),
        }
        if terminal {
            self.connection_lost();
        }
    }
}

// ── Client handle ───────────────────────────────────────────────────

/// Client for one game room.
///
/// Created disconnected; call [`connect`](Self::connect). Game state lives on
/// the dispatcher and is observed through [`snapshot`](Self::snapshot) or
/// [`subscribe`](Self::subscribe).
pub struct GameRoomClient {
    session: Session<RoomHandler>,
    state: watch::Receiver<GameState>,
    player: PlayerSession,
}

impl GameRoomClient {
    /// Create a client with default room and session settings.
    ///
    /// Must be called inside a Tokio runtime.
    pub fn new(
        url: Url,
        player: PlayerSession,
        connector: Arc<dyn Connector>,
        handlers: RoomHandlers,
    ) -> Self {
        Self::with_config(
            url,
            player,
            connector,
            handlers,
            RoomConfig::default(),
            SessionConfig::default(),
        )
    }

    pub fn with_config(
        url: Url,
        player: PlayerSession,
        connector: Arc<dyn Connector>,
        handlers: RoomHandlers,
        room: RoomConfig,
        session: SessionConfig,
    ) -> Self {
        let (handler, state) = RoomHandler::new(&player.identity.username, room, handlers);
        let session = Session::new(url, session, connector, handler);
        debug!(session_id = %session.session_id(), room = %player.room_id, "game room client created");
        Self {
            session,
            state,
            player,
        }
    }

    /// Create a WebSocket client for the room `player` was seated in.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::InvalidUrl`] if the game-room endpoint is
    /// invalid.
    #[cfg(feature = "transport-websocket")]
    pub fn websocket(
        endpoints: &crate::config::ServerEndpoints,
        player: PlayerSession,
        handlers: RoomHandlers,
    ) -> Result<Self> {
        let url = endpoints.game_room_url(&player)?;
        Ok(Self::new(
            url,
            player,
            Arc::new(crate::transports::WebSocketConnector::new()),
            handlers,
        ))
    }

    /// Connect to the room, retrying under the reconnect budget.
    ///
    /// # Errors
    ///
    /// See [`Session::connect`].
    pub async fn connect(&self) -> Result<()> {
        self.session.connect().await
    }

    /// Flip card `index`.
    ///
    /// The flip is checked against the live game state on the dispatcher.
    /// A flip the rules forbid is dropped there without sending anything
    /// and is not reported as an error.
    ///
    /// # Errors
    ///
    /// [`SessionError::NotConnected`] while disconnected,
    /// [`SessionError::ShuttingDown`] after `close()`.
    pub fn flip(&self, index: usize) -> Result<()> {
        if self.session.is_shutting_down() {
            return Err(SessionError::ShuttingDown);
        }
        if !self.session.is_connected() {
            return Err(SessionError::NotConnected);
        }
        if !self.session.dispatch_local(RoomLocal::Flip(index)) {
            return Err(SessionError::ShuttingDown);
        }
        Ok(())
    }

    /// Whether [`flip`](Self::flip) would currently be accepted, judged on
    /// the latest snapshot.
    pub fn can_flip(&self, index: usize) -> bool {
        self.state.borrow().can_flip(index)
    }

    /// Report whether the current pair matched.
    ///
    /// # Errors
    ///
    /// See [`Outbox::send`](crate::session::Outbox::send).
    pub fn report_move(&self, matched: bool) -> Result<()> {
        self.session.send(&RoomAction::Move { matched })
    }

    /// Forfeit the game.
    ///
    /// # Errors
    ///
    /// See [`Outbox::send`](crate::session::Outbox::send).
    pub fn quit(&self) -> Result<()> {
        self.session.send(&RoomAction::Quit)
    }

    /// The latest published game state.
    pub fn snapshot(&self) -> GameState {
        self.state.borrow().clone()
    }

    /// Receiver that is notified on every state change.
    pub fn subscribe(&self) -> watch::Receiver<GameState> {
        self.state.clone()
    }

    pub fn player(&self) -> &PlayerSession {
        &self.player
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

    /// Close the socket normally and cancel any pending reconnect.
    pub async fn disconnect(&self) {
        self.session.disconnect().await;
    }

    /// Shut the client down. No callback runs after this returns.
    pub async fn close(&self) {
        self.session.close().await;
    }
}

impl fmt::Debug for GameRoomClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GameRoomClient")
            .field("room_id", &self.player.room_id)
            .field("session", &self.session)
            .finish()
    }
}
