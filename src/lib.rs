//! # Memory Match Client
//!
//! Client-side realtime session layer for a two-player memory-matching card
//! game.
//!
//! The crate keeps a socket to the game server alive across drops, speaks the
//! game's tagged JSON protocol, and mirrors the server-authoritative game
//! state locally. The same session core drives the pre-game matchmaking
//! queue.
//!
//! ## Features
//!
//! - **Reconnecting sessions**: fixed-delay retries under a bounded attempt
//!   budget, normal-closure disconnects, bounded shutdown
//! - **Serial dispatch**: every callback runs in arrival order on one task,
//!   never on the socket task
//! - **Game-state reconciler**: two-slot flip tracking, delayed flip-back of
//!   mismatched pairs, monotonic scores and pairs
//! - **Transport-agnostic**: implement [`Transport`] and [`Connector`] for any
//!   backend; the default `transport-websocket` feature provides
//!   [`WebSocketConnector`]
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use memory_match_client::{
//!     GameRoomClient, PlayerIdentity, PlayerSession, QueueClient, QueueHandlers,
//!     RoomHandlers, ServerEndpoints,
//! };
//!
//! # async fn run() -> Result<(), memory_match_client::SessionError> {
//! let endpoints = ServerEndpoints::from_env();
//! let me = PlayerIdentity::new("alice", "session-token");
//!
//! let queue = QueueClient::websocket(&endpoints, me.clone(), QueueHandlers::new())?;
//! queue.connect().await?;
//! let found = queue.wait_for_match().await?;
//! queue.close().await;
//!
//! let seat = PlayerSession::from_match(me, &found, 1);
//! let room = GameRoomClient::websocket(
//!     &endpoints,
//!     seat,
//!     RoomHandlers::new().on_game_state_changed(|change, state| {
//!         println!("{change:?}: round {}", state.round);
//!     }),
//! )?;
//! room.connect().await?;
//! room.flip(0)?;
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod config;
pub mod error;
pub mod event;
pub mod game;
pub mod identity;
pub mod matchmaking;
pub mod protocol;
pub mod session;
pub mod transport;
pub mod transports;

// Re-export primary types for ergonomic imports.
pub use config::{QueueConfig, RoomConfig, ServerEndpoints, SessionConfig};
pub use error::{ProtocolError, SessionError};
pub use event::{CloseNotice, SessionEvent};
pub use game::{GameOutcome, GameRoomClient, GameState, GameStatus, RoomHandlers, StateChange};
pub use identity::{IdentityProvider, PlayerIdentity, PlayerSession};
pub use matchmaking::{QueueClient, QueueHandlers, QueueState};
pub use protocol::{GameRoom, Matchmaking, MessageFamily};
pub use session::{HandlerContext, Outbox, Session, SessionHandler};
pub use transport::{Connector, Transport, TransportFrame};

#[cfg(feature = "transport-websocket")]
pub use transports::{WebSocketConnector, WebSocketTransport};
