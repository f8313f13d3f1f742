//! The in-game session: mirrored game state and the game-room client.

mod client;
mod state;

pub use client::{GameRoomClient, RoomHandlers, RoomLocal};
pub use state::{FlipRejection, GameOutcome, GameState, GameStatus, Reconciler, StateChange};
