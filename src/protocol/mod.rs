//! Wire protocols spoken over the session core.
//!
//! The game room and the matchmaking queue are independent protocols that
//! share only the transport pattern. Each is described by a
//! [`MessageFamily`]: the outgoing message type, the incoming event type and
//! the envelope field that tags incoming frames.
//!
//! - [`room`]: `{"action": …}` client intents, `{"event": …}` server events
//! - [`queue`]: `{"type": …}` in both directions

use std::fmt;

use serde::de::DeserializeOwned;
use serde::Serialize;

pub mod queue;
pub mod room;

pub use queue::{MatchFound, QueueNotice, QueueRequest, QueueTicket};
pub use room::{CardsMatched, GameEnd, GameReady, PlayersReady, RoomAction, RoomEvent, Winner};

/// A message family: one envelope shape and event table carried by the
/// generic session core.
pub trait MessageFamily: Send + Sync + 'static {
    /// Messages the client sends.
    type Outgoing: Serialize + fmt::Debug + Send + 'static;
    /// Events the server sends.
    type Incoming: DeserializeOwned + fmt::Debug + Send + 'static;

    /// Short family name used in logs and task names.
    const NAME: &'static str;
    /// Envelope field carrying the tag of incoming frames.
    const TAG_FIELD: &'static str;
    /// Every incoming tag this family understands.
    const KNOWN_TAGS: &'static [&'static str];
}

/// The in-game protocol.
#[derive(Debug, Clone, Copy, Default)]
pub struct GameRoom;

impl MessageFamily for GameRoom {
    type Outgoing = RoomAction;
    type Incoming = RoomEvent;

    const NAME: &'static str = "game-room";
    const TAG_FIELD: &'static str = "event";
    const KNOWN_TAGS: &'static [&'static str] = &[
        "game_ready",
        "players_ready",
        "card_flip",
        "cards_matched",
        "turn_switch",
        "timer_update",
        "game_end",
        "error",
    ];
}

/// The pre-game matchmaking protocol.
#[derive(Debug, Clone, Copy, Default)]
pub struct Matchmaking;

impl MessageFamily for Matchmaking {
    type Outgoing = QueueRequest;
    type Incoming = QueueNotice;

    const NAME: &'static str = "matchmaking";
    const TAG_FIELD: &'static str = "type";
    const KNOWN_TAGS: &'static [&'static str] = &[
        "welcome",
        "queue_success",
        "match_found",
        "queue_timeout",
        "queue_cleared",
        "connection_closing",
        "error",
    ];
}
