//! Game-room wire types.
//!
//! Client intents are flat objects tagged by `action`; server events are flat
//! objects tagged by `event`. Field names follow the server's camelCase JSON.

use serde::{Deserialize, Serialize};

// ── Client → Server ─────────────────────────────────────────────────

/// Player intents sent to the game server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum RoomAction {
    /// Turn a card face-up.
    Flip {
        #[serde(rename = "cardIndex")]
        card_index: usize,
    },
    /// Report the result of the current pair.
    Move { matched: bool },
    /// Leave the game; the opponent wins by default.
    Quit,
}

// ── Server → Client ─────────────────────────────────────────────────

/// Initial board handed out once both players are seated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameReady {
    /// Face values, one per board position.
    pub cards: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opponent_name: Option<String>,
    /// Seconds on the game clock.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_duration: Option<u32>,
}

/// Both players are connected; play begins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayersReady {
    #[serde(default)]
    pub your_score: u32,
    #[serde(default)]
    pub opp_score: u32,
    pub whose_turn: String,
}

/// A pair was confirmed; the same player keeps the turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardsMatched {
    #[serde(default)]
    pub your_score: u32,
    #[serde(default)]
    pub opp_score: u32,
    /// Server-side pairing flags for the whole board.
    #[serde(default)]
    pub paired: Vec<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub whose_turn: Option<String>,
}

/// The `winner` field of `game_end`.
///
/// Servers announce either a username (`"tie"` for a draw) or a seat number,
/// with `-1` meaning nobody won.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Winner {
    Name(String),
    Seat(i64),
}

impl Winner {
    /// Seat value announcing a draw.
    pub const NO_SEAT: i64 = -1;

    /// The username, if the server sent one.
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Name(name) => Some(name),
            Self::Seat(_) => None,
        }
    }
}

impl From<&str> for Winner {
    fn from(name: &str) -> Self {
        Self::Name(name.to_string())
    }
}

/// Final result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameEnd {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub winner: Option<Winner>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub your_score: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opp_score: Option<u32>,
}

/// Events pushed by the game server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RoomEvent {
    GameReady(GameReady),
    PlayersReady(PlayersReady),
    /// The opponent turned a card face-up.
    CardFlip {
        #[serde(alias = "cardIndex")]
        flipped: usize,
    },
    CardsMatched(CardsMatched),
    /// The pair missed; the turn passes.
    TurnSwitch {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        round: Option<u32>,
        #[serde(rename = "whoseTurn")]
        whose_turn: String,
    },
    /// Authoritative clock tick.
    TimerUpdate { timer: u32 },
    GameEnd(GameEnd),
    /// Application-level error; the session continues.
    Error {
        #[serde(default)]
        message: String,
    },
}

impl RoomEvent {
    /// The `event` tag this variant travels under.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::GameReady(_) => "game_ready",
            Self::PlayersReady(_) => "players_ready",
            Self::CardFlip { .. } => "card_flip",
            Self::CardsMatched(_) => "cards_matched",
            Self::TurnSwitch { .. } => "turn_switch",
            Self::TimerUpdate { .. } => "timer_update",
            Self::GameEnd(_) => "game_end",
            Self::Error { .. } => "error",
        }
    }
}
