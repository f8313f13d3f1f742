//! Player identity values passed explicitly through the session layer.

use crate::protocol::{MatchFound, QueueTicket};

/// Who the local player is, as issued by the login service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerIdentity {
    pub username: String,
    /// Opaque session token.
    pub token: String,
}

impl PlayerIdentity {
    pub fn new(username: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            token: token.into(),
        }
    }

    /// Build the matchmaking ticket for this player.
    pub fn ticket(&self, score: u32) -> QueueTicket {
        QueueTicket {
            username: self.username.clone(),
            token: self.token.clone(),
            score,
        }
    }
}

/// Source of the current player's identity.
///
/// Implemented by whatever owns the login state; a plain
/// [`PlayerIdentity`] provides itself.
pub trait IdentityProvider: Send + Sync {
    /// The identity to present to the servers.
    fn identity(&self) -> PlayerIdentity;
}

impl IdentityProvider for PlayerIdentity {
    fn identity(&self) -> PlayerIdentity {
        self.clone()
    }
}

/// Everything the game-room client needs after a match is made.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerSession {
    pub identity: PlayerIdentity,
    /// Game room assigned by the matchmaker.
    pub room_id: String,
    /// Seat number sent as the `player` query parameter.
    pub seat: u32,
    pub opponent: Option<String>,
}

impl PlayerSession {
    pub fn new(identity: PlayerIdentity, room_id: impl Into<String>, seat: u32) -> Self {
        Self {
            identity,
            room_id: room_id.into(),
            seat,
            opponent: None,
        }
    }

    /// Seat the player in the room announced by a `match_found` notice.
    pub fn from_match(identity: PlayerIdentity, found: &MatchFound, seat: u32) -> Self {
        Self {
            identity,
            room_id: found.room_id.clone(),
            seat,
            opponent: Some(found.opponent.clone()),
        }
    }
}
