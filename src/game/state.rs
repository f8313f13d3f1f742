//! Client-side mirror of the shared game state.
//!
//! The server is the only authority. [`Reconciler`] applies its events to a
//! local [`GameState`], records the player's own flips optimistically, and
//! turns mismatched cards face-down again once the server has passed the
//! turn. It performs no I/O; the room handler feeds it events and publishes
//! snapshots.

use thiserror::Error;
use tracing::{debug, warn};

use crate::protocol::{CardsMatched, GameEnd, GameReady, PlayersReady, RoomEvent, Winner};

/// `whoseTurn` value some servers send instead of the player's username.
const YOUR_TURN: &str = "your turn";

/// `winner` value announcing a draw.
const TIE: &str = "tie";

/// Lifecycle of one game. Only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum GameStatus {
    /// Connected, board not dealt yet.
    #[default]
    Waiting,
    /// Board dealt, waiting for both players.
    Ready,
    Playing,
    /// Terminal.
    Ended,
}

/// Result of a finished game from the local player's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameOutcome {
    Win,
    Lose,
    Tie,
}

/// Why a local flip was refused. Refused flips are never sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FlipRejection {
    #[error("game is not in progress")]
    NotPlaying,
    #[error("not your turn")]
    NotYourTurn,
    #[error("waiting for the server to resolve the current pair")]
    AwaitingServer,
    #[error("card {0} is out of range")]
    OutOfRange(usize),
    #[error("card {0} is already paired")]
    AlreadyPaired(usize),
    #[error("card {0} is already face-up")]
    AlreadyFaceUp(usize),
    #[error("two cards are already flipped")]
    PairComplete,
}

/// Snapshot of the mirrored game.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameState {
    /// Face values, one per board position. Fixed once dealt.
    pub cards: Vec<String>,
    /// Confirmed pairs. An entry never returns to `false`.
    pub paired: Vec<bool>,
    /// Face-up, unpaired cards of the current turn (at most two).
    pub flipped: Vec<usize>,
    /// Mismatched cards still showing until the delayed flip-back.
    pub revealed: Vec<usize>,
    pub your_score: u32,
    pub opponent_score: u32,
    /// Starts at 1.
    pub round: u32,
    pub whose_turn: Option<String>,
    pub is_my_turn: bool,
    /// Seconds left on the game clock.
    pub time_remaining: u32,
    pub status: GameStatus,
    pub opponent_name: Option<String>,
    /// A flipped pair was sent and the server has not answered yet.
    pub awaiting_server: bool,
    /// Set when the game ends normally; `None` if the connection was lost.
    pub outcome: Option<GameOutcome>,
}

impl GameState {
    pub fn new() -> Self {
        Self {
            cards: Vec::new(),
            paired: Vec::new(),
            flipped: Vec::new(),
            revealed: Vec::new(),
            your_score: 0,
            opponent_score: 0,
            round: 1,
            whose_turn: None,
            is_my_turn: false,
            time_remaining: 0,
            status: GameStatus::Waiting,
            opponent_name: None,
            awaiting_server: false,
            outcome: None,
        }
    }

    pub fn is_paired(&self, index: usize) -> bool {
        self.paired.get(index).copied().unwrap_or(false)
    }

    /// Paired, flipped this turn, or waiting to be flipped back.
    pub fn is_face_up(&self, index: usize) -> bool {
        self.is_paired(index) || self.flipped.contains(&index) || self.revealed.contains(&index)
    }

    /// Check whether the local player may flip `index` right now.
    ///
    /// # Errors
    ///
    /// Returns the first rule the flip breaks.
    pub fn check_flip(&self, index: usize) -> Result<(), FlipRejection> {
        if self.status != GameStatus::Playing {
            return Err(FlipRejection::NotPlaying);
        }
        if !self.is_my_turn {
            return Err(FlipRejection::NotYourTurn);
        }
        if self.awaiting_server {
            return Err(FlipRejection::AwaitingServer);
        }
        if index >= self.cards.len() {
            return Err(FlipRejection::OutOfRange(index));
        }
        if self.is_paired(index) {
            return Err(FlipRejection::AlreadyPaired(index));
        }
        if self.is_face_up(index) {
            return Err(FlipRejection::AlreadyFaceUp(index));
        }
        if self.flipped.len() >= 2 {
            return Err(FlipRejection::PairComplete);
        }
        Ok(())
    }

    pub fn can_flip(&self, index: usize) -> bool {
        self.check_flip(index).is_ok()
    }

    /// Number of confirmed pairs.
    pub fn pairs_found(&self) -> usize {
        self.paired.iter().filter(|p| **p).count() / 2
    }
}

impl Default for GameState {
    fn default() -> Self {
        Self::new()
    }
}

/// What changed after an event was applied. Handed to the UI together with
/// the new snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateChange {
    /// Board dealt.
    BoardReady,
    /// Both players connected; play begins.
    PlayersReady,
    CardFlipped {
        index: usize,
        by_opponent: bool,
    },
    /// Newly confirmed pairs.
    CardsMatched {
        indices: Vec<usize>,
    },
    /// The turn passed; `flip_back` are the cards that will be hidden again.
    TurnSwitched {
        flip_back: Vec<usize>,
    },
    /// Mismatched cards are face-down again.
    FlippedBack {
        indices: Vec<usize>,
    },
    TimerUpdated,
    GameEnded {
        outcome: GameOutcome,
    },
    /// The connection dropped for good; the game is over without a result.
    ConnectionLost,
}

// ── Reconciler ──────────────────────────────────────────────────────

/// Applies server events and local intents to a [`GameState`].
#[derive(Debug, Clone)]
pub struct Reconciler {
    username: String,
    state: GameState,
    /// Bumped by every server clock tick; stale local ticks are ignored.
    clock_generation: u64,
}

impl Reconciler {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            state: GameState::new(),
            clock_generation: 0,
        }
    }

    pub fn state(&self) -> &GameState {
        &self.state
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn clock_generation(&self) -> u64 {
        self.clock_generation
    }

    /// Invalidate pending local ticks and return the new clock generation.
    pub fn restart_clock(&mut self) -> u64 {
        self.clock_generation += 1;
        self.clock_generation
    }

    /// Apply one server event. Returns `None` when the event is out of
    /// order for the current status or carries nothing new.
    pub fn apply(&mut self, event: &RoomEvent) -> Option<StateChange> {
        if self.state.status == GameStatus::Ended {
            debug!(tag = event.tag(), "game over, ignoring event");
            return None;
        }
        match event {
            RoomEvent::GameReady(ready) => self.game_ready(ready),
            RoomEvent::PlayersReady(ready) => self.players_ready(ready),
            RoomEvent::CardFlip { flipped } => self.opponent_flip(*flipped),
            RoomEvent::CardsMatched(matched) => self.cards_matched(matched),
            RoomEvent::TurnSwitch { round, whose_turn } => self.turn_switch(*round, whose_turn),
            RoomEvent::TimerUpdate { timer } => {
                self.clock_generation += 1;
                self.state.time_remaining = *timer;
                Some(StateChange::TimerUpdated)
            }
            RoomEvent::GameEnd(end) => self.game_end(end),
            // Application errors leave the game untouched.
            RoomEvent::Error { .. } => None,
        }
    }

    /// Record the local player's flip.
    ///
    /// # Errors
    ///
    /// Returns the [`FlipRejection`] if the flip is not allowed; the state is
    /// unchanged in that case.
    pub fn flip(&mut self, index: usize) -> Result<StateChange, FlipRejection> {
        self.state.check_flip(index)?;
        self.state.flipped.push(index);
        if self.state.flipped.len() == 2 {
            self.state.awaiting_server = true;
        }
        Ok(StateChange::CardFlipped {
            index,
            by_opponent: false,
        })
    }

    /// Turn mismatched cards face-down. Cards paired or re-flipped in the
    /// meantime stay up.
    pub fn flip_back(&mut self, indices: &[usize]) -> Option<StateChange> {
        let before = self.state.revealed.len();
        self.state.revealed.retain(|i| !indices.contains(i));
        if self.state.revealed.len() == before {
            return None;
        }
        let hidden = indices
            .iter()
            .copied()
            .filter(|i| !self.state.is_face_up(*i))
            .collect();
        Some(StateChange::FlippedBack { indices: hidden })
    }

    /// Count the clock down by one second between server ticks.
    pub fn tick(&mut self, generation: u64) -> Option<StateChange> {
        if generation != self.clock_generation
            || self.state.status != GameStatus::Playing
            || self.state.time_remaining == 0
        {
            return None;
        }
        self.state.time_remaining -= 1;
        Some(StateChange::TimerUpdated)
    }

    /// The session is gone for good.
    pub fn connection_lost(&mut self) -> Option<StateChange> {
        if self.state.status == GameStatus::Ended {
            return None;
        }
        self.clock_generation += 1;
        self.state.status = GameStatus::Ended;
        self.state.awaiting_server = false;
        self.state.is_my_turn = false;
        self.state.outcome = None;
        Some(StateChange::ConnectionLost)
    }

    // ── Event handlers ──────────────────────────────────────────────

    fn game_ready(&mut self, ready: &GameReady) -> Option<StateChange> {
        if self.state.status != GameStatus::Waiting {
            warn!(status = ?self.state.status, "game_ready after board was dealt; ignoring");
            return None;
        }
        let state = &mut self.state;
        state.cards = ready.cards.clone();
        state.paired = vec![false; ready.cards.len()];
        state.flipped.clear();
        state.revealed.clear();
        if let Some(seconds) = ready.time_duration {
            state.time_remaining = seconds;
        }
        if ready.opponent_name.is_some() {
            state.opponent_name = ready.opponent_name.clone();
        }
        state.status = GameStatus::Ready;
        debug!(cards = state.cards.len(), "board ready");
        Some(StateChange::BoardReady)
    }

    fn players_ready(&mut self, ready: &PlayersReady) -> Option<StateChange> {
        if !matches!(self.state.status, GameStatus::Ready | GameStatus::Playing) {
            warn!(status = ?self.state.status, "players_ready before board; ignoring");
            return None;
        }
        self.update_scores(ready.your_score, ready.opp_score);
        self.set_turn(&ready.whose_turn);
        self.state.status = GameStatus::Playing;
        Some(StateChange::PlayersReady)
    }

    fn opponent_flip(&mut self, index: usize) -> Option<StateChange> {
        let state = &mut self.state;
        if state.status != GameStatus::Playing {
            debug!(index, "card_flip outside play; ignoring");
            return None;
        }
        if index >= state.cards.len()
            || state.is_paired(index)
            || state.flipped.contains(&index)
            || state.flipped.len() >= 2
        {
            warn!(index, "inconsistent card_flip; ignoring");
            return None;
        }
        // Flipped again before it went face-down: it now belongs to this turn.
        state.revealed.retain(|i| *i != index);
        state.flipped.push(index);
        Some(StateChange::CardFlipped {
            index,
            by_opponent: true,
        })
    }

    fn cards_matched(&mut self, matched: &CardsMatched) -> Option<StateChange> {
        if self.state.status != GameStatus::Playing {
            debug!("cards_matched outside play; ignoring");
            return None;
        }
        let mut indices = Vec::new();
        if matched.paired.is_empty() {
            // No board flags: the pending pair is the match.
            for index in std::mem::take(&mut self.state.flipped) {
                if let Some(slot) = self.state.paired.get_mut(index) {
                    if !*slot {
                        *slot = true;
                        indices.push(index);
                    }
                }
            }
        } else {
            for (index, (slot, confirmed)) in self
                .state
                .paired
                .iter_mut()
                .zip(matched.paired.iter())
                .enumerate()
            {
                if *confirmed && !*slot {
                    *slot = true;
                    indices.push(index);
                }
            }
        }
        self.state.flipped.clear();
        self.state.revealed.retain(|i| !indices.contains(i));
        self.state.awaiting_server = false;
        self.update_scores(matched.your_score, matched.opp_score);
        if let Some(whose_turn) = &matched.whose_turn {
            self.set_turn(whose_turn);
        }
        Some(StateChange::CardsMatched { indices })
    }

    fn turn_switch(&mut self, round: Option<u32>, whose_turn: &str) -> Option<StateChange> {
        if self.state.status != GameStatus::Playing {
            debug!("turn_switch outside play; ignoring");
            return None;
        }
        let state = &mut self.state;
        let flip_back: Vec<usize> = state
            .flipped
            .drain(..)
            .filter(|i| !state.paired.get(*i).copied().unwrap_or(false))
            .collect();
        for index in &flip_back {
            if !state.revealed.contains(index) {
                state.revealed.push(*index);
            }
        }
        state.awaiting_server = false;
        state.round = round.unwrap_or(state.round.saturating_add(1)).max(1);
        self.set_turn(whose_turn);
        Some(StateChange::TurnSwitched { flip_back })
    }

    fn game_end(&mut self, end: &GameEnd) -> Option<StateChange> {
        if !matches!(self.state.status, GameStatus::Ready | GameStatus::Playing) {
            warn!(status = ?self.state.status, "game_end before board; ignoring");
            return None;
        }
        self.update_scores(
            end.your_score.unwrap_or(0),
            end.opp_score.unwrap_or(0),
        );
        // Seat numbers are not mapped to players; the scores decide.
        let outcome = match end.winner.as_ref() {
            Some(Winner::Seat(Winner::NO_SEAT)) => GameOutcome::Tie,
            Some(winner) if winner.name() == Some(TIE) => GameOutcome::Tie,
            Some(winner) if winner.name() == Some(self.username.as_str()) => GameOutcome::Win,
            Some(Winner::Name(winner)) if !winner.is_empty() => GameOutcome::Lose,
            _ => match self.state.your_score.cmp(&self.state.opponent_score) {
                std::cmp::Ordering::Greater => GameOutcome::Win,
                std::cmp::Ordering::Less => GameOutcome::Lose,
                std::cmp::Ordering::Equal => GameOutcome::Tie,
            },
        };
        self.clock_generation += 1;
        let state = &mut self.state;
        state.status = GameStatus::Ended;
        state.outcome = Some(outcome);
        state.awaiting_server = false;
        state.is_my_turn = false;
        Some(StateChange::GameEnded { outcome })
    }

    fn update_scores(&mut self, yours: u32, theirs: u32) {
        self.state.your_score = self.state.your_score.max(yours);
        self.state.opponent_score = self.state.opponent_score.max(theirs);
    }

    fn set_turn(&mut self, whose_turn: &str) {
        self.state.is_my_turn = whose_turn == self.username || whose_turn == YOUR_TURN;
        self.state.whose_turn = Some(whose_turn.to_string());
    }
}
