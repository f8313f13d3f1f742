#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
//! Integration tests for the game-room client: board setup, the flip gate,
//! pair resolution, flip-back timing, server errors and game end.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::*;
use memory_match_client::{
    GameOutcome, GameRoomClient, GameStatus, PlayerIdentity, PlayerSession, RoomConfig,
    RoomHandlers, SessionConfig, SessionError, TransportFrame,
};
use serde_json::json;
use tokio_test::{assert_err, assert_ok};

fn alice() -> PlayerSession {
    PlayerSession::new(PlayerIdentity::new("alice", "tok-a"), "room-1", 1)
}

fn handlers(log: &Recorder) -> RoomHandlers {
    let (connected, closed, errors, changes) = (log.clone(), log.clone(), log.clone(), log.clone());
    RoomHandlers::new()
        .on_connected(move || connected.push("connected"))
        .on_connection_closed(move |notice| {
            closed.push(format!("closed:{:?}:{}", notice.code, notice.reconnecting));
        })
        .on_error(move |err| errors.push(format!("error:{err}")))
        .on_game_state_changed(move |change, _state| changes.push(format!("change:{change:?}")))
}

struct Room {
    client: GameRoomClient,
    server: MockServer,
    connector: Arc<MockConnector>,
    log: Recorder,
}

impl Room {
    async fn start(room: RoomConfig, session: SessionConfig) -> Self {
        let (connector, server) = MockConnector::accepting();
        let log = Recorder::new();
        let client = GameRoomClient::with_config(
            test_url(),
            alice(),
            connector.clone(),
            handlers(&log),
            room,
            session,
        );
        assert_ok!(client.connect().await);
        Self {
            client,
            server,
            connector,
            log,
        }
    }

    async fn connected() -> Self {
        Self::start(RoomConfig::default(), SessionConfig::default()).await
    }

    /// Deal 16 cards and start play with `whose_turn` to move.
    async fn deal(&self, whose_turn: &str) {
        self.server.push_json(game_ready_json(16));
        self.server.push_json(players_ready_json(whose_turn));
        eventually("game playing", || {
            self.client.snapshot().status == GameStatus::Playing
        })
        .await;
    }

    async fn wait_sent(&self, count: usize) {
        eventually("frames sent", || self.server.sent().len() >= count).await;
    }
}

// ═══════════════════════════════════════════════════════════════════
// Board setup
// ═══════════════════════════════════════════════════════════════════

#[tokio::test(start_paused = true)]
async fn game_ready_deals_sixteen_face_down_cards() {
    let room = Room::connected().await;
    assert_eq!(room.client.snapshot().status, GameStatus::Waiting);

    room.server.push_json(game_ready_json(16));
    eventually("board dealt", || room.client.snapshot().status == GameStatus::Ready).await;

    let state = room.client.snapshot();
    assert_eq!(state.cards.len(), 16);
    assert_eq!(state.paired, vec![false; 16]);
    assert!(state.flipped.is_empty());
    assert_eq!(state.opponent_name.as_deref(), Some("bob"));
    assert_eq!(state.time_remaining, 120);
    assert!(room.log.contains("connected"));
    assert!(room.log.contains("change:BoardReady"));
}

#[tokio::test(start_paused = true)]
async fn fragmented_board_is_reassembled() {
    let room = Room::connected().await;

    let whole = game_ready_json(16).to_string();
    let third = whole.len() / 3;
    room.server.push(TransportFrame::fragment(&whole[..third], false));
    room.server.push(TransportFrame::fragment(&whole[third..2 * third], false));
    room.server.push(TransportFrame::fragment(&whole[2 * third..], true));

    eventually("board dealt", || room.client.snapshot().cards.len() == 16).await;
    assert_eq!(room.client.snapshot().status, GameStatus::Ready);
}

#[tokio::test(start_paused = true)]
async fn players_ready_starts_play_on_my_turn() {
    let room = Room::connected().await;
    room.deal("alice").await;

    let state = room.client.snapshot();
    assert!(state.is_my_turn);
    assert_eq!(state.whose_turn.as_deref(), Some("alice"));
    assert!(room.client.can_flip(0));
    assert!(room.log.contains("change:PlayersReady"));
}

#[tokio::test(start_paused = true)]
async fn subscribers_see_each_published_state() {
    let room = Room::connected().await;
    let mut states = room.client.subscribe();

    room.server.push_json(game_ready_json(4));
    within(states.changed()).await.unwrap();
    assert_eq!(states.borrow_and_update().cards.len(), 4);
}

// ═══════════════════════════════════════════════════════════════════
// Flip gate
// ═══════════════════════════════════════════════════════════════════

#[tokio::test(start_paused = true)]
async fn flip_out_of_turn_sends_nothing() {
    let room = Room::connected().await;
    room.deal("bob").await;

    assert!(!room.client.can_flip(0));
    assert_ok!(room.client.flip(0));
    settle(200).await;

    assert!(room.server.sent().is_empty());
    assert!(room.client.snapshot().flipped.is_empty());
}

#[tokio::test(start_paused = true)]
async fn flip_before_play_sends_nothing() {
    let room = Room::connected().await;
    room.server.push_json(game_ready_json(16));
    eventually("board dealt", || room.client.snapshot().status == GameStatus::Ready).await;

    assert_ok!(room.client.flip(1));
    settle(200).await;
    assert!(room.server.sent().is_empty());
}

#[tokio::test(start_paused = true)]
async fn at_most_two_flips_reach_the_server() {
    let room = Room::connected().await;
    room.deal("alice").await;

    // Queued back to back: the repeat and the third card are refused.
    assert_ok!(room.client.flip(3));
    assert_ok!(room.client.flip(3));
    assert_ok!(room.client.flip(7));
    assert_ok!(room.client.flip(8));
    assert_ok!(room.client.flip(99));
    room.wait_sent(2).await;
    settle(200).await;

    assert_eq!(
        room.server.sent_json(),
        vec![
            json!({"action": "flip", "cardIndex": 3}),
            json!({"action": "flip", "cardIndex": 7}),
        ]
    );
    let state = room.client.snapshot();
    assert_eq!(state.flipped, vec![3, 7]);
    assert!(state.awaiting_server);
    assert!(!room.client.can_flip(8));
}

#[tokio::test(start_paused = true)]
async fn flip_while_disconnected_is_an_error() {
    let connector = MockConnector::new(vec![]);
    let client = GameRoomClient::new(test_url(), alice(), connector, RoomHandlers::new());

    let err = assert_err!(client.flip(0));
    assert!(matches!(err, SessionError::NotConnected));

    client.close().await;
    let err = assert_err!(client.flip(0));
    assert!(matches!(err, SessionError::ShuttingDown));
}

// ═══════════════════════════════════════════════════════════════════
// Pair resolution
// ═══════════════════════════════════════════════════════════════════

#[tokio::test(start_paused = true)]
async fn cards_matched_pairs_two_and_five() {
    let room = Room::connected().await;
    room.deal("alice").await;

    assert_ok!(room.client.flip(2));
    assert_ok!(room.client.flip(5));
    room.wait_sent(2).await;

    room.server
        .push_json(cards_matched_json(&[2, 5], 16, 1, 0, "alice"));
    eventually("pair confirmed", || room.client.snapshot().pairs_found() == 1).await;

    let state = room.client.snapshot();
    assert!(state.paired[2] && state.paired[5]);
    assert!(state.flipped.is_empty());
    assert!(!state.awaiting_server);
    assert_eq!(state.your_score, 1);
    assert!(state.is_my_turn);
    assert!(!room.client.can_flip(2));
    assert!(room.client.can_flip(3));
    assert!(room.log.contains("change:CardsMatched { indices: [2, 5] }"));
}

#[tokio::test(start_paused = true)]
async fn mismatch_flips_back_after_delay() {
    let room = Room::connected().await;
    room.deal("alice").await;

    assert_ok!(room.client.flip(0));
    assert_ok!(room.client.flip(1));
    room.wait_sent(2).await;

    let switched_at = tokio::time::Instant::now();
    room.server.push_json(turn_switch_json(2, "bob"));
    eventually("turn passed", || !room.client.snapshot().is_my_turn).await;

    let state = room.client.snapshot();
    assert_eq!(state.round, 2);
    assert_eq!(state.revealed, vec![0, 1]);
    assert!(state.flipped.is_empty());

    settle(1000).await;
    assert_eq!(room.client.snapshot().revealed, vec![0, 1]);

    eventually("cards hidden", || room.client.snapshot().revealed.is_empty()).await;
    assert!(switched_at.elapsed() >= Duration::from_millis(2000));
    assert!(room.log.contains("change:FlippedBack { indices: [0, 1] }"));
}

#[tokio::test(start_paused = true)]
async fn opponent_flips_are_mirrored_and_hidden_on_switch() {
    let room = Room::start(
        RoomConfig::new().with_flip_back_delay(Duration::from_millis(500)),
        SessionConfig::default(),
    )
    .await;
    room.deal("bob").await;

    room.server.push_json(card_flip_json(4));
    room.server.push_json(card_flip_json(9));
    eventually("opponent flips", || room.client.snapshot().flipped == vec![4, 9]).await;
    assert!(room.log.contains("change:CardFlipped { index: 4, by_opponent: true }"));

    room.server.push_json(turn_switch_json(2, "alice"));
    eventually("my turn", || room.client.snapshot().is_my_turn).await;
    assert!(!room.client.can_flip(4));

    eventually("cards hidden", || room.client.snapshot().revealed.is_empty()).await;
    assert!(room.client.can_flip(4));
}

// ═══════════════════════════════════════════════════════════════════
// Errors, clock and game end
// ═══════════════════════════════════════════════════════════════════

#[tokio::test(start_paused = true)]
async fn server_error_reaches_on_error_and_game_continues() {
    let room = Room::connected().await;
    room.deal("alice").await;

    room.server.push_json(room_error_json("Not your turn"));
    eventually("error callback", || room.log.count("error:") == 1).await;

    assert!(room.log.contains("error:server error: Not your turn"));
    assert_eq!(room.client.snapshot().status, GameStatus::Playing);
    assert!(room.client.is_connected());
}

#[tokio::test(start_paused = true)]
async fn server_timer_overwrites_clock() {
    let room = Room::connected().await;
    room.deal("alice").await;

    room.server.push_json(timer_json(42));
    eventually("timer", || room.client.snapshot().time_remaining == 42).await;
    settle(3000).await;
    assert_eq!(room.client.snapshot().time_remaining, 42);
}

#[tokio::test(start_paused = true)]
async fn local_countdown_runs_between_server_ticks() {
    let room = Room::start(
        RoomConfig::new().with_local_countdown(true),
        SessionConfig::default(),
    )
    .await;
    room.deal("alice").await;

    room.server.push_json(timer_json(10));
    eventually("timer", || room.client.snapshot().time_remaining == 10).await;
    settle(3500).await;
    assert_eq!(room.client.snapshot().time_remaining, 7);

    // A fresh server tick replaces the local count.
    room.server.push_json(timer_json(30));
    eventually("timer", || room.client.snapshot().time_remaining == 30).await;
}

#[tokio::test(start_paused = true)]
async fn game_end_freezes_state() {
    let room = Room::connected().await;
    room.deal("alice").await;

    room.server.push_json(game_end_json("alice", 5, 3));
    eventually("game over", || room.client.snapshot().status == GameStatus::Ended).await;

    let state = room.client.snapshot();
    assert_eq!(state.outcome, Some(GameOutcome::Win));
    assert_eq!(state.your_score, 5);
    assert_eq!(state.opponent_score, 3);
    assert!(!room.client.can_flip(0));

    room.server.push_json(timer_json(99));
    room.server.push_json(cards_matched_json(&[0, 1], 16, 9, 9, "alice"));
    settle(200).await;
    let after = room.client.snapshot();
    assert_eq!(after.your_score, 5);
    assert_eq!(after.pairs_found(), 0);
    assert_ne!(after.time_remaining, 99);
}

#[tokio::test(start_paused = true)]
async fn tie_is_reported() {
    let room = Room::connected().await;
    room.deal("bob").await;

    room.server.push_json(game_end_json("tie", 4, 4));
    eventually("game over", || room.client.snapshot().outcome == Some(GameOutcome::Tie)).await;
    assert!(room.log.contains("change:GameEnded { outcome: Tie }"));
}

#[tokio::test(start_paused = true)]
async fn seat_number_winner_ends_game_by_score() {
    let room = Room::connected().await;
    room.deal("your turn").await;

    room.server
        .push_json(json!({"event": "game_end", "winner": 0, "yourScore": 30, "oppScore": 10}));
    eventually("game over", || room.client.snapshot().status == GameStatus::Ended).await;

    let state = room.client.snapshot();
    assert_eq!(state.outcome, Some(GameOutcome::Win));
    assert_eq!((state.your_score, state.opponent_score), (30, 10));
}

// ═══════════════════════════════════════════════════════════════════
// Connection loss
// ═══════════════════════════════════════════════════════════════════

#[tokio::test(start_paused = true)]
async fn terminal_close_ends_game_without_outcome() {
    let room = Room::connected().await;
    room.deal("alice").await;

    room.server.close(1000);
    eventually("game over", || room.client.snapshot().status == GameStatus::Ended).await;

    let state = room.client.snapshot();
    assert_eq!(state.outcome, None);
    assert!(room.log.contains("closed:Some(1000):false"));
    assert!(room.log.contains("change:ConnectionLost"));
    assert!(!room.client.is_connected());
}

#[tokio::test(start_paused = true)]
async fn dropped_connection_resumes_game_after_reconnect() {
    let room = Room::connected().await;
    let second = room.connector.then_accept();
    room.deal("alice").await;

    room.server.close(1006);
    eventually("reconnected", || room.log.count("connected") == 2).await;

    let state = room.client.snapshot();
    assert_eq!(state.status, GameStatus::Playing);
    assert_eq!(state.cards.len(), 16);
    assert!(room.log.contains("closed:Some(1006):true"));

    assert_ok!(room.client.flip(6));
    eventually("flip on new socket", || second.sent().len() == 1).await;
    assert!(room.server.sent().is_empty());
}

#[tokio::test(start_paused = true)]
async fn exhausted_reconnects_end_game() {
    let room = Room::start(
        RoomConfig::default(),
        SessionConfig::new()
            .with_max_reconnect_attempts(2)
            .with_reconnect_delay(Duration::from_millis(100)),
    )
    .await;
    room.deal("alice").await;

    room.server.hang_up();
    eventually("game over", || room.client.snapshot().status == GameStatus::Ended).await;
    assert_eq!(room.log.count("error:connect failed after 2"), 1);
    assert_eq!(room.connector.connects(), 3);
}

// ═══════════════════════════════════════════════════════════════════
// Other intents
// ═══════════════════════════════════════════════════════════════════

#[tokio::test(start_paused = true)]
async fn move_and_quit_are_sent_as_flat_actions() {
    let room = Room::connected().await;

    assert_ok!(room.client.report_move(false));
    assert_ok!(room.client.quit());
    room.wait_sent(2).await;

    assert_eq!(
        room.server.sent_json(),
        vec![
            json!({"action": "move", "matched": false}),
            json!({"action": "quit"}),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn close_silences_callbacks() {
    let room = Room::connected().await;
    room.deal("alice").await;
    room.client.close().await;
    let before = room.log.entries();

    room.server.push_json(game_end_json("alice", 1, 0));
    settle(500).await;
    assert_eq!(room.log.entries(), before);
    assert_eq!(room.client.snapshot().status, GameStatus::Playing);
}
