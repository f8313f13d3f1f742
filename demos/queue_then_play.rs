//! # Queue Then Play Example
//!
//! The full player journey against real servers:
//!
//! 1. Join the matchmaking queue over WebSocket
//! 2. Wait for `match_found` (Ctrl+C leaves the queue)
//! 3. Join the announced game room
//! 4. Flip cards whenever it is our turn until the game ends
//!
//! ## Running
//!
//! ```sh
//! # Servers on localhost, default endpoints:
//! cargo run --example queue_then_play
//!
//! # Point at another deployment and log in as someone else:
//! API_HOST=games.example.com PLAYER=ann TOKEN=secret cargo run --example queue_then_play
//!
//! # Or override each endpoint:
//! MM_URL=ws://mm:8080/websoc/mm GR_URL=ws://rooms:8081/game/ws cargo run --example queue_then_play
//! ```

use memory_match_client::{
    GameRoomClient, GameStatus, PlayerIdentity, PlayerSession, QueueClient, QueueHandlers,
    RoomHandlers, ServerEndpoints, StateChange,
};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // ── Logging ─────────────────────────────────────────────────────
    // Set `RUST_LOG=debug` for verbose output.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // ── Configuration ───────────────────────────────────────────────
    let endpoints = ServerEndpoints::from_env();
    let username = std::env::var("PLAYER").unwrap_or_else(|_| "alice".to_string());
    let token = std::env::var("TOKEN").unwrap_or_default();
    let me = PlayerIdentity::new(username, token);
    info!(matchmaking = %endpoints.matchmaking, game_room = %endpoints.game_room, "endpoints");

    // ── Matchmaking ─────────────────────────────────────────────────
    let queue = QueueClient::websocket(
        &endpoints,
        me.clone(),
        QueueHandlers::new()
            .on_queue_success(|| info!("waiting in queue"))
            .on_match_found(|found| info!(room = %found.room_id, opponent = %found.opponent, "match found"))
            .on_error(|err| warn!(%err, "matchmaking error")),
    )?;
    queue.connect().await?;

    let found = tokio::select! {
        found = queue.wait_for_match() => found?,
        _ = tokio::signal::ctrl_c() => {
            info!("leaving queue");
            let _ = queue.cancel_queue();
            queue.close().await;
            return Ok(());
        }
    };
    queue.close().await;

    // ── Game room ───────────────────────────────────────────────────
    let seat = PlayerSession::from_match(me, &found, 1);
    let room = GameRoomClient::websocket(
        &endpoints,
        seat,
        RoomHandlers::new()
            .on_connection_closed(|notice| {
                info!(code = ?notice.code, reconnecting = notice.reconnecting, "room connection closed");
            })
            .on_error(|err| warn!(%err, "room error"))
            .on_game_state_changed(|change, state| match change {
                StateChange::BoardReady => info!(cards = state.cards.len(), "board dealt"),
                StateChange::GameEnded { outcome } => info!(?outcome, "game over"),
                other => info!(?other, you = state.your_score, them = state.opponent_score, "update"),
            }),
    )?;
    room.connect().await?;

    let mut states = room.subscribe();
    loop {
        tokio::select! {
            changed = states.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = states.borrow_and_update().clone();
                if state.status == GameStatus::Ended {
                    break;
                }
                if let Some(index) = (0..state.cards.len()).find(|i| state.can_flip(*i)) {
                    if let Err(e) = room.flip(index) {
                        warn!(%e, "flip not queued");
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("forfeiting");
                let _ = room.quit();
                break;
            }
        }
    }

    room.close().await;
    Ok(())
}
