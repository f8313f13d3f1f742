//! # Loopback Room Example
//!
//! Plays a full four-card game against an in-process host through a custom
//! [`Connector`]. Nothing touches the network, which makes this the quickest
//! way to watch the reconciler at work:
//!
//! - the local player flips a mismatched pair and sees it flipped back,
//! - the simulated opponent clears the board,
//! - the host announces the result and closes the socket normally.
//!
//! ## Running
//!
//! ```sh
//! cargo run --example loopback_room
//! RUST_LOG=memory_match_client=debug cargo run --example loopback_room
//! ```

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use memory_match_client::{
    Connector, GameRoomClient, GameStatus, PlayerIdentity, PlayerSession, RoomConfig,
    RoomHandlers, SessionConfig, SessionError, StateChange, Transport, TransportFrame,
};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tracing::info;

const FACES: [&str; 4] = ["apple", "pear", "apple", "pear"];

// ─────────────────────────────────────────────────────────────────────
// Step 1: A channel-backed transport and a connector that hands it out
// ─────────────────────────────────────────────────────────────────────

struct LoopbackTransport {
    to_host: mpsc::UnboundedSender<String>,
    from_host: mpsc::UnboundedReceiver<TransportFrame>,
}

#[async_trait]
impl Transport for LoopbackTransport {
    async fn send(&mut self, message: String) -> Result<(), SessionError> {
        self.to_host
            .send(message)
            .map_err(|e| SessionError::TransportSend(e.to_string()))
    }

    async fn recv(&mut self) -> Option<Result<TransportFrame, SessionError>> {
        self.from_host.recv().await.map(Ok)
    }

    async fn close(&mut self) -> Result<(), SessionError> {
        Ok(())
    }
}

/// Hands out its single transport on the first connect.
struct LoopbackConnector {
    transport: Mutex<Option<LoopbackTransport>>,
}

#[async_trait]
impl Connector for LoopbackConnector {
    async fn connect(&self, url: &str) -> Result<Box<dyn Transport>, SessionError> {
        let transport = self
            .transport
            .lock()
            .map_err(|_| SessionError::TransportClosed)?
            .take();
        match transport {
            Some(transport) => {
                info!(%url, "loopback connected");
                Ok(Box::new(transport))
            }
            None => Err(SessionError::TransportClosed),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────
// Step 2: The host, playing the opponent "bob"
// ─────────────────────────────────────────────────────────────────────

struct Table {
    paired: Vec<bool>,
    scores: (u32, u32),
    round: u32,
    pending: Vec<usize>,
}

/// Messages produced by resolving a pair.
struct Resolution {
    messages: Vec<Value>,
    keeps_turn: bool,
    over: bool,
}

impl Table {
    fn new() -> Self {
        Self {
            paired: vec![false; FACES.len()],
            scores: (0, 0),
            round: 1,
            pending: Vec::new(),
        }
    }

    fn resolve(&mut self, alice: bool) -> Resolution {
        let pair = std::mem::take(&mut self.pending);
        let matched = match pair.as_slice() {
            [a, b] => a != b && FACES.get(*a).is_some() && FACES.get(*a) == FACES.get(*b),
            _ => false,
        };
        let mover = if alice { "alice" } else { "bob" };

        if !matched {
            self.round += 1;
            let next = if alice { "bob" } else { "alice" };
            return Resolution {
                messages: vec![json!({"event": "turn_switch", "round": self.round, "whoseTurn": next})],
                keeps_turn: false,
                over: false,
            };
        }

        for index in &pair {
            if let Some(slot) = self.paired.get_mut(*index) {
                *slot = true;
            }
        }
        if alice {
            self.scores.0 += 1;
        } else {
            self.scores.1 += 1;
        }
        let mut messages = vec![json!({
            "event": "cards_matched",
            "yourScore": self.scores.0,
            "oppScore": self.scores.1,
            "paired": self.paired,
            "whoseTurn": mover,
        })];
        let over = self.paired.iter().all(|p| *p);
        if over {
            let winner = match self.scores.0.cmp(&self.scores.1) {
                std::cmp::Ordering::Greater => "alice",
                std::cmp::Ordering::Less => "bob",
                std::cmp::Ordering::Equal => "tie",
            };
            messages.push(json!({
                "event": "game_end",
                "winner": winner,
                "yourScore": self.scores.0,
                "oppScore": self.scores.1,
            }));
        }
        Resolution {
            messages,
            keeps_turn: true,
            over,
        }
    }

    /// Bob remembers every card.
    fn known_pair(&self) -> Option<(usize, usize)> {
        let open = |i: &usize| !self.paired.get(*i).copied().unwrap_or(true);
        (0..FACES.len()).filter(open).find_map(|i| {
            (i + 1..FACES.len())
                .filter(open)
                .find(|j| FACES.get(i) == FACES.get(*j))
                .map(|j| (i, j))
        })
    }
}

async fn host(
    mut from_client: mpsc::UnboundedReceiver<String>,
    to_client: mpsc::UnboundedSender<TransportFrame>,
) {
    let send = |value: Value| {
        let _ = to_client.send(TransportFrame::text(value.to_string()));
    };

    send(json!({"event": "game_ready", "cards": FACES, "opponentName": "bob", "timeDuration": 60}));
    send(json!({"event": "players_ready", "yourScore": 0, "oppScore": 0, "whoseTurn": "alice"}));

    let mut table = Table::new();
    while let Some(text) = from_client.recv().await {
        let Ok(message) = serde_json::from_str::<Value>(&text) else {
            continue;
        };
        let Some(index) = message.get("cardIndex").and_then(Value::as_u64) else {
            continue;
        };
        info!(index, "host: alice flipped");
        table.pending.push(index as usize);
        if table.pending.len() < 2 {
            continue;
        }

        let mut outcome = table.resolve(true);
        for message in outcome.messages.drain(..) {
            send(message);
        }

        // Bob's turn: flip remembered pairs while he keeps scoring.
        let mut bob_to_move = !outcome.keeps_turn && !outcome.over;
        while bob_to_move {
            tokio::time::sleep(Duration::from_millis(500)).await;
            let Some((first, second)) = table.known_pair() else {
                break;
            };
            for index in [first, second] {
                send(json!({"event": "card_flip", "flipped": index}));
                tokio::time::sleep(Duration::from_millis(200)).await;
            }
            table.pending = vec![first, second];
            outcome = table.resolve(false);
            for message in outcome.messages.drain(..) {
                send(message);
            }
            bob_to_move = outcome.keeps_turn && !outcome.over;
        }

        if outcome.over {
            let _ = to_client.send(TransportFrame::close(1000, "game over"));
            return;
        }
    }
}

// ─────────────────────────────────────────────────────────────────────
// Step 3: Play as alice
// ─────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let (to_host, from_client) = mpsc::unbounded_channel();
    let (to_client, from_host) = mpsc::unbounded_channel();
    tokio::spawn(host(from_client, to_client));

    let connector = Arc::new(LoopbackConnector {
        transport: Mutex::new(Some(LoopbackTransport { to_host, from_host })),
    });
    let player = PlayerSession::new(PlayerIdentity::new("alice", "local"), "loopback", 1);
    let handlers = RoomHandlers::new()
        .on_connected(|| info!("connected to loopback host"))
        .on_connection_closed(|notice| info!(code = ?notice.code, "connection closed"))
        .on_error(|err| info!(%err, "session error"))
        .on_game_state_changed(|change, state| match change {
            StateChange::FlippedBack { indices } => info!(?indices, "cards turned face-down"),
            StateChange::GameEnded { outcome } => {
                info!(?outcome, you = state.your_score, bob = state.opponent_score, "game over");
            }
            other => info!(?other, round = state.round, "state changed"),
        });

    let client = GameRoomClient::with_config(
        url::Url::parse("ws://loopback/game/ws")?,
        player,
        connector,
        handlers,
        RoomConfig::new().with_flip_back_delay(Duration::from_millis(300)),
        SessionConfig::new().with_auto_reconnect(false),
    );
    client.connect().await?;

    let mut states = client.subscribe();
    let play = async {
        loop {
            states.changed().await?;
            let state = states.borrow_and_update().clone();
            if state.status == GameStatus::Ended {
                return Ok::<_, Box<dyn std::error::Error>>(state);
            }
            // Alice has no memory: she always turns the first card she may.
            if let Some(index) = (0..state.cards.len()).find(|i| state.can_flip(*i)) {
                client.flip(index)?;
            }
        }
    };
    let final_state = tokio::time::timeout(Duration::from_secs(30), play).await??;
    info!(
        outcome = ?final_state.outcome,
        pairs = final_state.pairs_found(),
        "loopback game finished"
    );

    client.close().await;
    Ok(())
}
