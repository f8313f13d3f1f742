#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing,
    dead_code
)]
//! Shared test utilities for the session-layer integration tests.
//!
//! Provides a channel-driven [`MockTransport`] whose server side is a
//! [`MockServer`] handle, a scripted [`MockConnector`], a callback
//! [`Recorder`], and helpers for building server JSON.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use memory_match_client::{Connector, SessionError, Transport, TransportFrame};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use url::Url;

/// One scripted item for `recv()`; `None` ends the stream.
pub type ServerItem = Option<Result<TransportFrame, SessionError>>;

// ── MockTransport ───────────────────────────────────────────────────

/// A mock transport fed by a [`MockServer`].
///
/// `recv()` yields whatever the server handle pushes and pends forever once
/// the handle is dropped. Everything the client sends is recorded.
pub struct MockTransport {
    incoming: mpsc::UnboundedReceiver<ServerItem>,
    sent: Arc<StdMutex<Vec<String>>>,
    closed: Arc<AtomicBool>,
}

/// Test-side handle of a [`MockTransport`].
#[derive(Clone)]
pub struct MockServer {
    tx: mpsc::UnboundedSender<ServerItem>,
    sent: Arc<StdMutex<Vec<String>>>,
    closed: Arc<AtomicBool>,
}

impl MockTransport {
    /// Create a transport and the handle that scripts it.
    pub fn pair() -> (Self, MockServer) {
        let (tx, incoming) = mpsc::unbounded_channel();
        let sent = Arc::new(StdMutex::new(Vec::new()));
        let closed = Arc::new(AtomicBool::new(false));
        let transport = Self {
            incoming,
            sent: Arc::clone(&sent),
            closed: Arc::clone(&closed),
        };
        (transport, MockServer { tx, sent, closed })
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, message: String) -> Result<(), SessionError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(SessionError::TransportClosed);
        }
        self.sent.lock().unwrap().push(message);
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<TransportFrame, SessionError>> {
        match self.incoming.recv().await {
            Some(item) => item,
            // Server handle dropped: stay silent until the session stops us.
            None => std::future::pending().await,
        }
    }

    async fn close(&mut self) -> Result<(), SessionError> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}

impl MockServer {
    /// Deliver one unfragmented JSON message.
    pub fn push_json(&self, value: Value) {
        self.push(TransportFrame::text(value.to_string()));
    }

    pub fn push(&self, frame: TransportFrame) {
        let _ = self.tx.send(Some(Ok(frame)));
    }

    /// Close the connection from the server side with `code`.
    pub fn close(&self, code: u16) {
        self.push(TransportFrame::close(code, "server closing"));
    }

    /// Fail the receive path.
    pub fn fail(&self, err: SessionError) {
        let _ = self.tx.send(Some(Err(err)));
    }

    /// End the stream without a close frame.
    pub fn hang_up(&self) {
        let _ = self.tx.send(None);
    }

    /// Raw frames the client sent.
    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }

    /// Frames the client sent, parsed.
    pub fn sent_json(&self) -> Vec<Value> {
        self.sent()
            .iter()
            .map(|s| serde_json::from_str(s).unwrap())
            .collect()
    }

    /// Whether the client ran the close handshake.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

// ── MockConnector ───────────────────────────────────────────────────

/// What the connector does on one connect attempt.
pub enum Attempt {
    /// Fail with a connection-refused I/O error.
    Refuse,
    /// Hand out this transport.
    Accept(MockTransport),
    /// Never complete; exercises the connect timeout.
    Hang,
    /// Fail with an error that is not a transport failure.
    Reject(&'static str),
}

/// A connector that plays scripted attempts in order and refuses once the
/// script runs out.
pub struct MockConnector {
    attempts: StdMutex<VecDeque<Attempt>>,
    connects: AtomicUsize,
}

impl MockConnector {
    pub fn new(attempts: Vec<Attempt>) -> Arc<Self> {
        Arc::new(Self {
            attempts: StdMutex::new(VecDeque::from(attempts)),
            connects: AtomicUsize::new(0),
        })
    }

    /// A connector whose first attempt succeeds, plus the server handle.
    pub fn accepting() -> (Arc<Self>, MockServer) {
        let (transport, server) = MockTransport::pair();
        (Self::new(vec![Attempt::Accept(transport)]), server)
    }

    /// Queue another scripted attempt.
    pub fn then(&self, attempt: Attempt) {
        self.attempts.lock().unwrap().push_back(attempt);
    }

    /// Queue a successful attempt and return its server handle.
    pub fn then_accept(&self) -> MockServer {
        let (transport, server) = MockTransport::pair();
        self.then(Attempt::Accept(transport));
        server
    }

    /// Number of connect calls so far.
    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::Acquire)
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, _url: &str) -> Result<Box<dyn Transport>, SessionError> {
        self.connects.fetch_add(1, Ordering::AcqRel);
        let next = self.attempts.lock().unwrap().pop_front();
        match next {
            Some(Attempt::Accept(transport)) => Ok(Box::new(transport)),
            Some(Attempt::Hang) => std::future::pending().await,
            Some(Attempt::Reject(reason)) => Err(SessionError::InvalidUrl(reason.to_string())),
            Some(Attempt::Refuse) | None => Err(SessionError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "connection refused",
            ))),
        }
    }
}

// ── Recorder ────────────────────────────────────────────────────────

/// Collects labels pushed from callbacks.
#[derive(Clone, Default)]
pub struct Recorder {
    entries: Arc<StdMutex<Vec<String>>>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, entry: impl Into<String>) {
        self.entries.lock().unwrap().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().unwrap().clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.entries().iter().filter(|e| e.starts_with(prefix)).count()
    }

    pub fn contains(&self, entry: &str) -> bool {
        self.entries().iter().any(|e| e == entry)
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

pub fn test_url() -> Url {
    Url::parse("ws://game.test/game/ws").unwrap()
}

/// Poll `condition` until it holds, failing the test after five seconds of
/// (possibly paused) runtime time.
pub async fn eventually(what: &str, condition: impl Fn() -> bool) {
    let wait = async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    };
    if tokio::time::timeout(Duration::from_secs(5), wait).await.is_err() {
        panic!("timed out waiting for: {what}");
    }
}

/// Let spawned tasks run for `ms` milliseconds of runtime time.
pub async fn settle(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

/// Run `future` with a five-second deadline.
pub async fn within<T>(future: impl Future<Output = T>) -> T {
    tokio::time::timeout(Duration::from_secs(5), future)
        .await
        .expect("future did not complete in time")
}

// ── Game-room JSON ──────────────────────────────────────────────────

pub fn game_ready_json(cards: usize) -> Value {
    let cards: Vec<String> = (0..cards).map(|i| format!("img{}", i / 2)).collect();
    json!({
        "event": "game_ready",
        "cards": cards,
        "opponentName": "bob",
        "timeDuration": 120
    })
}

pub fn players_ready_json(whose_turn: &str) -> Value {
    json!({
        "event": "players_ready",
        "yourScore": 0,
        "oppScore": 0,
        "whoseTurn": whose_turn
    })
}

pub fn card_flip_json(index: usize) -> Value {
    json!({"event": "card_flip", "flipped": index})
}

pub fn cards_matched_json(pairs: &[usize], len: usize, yours: u32, theirs: u32, whose_turn: &str) -> Value {
    let mut paired = vec![false; len];
    for i in pairs {
        paired[*i] = true;
    }
    json!({
        "event": "cards_matched",
        "yourScore": yours,
        "oppScore": theirs,
        "paired": paired,
        "whoseTurn": whose_turn
    })
}

pub fn turn_switch_json(round: u32, whose_turn: &str) -> Value {
    json!({"event": "turn_switch", "round": round, "whoseTurn": whose_turn})
}

pub fn timer_json(seconds: u32) -> Value {
    json!({"event": "timer_update", "timer": seconds})
}

pub fn game_end_json(winner: &str, yours: u32, theirs: u32) -> Value {
    json!({"event": "game_end", "winner": winner, "yourScore": yours, "oppScore": theirs})
}

pub fn room_error_json(message: &str) -> Value {
    json!({"event": "error", "message": message})
}

// ── Matchmaking JSON ────────────────────────────────────────────────

pub fn welcome_json(client_id: &str) -> Value {
    json!({"type": "welcome", "message": "Connected to matchmaking", "clientId": client_id})
}

pub fn queue_success_json() -> Value {
    json!({"type": "queue_success", "message": "Added to queue"})
}

pub fn match_found_json(room_id: &str, opponent: &str) -> Value {
    json!({
        "type": "match_found",
        "opponent": opponent,
        "score": 310,
        "roomId": room_id,
        "timestamp": "2026-10-19T12:00:00Z",
        "message": "Connection will close after this message."
    })
}

pub fn queue_timeout_json(message: &str) -> Value {
    json!({"type": "queue_timeout", "message": message})
}
