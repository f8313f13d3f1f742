//! Session, game-room and matchmaking configuration.

use std::time::Duration;

use url::Url;

use crate::error::{Result, SessionError};
use crate::identity::PlayerSession;

/// Default number of reconnect attempts before giving up.
const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 5;

/// Default fixed delay between reconnect attempts.
const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_millis(2000);

/// Default timeout for a single connect attempt.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default wait for the peer to acknowledge a normal closure.
const DEFAULT_DISCONNECT_TIMEOUT: Duration = Duration::from_secs(1);

/// Default bound on the disconnect performed by `close()`.
const DEFAULT_CLOSE_TIMEOUT: Duration = Duration::from_secs(3);

/// Default time the dispatcher gets to drain queued work on `close()`.
const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Default delay before mismatched cards are turned face-down.
const DEFAULT_FLIP_BACK_DELAY: Duration = Duration::from_millis(2000);

/// Default skill rating sent with queue requests.
pub const DEFAULT_SKILL_SCORE: u32 = 300;

// ── SessionConfig ───────────────────────────────────────────────────

/// Connection lifecycle settings shared by every session.
///
/// # Example
///
/// ```
/// use memory_match_client::config::SessionConfig;
/// use std::time::Duration;
///
/// let config = SessionConfig::new()
///     .with_max_reconnect_attempts(3)
///     .with_reconnect_delay(Duration::from_millis(500));
/// assert!(config.auto_reconnect);
/// assert_eq!(config.max_reconnect_attempts, 3);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Retry failed connects and abnormal closes.
    ///
    /// Defaults to **true**.
    pub auto_reconnect: bool,
    /// Reconnect attempts allowed before the session gives up.
    ///
    /// Defaults to **5**. The counter resets on every successful connect.
    pub max_reconnect_attempts: u32,
    /// Fixed delay before each reconnect attempt.
    ///
    /// Defaults to **2 seconds**.
    pub reconnect_delay: Duration,
    /// Timeout for one connect attempt.
    ///
    /// Defaults to **10 seconds**.
    pub connect_timeout: Duration,
    /// How long `disconnect()` waits for the close handshake.
    ///
    /// Defaults to **1 second**.
    pub disconnect_timeout: Duration,
    /// Bound on the disconnect step of `close()`.
    ///
    /// Defaults to **3 seconds**.
    pub close_timeout: Duration,
    /// How long `close()` lets the dispatcher finish queued work before
    /// aborting it.
    ///
    /// Defaults to **5 seconds**.
    pub drain_timeout: Duration,
}

impl SessionConfig {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self {
            auto_reconnect: true,
            max_reconnect_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            disconnect_timeout: DEFAULT_DISCONNECT_TIMEOUT,
            close_timeout: DEFAULT_CLOSE_TIMEOUT,
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_auto_reconnect(mut self, enabled: bool) -> Self {
        self.auto_reconnect = enabled;
        self
    }

    #[must_use]
    pub fn with_max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.max_reconnect_attempts = attempts;
        self
    }

    #[must_use]
    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_disconnect_timeout(mut self, timeout: Duration) -> Self {
        self.disconnect_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_close_timeout(mut self, timeout: Duration) -> Self {
        self.close_timeout = timeout;
        self
    }

    /// Set the dispatcher drain timeout. A zero timeout aborts queued work
    /// immediately on `close()`.
    #[must_use]
    pub fn with_drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::new()
    }
}

// ── RoomConfig ──────────────────────────────────────────────────────

/// Game-room behaviour.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomConfig {
    /// Delay before a mismatched pair is turned face-down again.
    ///
    /// Defaults to **2 seconds**.
    pub flip_back_delay: Duration,
    /// Count `time_remaining` down locally between server ticks.
    ///
    /// Defaults to **false**; the server's `timer_update` always wins.
    pub local_countdown: bool,
}

impl RoomConfig {
    pub fn new() -> Self {
        Self {
            flip_back_delay: DEFAULT_FLIP_BACK_DELAY,
            local_countdown: false,
        }
    }

    #[must_use]
    pub fn with_flip_back_delay(mut self, delay: Duration) -> Self {
        self.flip_back_delay = delay;
        self
    }

    #[must_use]
    pub fn with_local_countdown(mut self, enabled: bool) -> Self {
        self.local_countdown = enabled;
        self
    }
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self::new()
    }
}

// ── QueueConfig ─────────────────────────────────────────────────────

/// Matchmaking behaviour.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueConfig {
    /// Skill rating sent with `queue` and `cancel`.
    ///
    /// Defaults to **300**.
    pub score: u32,
    /// Send `queue` as soon as the socket opens.
    ///
    /// Defaults to **true**.
    pub queue_on_connect: bool,
}

impl QueueConfig {
    pub fn new() -> Self {
        Self {
            score: DEFAULT_SKILL_SCORE,
            queue_on_connect: true,
        }
    }

    #[must_use]
    pub fn with_score(mut self, score: u32) -> Self {
        self.score = score;
        self
    }

    #[must_use]
    pub fn with_queue_on_connect(mut self, enabled: bool) -> Self {
        self.queue_on_connect = enabled;
        self
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self::new()
    }
}

// ── ServerEndpoints ─────────────────────────────────────────────────

/// Host used when `API_HOST` is unset.
const DEFAULT_API_HOST: &str = "localhost";

/// Base URLs of the matchmaking and game-room servers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerEndpoints {
    pub matchmaking: String,
    pub game_room: String,
}

impl ServerEndpoints {
    /// Endpoints on the default paths of `host` (`host` may include a port).
    pub fn for_host(host: &str) -> Self {
        Self {
            matchmaking: format!("ws://{host}/websoc/mm"),
            game_room: format!("ws://{host}/game/ws"),
        }
    }

    /// Read endpoints from the process environment.
    ///
    /// `MM_URL` and `GR_URL` override the full URLs; otherwise `API_HOST`
    /// (default `localhost`) fills the default paths.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env) with a custom variable source.
    /// Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let host = get("API_HOST").unwrap_or_else(|| DEFAULT_API_HOST.to_string());
        let defaults = Self::for_host(&host);
        Self {
            matchmaking: get("MM_URL").unwrap_or(defaults.matchmaking),
            game_room: get("GR_URL").unwrap_or(defaults.game_room),
        }
    }

    /// The matchmaking URL, validated.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::InvalidUrl`] if the URL does not parse.
    pub fn matchmaking_url(&self) -> Result<Url> {
        parse(&self.matchmaking)
    }

    /// The game-room URL for a seated player:
    /// `...?gameID=<room>&player=<seat>&username=<name>`.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::InvalidUrl`] if the base URL does not parse.
    pub fn game_room_url(&self, session: &PlayerSession) -> Result<Url> {
        let mut url = parse(&self.game_room)?;
        url.query_pairs_mut()
            .append_pair("gameID", &session.room_id)
            .append_pair("player", &session.seat.to_string())
            .append_pair("username", &session.identity.username);
        Ok(url)
    }
}

impl Default for ServerEndpoints {
    fn default() -> Self {
        Self::for_host(DEFAULT_API_HOST)
    }
}

fn parse(raw: &str) -> Result<Url> {
    let url = Url::parse(raw).map_err(|e| SessionError::InvalidUrl(format!("{raw}: {e}")))?;
    match url.scheme() {
        "ws" | "wss" => Ok(url),
        other => Err(SessionError::InvalidUrl(format!(
            "{raw}: unsupported scheme `{other}`"
        ))),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::identity::PlayerIdentity;
    use std::collections::HashMap;

    #[test]
    fn session_defaults() {
        let config = SessionConfig::default();
        assert!(config.auto_reconnect);
        assert_eq!(config.max_reconnect_attempts, 5);
        assert_eq!(config.reconnect_delay, Duration::from_millis(2000));
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.disconnect_timeout, Duration::from_secs(1));
        assert_eq!(config.close_timeout, Duration::from_secs(3));
        assert_eq!(config.drain_timeout, Duration::from_secs(5));
    }

    #[test]
    fn room_and_queue_defaults() {
        assert_eq!(
            RoomConfig::default().flip_back_delay,
            Duration::from_millis(2000)
        );
        assert!(!RoomConfig::default().local_countdown);
        assert_eq!(QueueConfig::default().score, 300);
        assert_eq!(QueueConfig::new().with_score(420).score, 420);
    }

    #[test]
    fn endpoints_from_api_host() {
        let env = HashMap::from([("API_HOST", "10.0.0.5:8080".to_string())]);
        let endpoints = ServerEndpoints::from_lookup(|k| env.get(k).cloned());
        assert_eq!(endpoints.matchmaking, "ws://10.0.0.5:8080/websoc/mm");
        assert_eq!(endpoints.game_room, "ws://10.0.0.5:8080/game/ws");
    }

    #[test]
    fn full_url_overrides_win() {
        let env = HashMap::from([
            ("API_HOST", "ignored".to_string()),
            ("MM_URL", "wss://mm.example.com/queue".to_string()),
            ("GR_URL", String::new()),
        ]);
        let endpoints = ServerEndpoints::from_lookup(|k| env.get(k).cloned());
        assert_eq!(endpoints.matchmaking, "wss://mm.example.com/queue");
        assert_eq!(endpoints.game_room, "ws://ignored/game/ws");
    }

    #[test]
    fn game_room_url_encodes_query() {
        let session = PlayerSession::new(PlayerIdentity::new("ann lee", "t"), "room&1", 2);
        let url = ServerEndpoints::default().game_room_url(&session).unwrap();
        assert_eq!(
            url.as_str(),
            "ws://localhost/game/ws?gameID=room%261&player=2&username=ann+lee"
        );
    }

    #[test]
    fn invalid_urls_are_rejected() {
        let endpoints = ServerEndpoints {
            matchmaking: "not a url".into(),
            game_room: "http://localhost/game/ws".into(),
        };
        assert!(matches!(
            endpoints.matchmaking_url(),
            Err(SessionError::InvalidUrl(_))
        ));
        let session = PlayerSession::new(PlayerIdentity::new("a", "t"), "r", 1);
        assert!(matches!(
            endpoints.game_room_url(&session),
            Err(SessionError::InvalidUrl(_))
        ));
    }
}
