//! Matchmaking wire types. Both directions are tagged by `type`.

use serde::{Deserialize, Serialize};

/// Credentials and rating carried by every queue request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueTicket {
    pub username: String,
    /// Opaque session token issued by the login service.
    pub token: String,
    /// Skill rating used to pair players of similar strength.
    pub score: u32,
}

/// Requests sent to the matchmaking server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QueueRequest {
    /// Enter the queue.
    Queue(QueueTicket),
    /// Leave the queue.
    Cancel(QueueTicket),
}

/// Payload of a `match_found` notice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchFound {
    /// Game room to join.
    #[serde(rename = "roomId")]
    pub room_id: String,
    /// Opponent's username.
    pub opponent: String,
    /// Opponent's skill rating.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Notices pushed by the matchmaking server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QueueNotice {
    /// Greeting sent right after the socket opens.
    Welcome {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
        #[serde(
            default,
            rename = "clientId",
            skip_serializing_if = "Option::is_none"
        )]
        client_id: Option<String>,
    },
    /// The queue request was accepted.
    QueueSuccess {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    MatchFound(MatchFound),
    /// The player waited too long and was removed.
    QueueTimeout {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    /// An operator emptied the queue.
    QueueCleared {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    /// The server is about to hang up (sent after `match_found`).
    ConnectionClosing {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
        #[serde(default, rename = "roomId", skip_serializing_if = "Option::is_none")]
        room_id: Option<String>,
    },
    Error {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn queue_request_is_flat() {
        let ticket = QueueTicket {
            username: "alice".into(),
            token: "tok".into(),
            score: 300,
        };
        assert_eq!(
            serde_json::to_value(QueueRequest::Queue(ticket.clone())).unwrap(),
            json!({"type": "queue", "username": "alice", "token": "tok", "score": 300})
        );
        assert_eq!(
            serde_json::to_value(QueueRequest::Cancel(ticket)).unwrap(),
            json!({"type": "cancel", "username": "alice", "token": "tok", "score": 300})
        );
    }

    #[test]
    fn match_found_reads_server_payload() {
        let notice: QueueNotice = serde_json::from_value(json!({
            "type": "match_found",
            "opponent": "bob",
            "score": 280,
            "roomId": "room-9",
            "timestamp": "2026-01-01T00:00:00Z",
            "message": "Connection will close after this message."
        }))
        .unwrap();
        let QueueNotice::MatchFound(found) = notice else {
            panic!("expected match_found");
        };
        assert_eq!(found.room_id, "room-9");
        assert_eq!(found.opponent, "bob");
        assert_eq!(found.score, Some(280));
    }

    #[test]
    fn welcome_fields_are_optional() {
        let notice: QueueNotice = serde_json::from_value(json!({"type": "welcome"})).unwrap();
        assert_eq!(
            notice,
            QueueNotice::Welcome {
                message: None,
                client_id: None
            }
        );
    }
}
