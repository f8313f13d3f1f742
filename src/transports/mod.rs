//! Transport implementations for the game session layer.
//!
//! Concrete [`Transport`](crate::Transport) and
//! [`Connector`](crate::Connector) implementations live behind feature
//! gates:
//!
//! | Feature                | Transport              | Connector              |
//! |------------------------|------------------------|------------------------|
//! | `transport-websocket`  | [`WebSocketTransport`] | [`WebSocketConnector`] |
//!
//! # Example
//!
//! ```rust,ignore
//! # async fn example() -> Result<(), memory_match_client::SessionError> {
//! use memory_match_client::{Transport, WebSocketTransport};
//!
//! let mut ws = WebSocketTransport::connect("ws://localhost/websoc/mm").await?;
//! ws.send(r#"{"type":"queue","username":"alice","token":"t","score":300}"#.to_string())
//!     .await?;
//!
//! if let Some(Ok(frame)) = ws.recv().await {
//!     println!("server said: {frame:?}");
//! }
//!
//! ws.close().await?;
//! # Ok(())
//! # }
//! ```

#[cfg(feature = "transport-websocket")]
pub mod websocket;

#[cfg(feature = "transport-websocket")]
pub use websocket::{WebSocketConnector, WebSocketTransport};
