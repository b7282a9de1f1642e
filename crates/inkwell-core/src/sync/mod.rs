//! Real-time collaboration
//!
//! One WebSocket session per open document, speaking STOMP to the
//! collaboration endpoint.
//!
//! ## Protocol
//!
//! 1. Open the WebSocket
//! 2. `CONNECT` with the acting user as login, wait for `CONNECTED`
//! 3. `SUBSCRIBE` to `/topic/document/{id}`
//! 4. `SEND` local edits to `/app/document/{id}/edit`, receive remote edits
//!    as `MESSAGE` frames on the topic
//!
//! ## Usage
//!
//! ```ignore
//! let config = SessionConfig::new("ws://localhost:8080/ws", doc_id, user_id);
//! let protocol = EditProtocol::connect(config, buffer, |edit| println!("{}", edit.content));
//! protocol.send_edit("new content");
//! ```

mod backoff;
mod connection;
mod edit;
mod frame;
mod session;

pub use backoff::{ReconnectMachine, ReconnectPolicy, ReconnectState};
pub use connection::CollabConnection;
pub use edit::{EditMessage, EditProtocol, RemoteEditFilter, RemoteEditHandler, RemoteEditOutcome};
pub use frame::{Command, Frame};
pub use session::{connect, MessageHandler, Session, SessionConfig, SessionStatus};

/// Connection status reported to the editing surface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// Transport open or handshake in flight
    Connecting,
    /// Subscribed to the document topic
    Connected,
    /// Not connected, not trying (initial state or requested teardown)
    Disconnected,
    /// Closed abnormally; retrying or out of retries
    Error,
}

impl ConnectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::Disconnected => "disconnected",
            ConnectionStatus::Error => "error",
        }
    }
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
