use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// SessionStatus
// ---------------------------------------------------------------------------

/// Lifecycle of one terminal session.
///
/// `Closed` is terminal: reconnecting means constructing a new session.
/// `Error` is recoverable -- `start()` from there re-runs the full
/// handshake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SessionStatus {
    Uninitialized,
    Initializing,
    Connected,
    Error { message: String },
    Closed,
}

impl SessionStatus {
    pub fn is_connected(&self) -> bool {
        matches!(self, SessionStatus::Connected)
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, SessionStatus::Closed)
    }

    /// The failure description, when in `Error`.
    pub fn error_message(&self) -> Option<&str> {
        match self {
            SessionStatus::Error { message } => Some(message),
            _ => None,
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SessionStatus::Uninitialized => "uninitialized",
            SessionStatus::Initializing => "initializing",
            SessionStatus::Connected => "connected",
            SessionStatus::Error { .. } => "error",
            SessionStatus::Closed => "closed",
        };
        write!(f, "{}", label)
    }
}
