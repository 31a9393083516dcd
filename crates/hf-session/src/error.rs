use hf_bridge::BridgeError;
use thiserror::Error;

/// Failures surfaced by a [`TerminalSession`](crate::TerminalSession).
#[derive(Debug, Error)]
pub enum SessionError {
    /// Input or command issued while the session is not `Connected`.
    /// Input is rejected, never queued.
    #[error("terminal not connected")]
    NotConnected,

    /// The session has been torn down; construct a new one to reconnect.
    #[error("session is closed")]
    Closed,

    /// A handshake step failed; the session is now in `Error` state.
    #[error("handshake failed at {step}: {source}")]
    Handshake {
        step: &'static str,
        #[source]
        source: BridgeError,
    },

    /// A bridge call outside the handshake failed.
    #[error(transparent)]
    Bridge(#[from] BridgeError),
}
