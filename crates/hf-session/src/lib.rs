//! Per-agent terminal session lifecycle over a command bridge.
//!
//! One [`TerminalSession`] owns everything a UI needs to drive a remote
//! shell for one agent: the open → start-stream → subscribe → initial
//! resize handshake, an initialization guard against re-render churn,
//! the input gate, geometry-suppressed resize, and a strictly ordered
//! cleanup sequence. Stale asynchronous completions are invalidated by
//! an epoch counter rather than mirrored connection flags, so exactly
//! one state machine governs each backend session.

pub mod error;
pub mod session;
pub mod status;

pub use error::SessionError;
pub use session::{SessionOptions, TerminalSession};
pub use status::SessionStatus;
