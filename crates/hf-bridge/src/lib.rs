//! The command-bridge boundary between UI-side session logic and the
//! backend terminal process.
//!
//! The backend is reached through two surfaces: named request/response
//! commands (open-session, start-stream, send-input, resize,
//! close-session) and a push-event stream of output bytes keyed by agent
//! id. [`CommandBridge`] abstracts both; [`LoopbackBridge`] is the
//! in-process implementation used by tests and the demo binary. Every
//! call is expected to go through a [`CallPolicy`], which adds the
//! deadline and bounded-retry behaviour the raw transport does not have.

pub mod bridge;
pub mod error;
pub mod loopback;
pub mod policy;
pub mod protocol;
pub mod routing;

pub use bridge::{CommandBridge, OutputSubscription};
pub use error::BridgeError;
pub use loopback::LoopbackBridge;
pub use policy::CallPolicy;
pub use protocol::{commands, TerminalEvent};
pub use routing::OutputRouter;
