use hf_core::AgentId;
use serde::{Deserialize, Serialize};

/// Wire names of the request/response commands.
pub mod commands {
    pub const OPEN_SESSION: &str = "open-session";
    pub const START_STREAM: &str = "start-stream";
    pub const SUBSCRIBE: &str = "subscribe";
    pub const SEND_INPUT: &str = "send-input";
    pub const RESIZE: &str = "resize";
    pub const CLOSE_SESSION: &str = "close-session";
}

// ---------------------------------------------------------------------------
// TerminalEvent
// ---------------------------------------------------------------------------

/// Push events delivered on a session's subscription, in backend-send order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
#[serde(rename_all = "snake_case")]
pub enum TerminalEvent {
    /// Raw output bytes produced since the previous event.
    Output { data: Vec<u8> },
    /// The backend-side shell ended on its own (exit, kill, crash).
    Exited { message: String },
}

/// Name of the per-agent event channel a remote transport would publish on.
pub fn event_channel(agent_id: &AgentId) -> String {
    format!("terminal-events-{agent_id}")
}
