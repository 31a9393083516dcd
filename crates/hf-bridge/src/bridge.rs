use async_trait::async_trait;
use hf_core::{AgentId, Geometry};

use crate::error::BridgeError;
use crate::protocol::TerminalEvent;

// ---------------------------------------------------------------------------
// CommandBridge
// ---------------------------------------------------------------------------

/// The backend's command surface, as consumed by the session layer.
///
/// Implementations must route every command and subscription by agent id:
/// many sessions are open concurrently (one per agent) and nothing may
/// cross between them. Calls are at-least-once per invocation with no
/// built-in deadline; callers wrap them in a
/// [`CallPolicy`](crate::CallPolicy).
///
/// Partial-state contract: a failed handshake step is not rolled back
/// here. The backend owns making repeated `open_session`/`close_session`
/// safe against whatever state an earlier attempt left behind.
#[async_trait]
pub trait CommandBridge: Send + Sync {
    /// Create the backend PTY/work context for this agent.
    async fn open_session(&self, agent_id: &AgentId) -> Result<(), BridgeError>;

    /// Start pumping output for an already-open session.
    async fn start_stream(&self, agent_id: &AgentId) -> Result<(), BridgeError>;

    /// Subscribe to this agent's push-event stream.
    async fn subscribe(&self, agent_id: &AgentId) -> Result<OutputSubscription, BridgeError>;

    /// Write bytes to the session's stdin.
    async fn send_input(&self, agent_id: &AgentId, data: &[u8]) -> Result<(), BridgeError>;

    /// Propagate new terminal dimensions.
    async fn resize(&self, agent_id: &AgentId, geometry: Geometry) -> Result<(), BridgeError>;

    /// Tear down the backend session. Best-effort by convention: callers
    /// log failures and keep going.
    async fn close_session(&self, agent_id: &AgentId) -> Result<(), BridgeError>;
}

// ---------------------------------------------------------------------------
// OutputSubscription
// ---------------------------------------------------------------------------

/// One agent's live event stream. Dropping it unsubscribes: the
/// publishing side prunes disconnected receivers.
pub struct OutputSubscription {
    agent_id: AgentId,
    receiver: flume::Receiver<TerminalEvent>,
}

impl OutputSubscription {
    pub fn new(agent_id: AgentId, receiver: flume::Receiver<TerminalEvent>) -> Self {
        Self { agent_id, receiver }
    }

    pub fn agent_id(&self) -> &AgentId {
        &self.agent_id
    }

    /// Await the next event; `None` once the publishing side is gone.
    pub async fn recv(&self) -> Option<TerminalEvent> {
        self.receiver.recv_async().await.ok()
    }

    pub fn into_receiver(self) -> flume::Receiver<TerminalEvent> {
        self.receiver
    }
}

impl std::fmt::Debug for OutputSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputSubscription")
            .field("agent_id", &self.agent_id)
            .field("pending", &self.receiver.len())
            .finish()
    }
}
