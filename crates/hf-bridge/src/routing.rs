use std::sync::Arc;

use dashmap::DashMap;
use hf_core::AgentId;

use crate::protocol::TerminalEvent;

/// Per-agent broadcast of terminal events over flume channels.
///
/// Each agent id has its own subscriber list; publishing to one agent
/// never reaches another's subscribers. Disconnected subscribers (whose
/// receivers have been dropped) are pruned on publish. Cheap to clone.
#[derive(Clone, Default)]
pub struct OutputRouter {
    inner: Arc<DashMap<AgentId, Vec<flume::Sender<TerminalEvent>>>>,
}

impl OutputRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new subscriber for `agent_id` and return its receiving end.
    pub fn subscribe(&self, agent_id: &AgentId) -> flume::Receiver<TerminalEvent> {
        let (tx, rx) = flume::unbounded();
        self.inner.entry(agent_id.clone()).or_default().push(tx);
        rx
    }

    /// Deliver an event to every live subscriber of `agent_id`.
    pub fn publish(&self, agent_id: &AgentId, event: TerminalEvent) {
        if let Some(mut senders) = self.inner.get_mut(agent_id) {
            senders.retain(|tx| tx.send(event.clone()).is_ok());
        }
    }

    /// Number of live subscribers for `agent_id`.
    pub fn subscriber_count(&self, agent_id: &AgentId) -> usize {
        self.inner
            .get(agent_id)
            .map(|senders| senders.len())
            .unwrap_or(0)
    }

    /// Drop every subscriber registered for `agent_id`.
    pub fn remove(&self, agent_id: &AgentId) {
        self.inner.remove(agent_id);
    }
}
