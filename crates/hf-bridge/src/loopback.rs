use async_trait::async_trait;
use dashmap::DashMap;
use hf_core::{AgentId, Geometry};
use tracing::{debug, info};

use crate::bridge::{CommandBridge, OutputSubscription};
use crate::error::BridgeError;
use crate::protocol::{commands, TerminalEvent};
use crate::routing::OutputRouter;

// ---------------------------------------------------------------------------
// LoopbackBridge
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct LoopbackSession {
    streaming: bool,
    geometry: Option<Geometry>,
}

/// In-process [`CommandBridge`] used by tests and the demo binary.
///
/// Enforces the command preconditions (stream/input/resize require an open
/// session) and echoes input bytes back as output events, so a session
/// wired to it behaves like a terminal talking to `cat`.
///
/// Duplicate-open contract: opening an agent id that already has a live
/// session closes and replaces it -- existing subscribers receive
/// [`TerminalEvent::Exited`] and the new session starts clean.
#[derive(Default)]
pub struct LoopbackBridge {
    sessions: DashMap<AgentId, LoopbackSession>,
    router: OutputRouter,
}

impl LoopbackBridge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inject backend output, as the real PTY reader would.
    pub fn push_output(&self, agent_id: &AgentId, data: &[u8]) {
        self.router.publish(
            agent_id,
            TerminalEvent::Output {
                data: data.to_vec(),
            },
        );
    }

    /// Simulate the backend shell exiting on its own.
    pub fn push_exited(&self, agent_id: &AgentId, message: impl Into<String>) {
        self.sessions.remove(agent_id);
        self.router.publish(
            agent_id,
            TerminalEvent::Exited {
                message: message.into(),
            },
        );
    }

    pub fn is_open(&self, agent_id: &AgentId) -> bool {
        self.sessions.contains_key(agent_id)
    }

    /// Agent ids with a live session, in no particular order.
    pub fn open_agents(&self) -> Vec<AgentId> {
        self.sessions.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Last geometry the backend saw for this agent.
    pub fn geometry(&self, agent_id: &AgentId) -> Option<Geometry> {
        self.sessions.get(agent_id).and_then(|s| s.geometry)
    }

    fn require_open(
        &self,
        command: &'static str,
        agent_id: &AgentId,
    ) -> Result<dashmap::mapref::one::RefMut<'_, AgentId, LoopbackSession>, BridgeError> {
        self.sessions
            .get_mut(agent_id)
            .ok_or_else(|| BridgeError::rejected(command, format!("no session open for {agent_id}")))
    }
}

#[async_trait]
impl CommandBridge for LoopbackBridge {
    async fn open_session(&self, agent_id: &AgentId) -> Result<(), BridgeError> {
        if self.sessions.remove(agent_id).is_some() {
            info!(%agent_id, "replacing existing loopback session");
            self.router.publish(
                agent_id,
                TerminalEvent::Exited {
                    message: "session replaced".into(),
                },
            );
        }
        self.sessions
            .insert(agent_id.clone(), LoopbackSession::default());
        debug!(%agent_id, "loopback session opened");
        Ok(())
    }

    async fn start_stream(&self, agent_id: &AgentId) -> Result<(), BridgeError> {
        let mut session = self.require_open(commands::START_STREAM, agent_id)?;
        session.streaming = true;
        Ok(())
    }

    async fn subscribe(&self, agent_id: &AgentId) -> Result<OutputSubscription, BridgeError> {
        self.require_open(commands::SUBSCRIBE, agent_id)?;
        Ok(OutputSubscription::new(
            agent_id.clone(),
            self.router.subscribe(agent_id),
        ))
    }

    async fn send_input(&self, agent_id: &AgentId, data: &[u8]) -> Result<(), BridgeError> {
        let streaming = self
            .require_open(commands::SEND_INPUT, agent_id)?
            .streaming;
        if !streaming {
            return Err(BridgeError::rejected(
                commands::SEND_INPUT,
                format!("stream not started for {agent_id}"),
            ));
        }
        // Echo, like a PTY running `cat`.
        self.push_output(agent_id, data);
        Ok(())
    }

    async fn resize(&self, agent_id: &AgentId, geometry: Geometry) -> Result<(), BridgeError> {
        let mut session = self.require_open(commands::RESIZE, agent_id)?;
        session.geometry = Some(geometry);
        debug!(%agent_id, %geometry, "loopback session resized");
        Ok(())
    }

    async fn close_session(&self, agent_id: &AgentId) -> Result<(), BridgeError> {
        if self.sessions.remove(agent_id).is_some() {
            self.router.publish(
                agent_id,
                TerminalEvent::Exited {
                    message: "session closed".into(),
                },
            );
            info!(%agent_id, "loopback session closed");
        } else {
            debug!(%agent_id, "close for unknown session ignored");
        }
        Ok(())
    }
}
