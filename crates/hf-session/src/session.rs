use std::sync::{Arc, Mutex, MutexGuard, Weak};

use hf_bridge::{commands, CallPolicy, CommandBridge, OutputSubscription, TerminalEvent};
use hf_codec::StreamDecoder;
use hf_core::{config::Config, AgentId, Geometry};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::error::SessionError;
use crate::status::SessionStatus;

// ---------------------------------------------------------------------------
// SessionOptions
// ---------------------------------------------------------------------------

/// Tunables for one session, usually derived from [`Config`].
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Policy for control commands (open, start-stream, resize, close).
    pub control: CallPolicy,
    /// Policy for send-input (deadline only, no retry).
    pub input: CallPolicy,
    /// Geometry for the initial resize when the consumer has not yet
    /// reported one.
    pub fallback_geometry: Geometry,
}

impl SessionOptions {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            control: CallPolicy::control(&cfg.bridge),
            input: CallPolicy::input(&cfg.bridge),
            fallback_geometry: cfg.terminal.default_geometry(),
        }
    }
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

// ---------------------------------------------------------------------------
// TerminalSession
// ---------------------------------------------------------------------------

struct Inner {
    status: SessionStatus,
    /// Bumped once per (re)initialization attempt and once at close.
    /// Every asynchronous continuation captures the epoch current when it
    /// was issued and no-ops if the session has since advanced.
    epoch: u64,
    /// Last geometry successfully sent to the backend.
    geometry: Option<Geometry>,
    /// True only while a handshake is executing (initialization guard).
    initializing: bool,
    /// Set once teardown has begun; makes `stop()` exactly-once.
    closing: bool,
    /// No input passes once sealed, regardless of status.
    input_sealed: bool,
    handshake_task: Option<JoinHandle<()>>,
    pump_task: Option<JoinHandle<()>>,
    /// Consumer-facing decoded-text sender; dropped during cleanup.
    output_tx: Option<flume::Sender<String>>,
}

/// One agent's terminal session: drives the connection handshake, gates
/// input, forwards decoded output, and tears everything down in order.
///
/// The session owns its subscription and tasks exclusively; nothing is
/// shared between two agents' sessions except the bridge itself. Callers
/// must invoke [`stop`](Self::stop) when the consuming view goes away --
/// it is the counterpart of unmount.
pub struct TerminalSession {
    agent_id: AgentId,
    bridge: Arc<dyn CommandBridge>,
    opts: SessionOptions,
    weak: Weak<TerminalSession>,
    inner: Mutex<Inner>,
    status_tx: watch::Sender<SessionStatus>,
    output_rx: flume::Receiver<String>,
}

impl TerminalSession {
    pub fn new(agent_id: AgentId, bridge: Arc<dyn CommandBridge>) -> Arc<Self> {
        Self::with_options(agent_id, bridge, SessionOptions::default())
    }

    pub fn with_options(
        agent_id: AgentId,
        bridge: Arc<dyn CommandBridge>,
        opts: SessionOptions,
    ) -> Arc<Self> {
        let (output_tx, output_rx) = flume::unbounded();
        let (status_tx, _) = watch::channel(SessionStatus::Uninitialized);
        Arc::new_cyclic(|weak| Self {
            agent_id,
            bridge,
            opts,
            weak: weak.clone(),
            inner: Mutex::new(Inner {
                status: SessionStatus::Uninitialized,
                epoch: 0,
                geometry: None,
                initializing: false,
                closing: false,
                input_sealed: false,
                handshake_task: None,
                pump_task: None,
                output_tx: Some(output_tx),
            }),
            status_tx,
            output_rx,
        })
    }

    pub fn agent_id(&self) -> &AgentId {
        &self.agent_id
    }

    /// Current status snapshot.
    pub fn status(&self) -> SessionStatus {
        self.lock_inner().status.clone()
    }

    /// Observe status transitions.
    pub fn watch_status(&self) -> watch::Receiver<SessionStatus> {
        self.status_tx.subscribe()
    }

    /// Decoded output text, in delivery order. The channel disconnects
    /// once the session is stopped.
    pub fn outputs(&self) -> flume::Receiver<String> {
        self.output_rx.clone()
    }

    /// True when a fresh `start()` would be accepted after a failure or a
    /// backend-side exit.
    pub fn can_reconnect(&self) -> bool {
        matches!(self.lock_inner().status, SessionStatus::Error { .. })
    }

    /// Last geometry successfully pushed to the backend.
    pub fn last_geometry(&self) -> Option<Geometry> {
        self.lock_inner().geometry
    }

    pub fn epoch(&self) -> u64 {
        self.lock_inner().epoch
    }

    // -- lifecycle ----------------------------------------------------------

    /// Establish the session: open → start-stream → subscribe → initial
    /// resize, strictly in that order.
    ///
    /// Idempotent under churn: a call while a handshake is already running
    /// or the session is connected returns `Ok(())` without issuing any
    /// command. From `Error`, the full sequence re-runs. From `Closed`,
    /// fails with [`SessionError::Closed`].
    pub async fn start(&self) -> Result<(), SessionError> {
        let (epoch, geometry) = {
            let mut inner = self.lock_inner();
            if inner.closing || inner.status.is_closed() {
                return Err(SessionError::Closed);
            }
            if inner.initializing
                || matches!(
                    inner.status,
                    SessionStatus::Initializing | SessionStatus::Connected
                )
            {
                trace!(agent_id = %self.agent_id, "start ignored, already initializing or connected");
                return Ok(());
            }
            inner.initializing = true;
            inner.epoch += 1;
            self.set_status(&mut inner, SessionStatus::Initializing);
            (
                inner.epoch,
                inner.geometry.unwrap_or(self.opts.fallback_geometry),
            )
        };

        let result = self.handshake(epoch, geometry).await;

        let mut inner = self.lock_inner();
        inner.initializing = false;
        if inner.epoch != epoch || inner.closing {
            // Torn down or restarted while the handshake was in flight;
            // this completion no longer owns the session.
            trace!(agent_id = %self.agent_id, epoch, "discarding stale handshake completion");
            return Ok(());
        }
        match result {
            Ok(()) => {
                inner.geometry = Some(geometry);
                self.set_status(&mut inner, SessionStatus::Connected);
                Ok(())
            }
            Err(err) => {
                self.set_status(
                    &mut inner,
                    SessionStatus::Error {
                        message: err.to_string(),
                    },
                );
                Err(err)
            }
        }
    }

    /// Fire the handshake on the runtime without awaiting it, the way a
    /// view kicks off connection on mount. The stored task handle is
    /// cancelled during cleanup.
    pub fn start_detached(&self) {
        let Some(session) = self.weak.upgrade() else {
            return;
        };
        let handle = tokio::spawn(async move {
            if let Err(err) = session.start().await {
                warn!(agent_id = %session.agent_id, error = %err, "detached connect failed");
            }
        });
        self.lock_inner().handshake_task.replace(handle);
    }

    /// Tear the session down. Runs the cleanup sequence exactly once and
    /// leaves the session `Closed`; later calls are no-ops.
    ///
    /// Ordering is load-bearing: pending handshake work is cancelled,
    /// then the subscription is dropped and input sealed, and only then
    /// is the backend close issued.
    pub async fn stop(&self) {
        let (handshake_task, pump_task) = {
            let mut inner = self.lock_inner();
            if inner.closing || inner.status.is_closed() {
                return;
            }
            inner.closing = true;
            let handshake_task = inner.handshake_task.take();
            let pump_task = inner.pump_task.take();
            inner.input_sealed = true;
            (handshake_task, pump_task)
        };

        if let Some(task) = handshake_task {
            task.abort();
        }
        if let Some(task) = pump_task {
            // Dropping the pump drops its subscription receiver, which
            // unsubscribes from the event channel.
            task.abort();
        }

        if let Err(err) = self
            .opts
            .control
            .call(commands::CLOSE_SESSION, || {
                self.bridge.close_session(&self.agent_id)
            })
            .await
        {
            // Best-effort: the session is going away regardless.
            warn!(agent_id = %self.agent_id, error = %err, "close-session failed");
        }

        let mut inner = self.lock_inner();
        inner.output_tx.take();
        inner.epoch += 1;
        self.set_status(&mut inner, SessionStatus::Closed);
        debug!(agent_id = %self.agent_id, "session closed");
    }

    // -- input --------------------------------------------------------------

    /// Encode `text` and write it to the backend session's stdin.
    ///
    /// Rejected (never queued) unless the session is `Connected`.
    pub async fn submit_input(&self, text: &str) -> Result<(), SessionError> {
        {
            let inner = self.lock_inner();
            if inner.input_sealed || !inner.status.is_connected() {
                return Err(SessionError::NotConnected);
            }
        }
        let data = hf_codec::encode(text);
        self.opts
            .input
            .call(commands::SEND_INPUT, || {
                self.bridge.send_input(&self.agent_id, &data)
            })
            .await?;
        trace!(agent_id = %self.agent_id, bytes = data.len(), "input sent");
        Ok(())
    }

    /// `submit_input` with a trailing newline.
    pub async fn execute_command(&self, command: &str) -> Result<(), SessionError> {
        self.submit_input(&format!("{command}\n")).await
    }

    // -- resize -------------------------------------------------------------

    /// Push new dimensions to the backend.
    ///
    /// No-op while disconnected or when the geometry matches the last one
    /// sent. Failures are logged and do not invalidate the session.
    pub async fn resize(&self, rows: u16, cols: u16) {
        let geometry = Geometry::new(rows, cols);
        let epoch = {
            let inner = self.lock_inner();
            if !inner.status.is_connected() {
                trace!(agent_id = %self.agent_id, "resize ignored while disconnected");
                return;
            }
            if inner.geometry == Some(geometry) {
                trace!(agent_id = %self.agent_id, %geometry, "resize suppressed, geometry unchanged");
                return;
            }
            inner.epoch
        };

        match self
            .opts
            .control
            .call(commands::RESIZE, || {
                self.bridge.resize(&self.agent_id, geometry)
            })
            .await
        {
            Ok(()) => {
                let mut inner = self.lock_inner();
                if inner.epoch == epoch {
                    inner.geometry = Some(geometry);
                    debug!(agent_id = %self.agent_id, %geometry, "resized");
                }
            }
            Err(err) => {
                warn!(agent_id = %self.agent_id, %geometry, error = %err, "resize failed");
            }
        }
    }

    // -- internals ----------------------------------------------------------

    async fn handshake(&self, epoch: u64, geometry: Geometry) -> Result<(), SessionError> {
        debug!(agent_id = %self.agent_id, epoch, "starting handshake");

        self.opts
            .control
            .call(commands::OPEN_SESSION, || {
                self.bridge.open_session(&self.agent_id)
            })
            .await
            .map_err(|source| SessionError::Handshake {
                step: commands::OPEN_SESSION,
                source,
            })?;

        self.opts
            .control
            .call(commands::START_STREAM, || {
                self.bridge.start_stream(&self.agent_id)
            })
            .await
            .map_err(|source| SessionError::Handshake {
                step: commands::START_STREAM,
                source,
            })?;

        let subscription = self
            .opts
            .control
            .call(commands::SUBSCRIBE, || self.bridge.subscribe(&self.agent_id))
            .await
            .map_err(|source| SessionError::Handshake {
                step: commands::SUBSCRIBE,
                source,
            })?;

        self.spawn_pump(epoch, subscription);

        self.opts
            .control
            .call(commands::RESIZE, || {
                self.bridge.resize(&self.agent_id, geometry)
            })
            .await
            .map_err(|source| SessionError::Handshake {
                step: commands::RESIZE,
                source,
            })?;

        Ok(())
    }

    /// Spawn the task that drains the subscription for `epoch`. The task
    /// holds only a weak reference so an abandoned session can still be
    /// dropped.
    fn spawn_pump(&self, epoch: u64, subscription: OutputSubscription) {
        let weak = self.weak.clone();
        let handle = tokio::spawn(async move {
            let mut decoder = StreamDecoder::new();
            let receiver = subscription.into_receiver();
            while let Ok(event) = receiver.recv_async().await {
                let Some(session) = weak.upgrade() else {
                    break;
                };
                session.on_event(epoch, &mut decoder, event);
            }
            trace!(epoch, "output pump finished");
        });

        let mut inner = self.lock_inner();
        if inner.epoch != epoch {
            handle.abort();
            return;
        }
        if let Some(old) = inner.pump_task.replace(handle) {
            old.abort();
        }
    }

    fn on_event(&self, epoch: u64, decoder: &mut StreamDecoder, event: TerminalEvent) {
        let mut inner = self.lock_inner();
        if inner.epoch != epoch {
            trace!(agent_id = %self.agent_id, epoch, "dropping event for stale epoch");
            return;
        }
        match event {
            TerminalEvent::Output { data } => {
                if !inner.status.is_connected() {
                    trace!(
                        agent_id = %self.agent_id,
                        status = %inner.status,
                        "dropping output while not connected"
                    );
                    return;
                }
                let text = decoder.push(&data);
                if text.is_empty() {
                    return;
                }
                if let Some(tx) = &inner.output_tx {
                    let _ = tx.send(text);
                }
            }
            TerminalEvent::Exited { message } => {
                if !inner.status.is_connected() {
                    return;
                }
                // Forward whatever the decoder was still holding, then
                // surface the exit. The consumer may reconnect with a
                // fresh start().
                let tail = decoder.flush();
                if !tail.is_empty() {
                    if let Some(tx) = &inner.output_tx {
                        let _ = tx.send(tail);
                    }
                }
                debug!(agent_id = %self.agent_id, %message, "backend session ended");
                self.set_status(&mut inner, SessionStatus::Error { message });
            }
        }
    }

    fn set_status(&self, inner: &mut Inner, status: SessionStatus) {
        if inner.status == status {
            return;
        }
        debug!(
            agent_id = %self.agent_id,
            from = %inner.status,
            to = %status,
            "session status transition"
        );
        inner.status = status.clone();
        self.status_tx.send_replace(status);
    }

    fn lock_inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| {
            warn!("session lock poisoned, recovering");
            e.into_inner()
        })
    }
}

impl std::fmt::Debug for TerminalSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.lock_inner();
        f.debug_struct("TerminalSession")
            .field("agent_id", &self.agent_id)
            .field("status", &inner.status)
            .field("epoch", &inner.epoch)
            .field("geometry", &inner.geometry)
            .finish()
    }
}
