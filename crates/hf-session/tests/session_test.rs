use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use hf_bridge::{
    BridgeError, CallPolicy, CommandBridge, LoopbackBridge, OutputRouter, OutputSubscription,
    TerminalEvent,
};
use hf_core::{AgentId, Geometry};
use hf_session::{SessionError, SessionOptions, SessionStatus, TerminalSession};

// ===========================================================================
// Scripted bridge
// ===========================================================================

/// Records every command and can be told to fail or hang specific steps.
#[derive(Default)]
struct ScriptedBridge {
    router: OutputRouter,
    opens: AtomicU32,
    streams: AtomicU32,
    subscribes: AtomicU32,
    closes: AtomicU32,
    inputs: Mutex<Vec<Vec<u8>>>,
    resizes: Mutex<Vec<Geometry>>,
    fail_start_stream: AtomicBool,
    hang_open: AtomicBool,
}

impl ScriptedBridge {
    fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn push_output(&self, agent_id: &AgentId, data: &[u8]) {
        self.router.publish(
            agent_id,
            TerminalEvent::Output {
                data: data.to_vec(),
            },
        );
    }

    fn push_exited(&self, agent_id: &AgentId, message: &str) {
        self.router.publish(
            agent_id,
            TerminalEvent::Exited {
                message: message.to_string(),
            },
        );
    }

    fn inputs(&self) -> Vec<Vec<u8>> {
        self.inputs.lock().unwrap().clone()
    }

    fn resizes(&self) -> Vec<Geometry> {
        self.resizes.lock().unwrap().clone()
    }
}

#[async_trait]
impl CommandBridge for ScriptedBridge {
    async fn open_session(&self, _agent_id: &AgentId) -> Result<(), BridgeError> {
        if self.hang_open.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        self.opens.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn start_stream(&self, _agent_id: &AgentId) -> Result<(), BridgeError> {
        self.streams.fetch_add(1, Ordering::SeqCst);
        if self.fail_start_stream.load(Ordering::SeqCst) {
            return Err(BridgeError::rejected(
                "start-stream",
                "stream backend unavailable",
            ));
        }
        Ok(())
    }

    async fn subscribe(&self, agent_id: &AgentId) -> Result<OutputSubscription, BridgeError> {
        self.subscribes.fetch_add(1, Ordering::SeqCst);
        Ok(OutputSubscription::new(
            agent_id.clone(),
            self.router.subscribe(agent_id),
        ))
    }

    async fn send_input(&self, _agent_id: &AgentId, data: &[u8]) -> Result<(), BridgeError> {
        self.inputs.lock().unwrap().push(data.to_vec());
        Ok(())
    }

    async fn resize(&self, _agent_id: &AgentId, geometry: Geometry) -> Result<(), BridgeError> {
        self.resizes.lock().unwrap().push(geometry);
        Ok(())
    }

    async fn close_session(&self, _agent_id: &AgentId) -> Result<(), BridgeError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn fast_options() -> SessionOptions {
    let policy = CallPolicy {
        deadline: Duration::from_millis(200),
        max_attempts: 1,
        backoff_base: Duration::from_millis(1),
    };
    SessionOptions {
        control: policy.clone(),
        input: policy,
        fallback_geometry: Geometry::new(24, 80),
    }
}

async fn recv_text(outputs: &flume::Receiver<String>) -> String {
    tokio::time::timeout(Duration::from_secs(2), outputs.recv_async())
        .await
        .expect("timed out waiting for output")
        .expect("output channel disconnected")
}

// ===========================================================================
// Handshake and initialization guard
// ===========================================================================

#[tokio::test]
async fn test_start_connects_and_sends_initial_resize() {
    let bridge = ScriptedBridge::new();
    let session = TerminalSession::with_options(
        AgentId::new("abc123"),
        bridge.clone(),
        fast_options(),
    );

    session.start().await.expect("start failed");

    assert_eq!(session.status(), SessionStatus::Connected);
    assert_eq!(bridge.opens.load(Ordering::SeqCst), 1);
    assert_eq!(bridge.streams.load(Ordering::SeqCst), 1);
    assert_eq!(bridge.subscribes.load(Ordering::SeqCst), 1);
    assert_eq!(bridge.resizes(), vec![Geometry::new(24, 80)]);
    assert_eq!(session.last_geometry(), Some(Geometry::new(24, 80)));
}

#[tokio::test]
async fn test_concurrent_starts_issue_handshake_once() {
    let bridge = ScriptedBridge::new();
    let session = TerminalSession::with_options(
        AgentId::new("abc123"),
        bridge.clone(),
        fast_options(),
    );

    let (a, b) = tokio::join!(session.start(), session.start());
    a.expect("first start failed");
    b.expect("second start failed");

    assert_eq!(bridge.opens.load(Ordering::SeqCst), 1);
    assert_eq!(bridge.streams.load(Ordering::SeqCst), 1);
    assert_eq!(bridge.subscribes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_start_when_connected_is_noop() {
    let bridge = ScriptedBridge::new();
    let session = TerminalSession::with_options(
        AgentId::new("abc123"),
        bridge.clone(),
        fast_options(),
    );

    session.start().await.unwrap();
    session.start().await.unwrap();

    assert_eq!(bridge.opens.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_failure_at_start_stream_surfaces_error_and_allows_retry() {
    let bridge = ScriptedBridge::new();
    bridge.fail_start_stream.store(true, Ordering::SeqCst);
    let session = TerminalSession::with_options(
        AgentId::new("abc123"),
        bridge.clone(),
        fast_options(),
    );

    let err = session.start().await.unwrap_err();
    match &err {
        SessionError::Handshake { step, .. } => assert_eq!(*step, "start-stream"),
        other => panic!("expected handshake error, got {other:?}"),
    }
    let status = session.status();
    assert!(
        status.error_message().unwrap().contains("start-stream"),
        "error message should name the failed step: {status:?}"
    );
    assert!(session.can_reconnect());

    // Guard was reset; the retry runs the whole sequence again from open.
    bridge.fail_start_stream.store(false, Ordering::SeqCst);
    session.start().await.expect("retry failed");
    assert_eq!(session.status(), SessionStatus::Connected);
    assert_eq!(bridge.opens.load(Ordering::SeqCst), 2);
    assert_eq!(bridge.streams.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_hung_backend_call_times_out_distinctly() {
    let bridge = ScriptedBridge::new();
    bridge.hang_open.store(true, Ordering::SeqCst);
    let mut opts = fast_options();
    opts.control.deadline = Duration::from_millis(50);
    let session = TerminalSession::with_options(AgentId::new("abc123"), bridge.clone(), opts);

    let err = session.start().await.unwrap_err();
    match err {
        SessionError::Handshake { step, source } => {
            assert_eq!(step, "open-session");
            assert!(source.is_timeout(), "expected timeout cause, got {source:?}");
        }
        other => panic!("expected handshake error, got {other:?}"),
    }
    assert!(matches!(session.status(), SessionStatus::Error { .. }));
}

// ===========================================================================
// Input gate
// ===========================================================================

#[tokio::test]
async fn test_input_rejected_before_connect() {
    let bridge = ScriptedBridge::new();
    let session = TerminalSession::with_options(
        AgentId::new("abc123"),
        bridge.clone(),
        fast_options(),
    );

    let err = session.submit_input("ls\n").await.unwrap_err();
    assert!(matches!(err, SessionError::NotConnected));
    assert!(bridge.inputs().is_empty());
}

#[tokio::test]
async fn test_input_rejected_after_stop() {
    let bridge = ScriptedBridge::new();
    let session = TerminalSession::with_options(
        AgentId::new("abc123"),
        bridge.clone(),
        fast_options(),
    );

    session.start().await.unwrap();
    session.stop().await;

    let err = session.submit_input("ls\n").await.unwrap_err();
    assert!(matches!(err, SessionError::NotConnected));
    assert!(bridge.inputs().is_empty());
}

#[tokio::test]
async fn test_execute_command_appends_newline() {
    let bridge = ScriptedBridge::new();
    let session = TerminalSession::with_options(
        AgentId::new("abc123"),
        bridge.clone(),
        fast_options(),
    );

    session.start().await.unwrap();
    session.execute_command("ls").await.unwrap();

    assert_eq!(bridge.inputs(), vec![b"ls\n".to_vec()]);
}

// ===========================================================================
// Resize synchronizer
// ===========================================================================

#[tokio::test]
async fn test_resize_suppressed_when_geometry_unchanged() {
    let bridge = ScriptedBridge::new();
    let session = TerminalSession::with_options(
        AgentId::new("abc123"),
        bridge.clone(),
        fast_options(),
    );

    session.start().await.unwrap();
    assert_eq!(bridge.resizes().len(), 1);

    // Same as the initial geometry: suppressed.
    session.resize(24, 80).await;
    assert_eq!(bridge.resizes().len(), 1);

    session.resize(40, 132).await;
    assert_eq!(bridge.resizes().len(), 2);
    assert_eq!(session.last_geometry(), Some(Geometry::new(40, 132)));
}

#[tokio::test]
async fn test_resize_ignored_while_disconnected() {
    let bridge = ScriptedBridge::new();
    let session = TerminalSession::with_options(
        AgentId::new("abc123"),
        bridge.clone(),
        fast_options(),
    );

    session.resize(40, 132).await;
    assert!(bridge.resizes().is_empty());
}

// ===========================================================================
// Output path
// ===========================================================================

#[tokio::test]
async fn test_output_decoded_and_forwarded() {
    let bridge = ScriptedBridge::new();
    let agent = AgentId::new("abc123");
    let session = TerminalSession::with_options(agent.clone(), bridge.clone(), fast_options());

    session.start().await.unwrap();
    let outputs = session.outputs();

    bridge.push_output(&agent, "file.txt\n".as_bytes());
    assert_eq!(recv_text(&outputs).await, "file.txt\n");
}

#[tokio::test]
async fn test_output_split_across_chunks_decodes_cleanly() {
    let bridge = ScriptedBridge::new();
    let agent = AgentId::new("abc123");
    let session = TerminalSession::with_options(agent.clone(), bridge.clone(), fast_options());

    session.start().await.unwrap();
    let outputs = session.outputs();

    // "日" split mid-sequence across two events.
    bridge.push_output(&agent, &[0xE6, 0x97]);
    bridge.push_output(&agent, &[0xA5]);
    assert_eq!(recv_text(&outputs).await, "日");
}

#[tokio::test]
async fn test_output_after_stop_never_reaches_consumer() {
    let bridge = ScriptedBridge::new();
    let agent = AgentId::new("abc123");
    let session = TerminalSession::with_options(agent.clone(), bridge.clone(), fast_options());

    session.start().await.unwrap();
    let outputs = session.outputs();
    session.stop().await;

    bridge.push_output(&agent, b"late bytes");

    // The decode path was disposed during cleanup; the channel reports
    // disconnected rather than delivering anything.
    let result = tokio::time::timeout(Duration::from_millis(200), outputs.recv_async()).await;
    assert!(matches!(result, Ok(Err(_))), "late output must be dropped");
}

#[tokio::test]
async fn test_backend_exit_moves_session_to_error_and_reconnects() {
    let bridge = ScriptedBridge::new();
    let agent = AgentId::new("abc123");
    let session = TerminalSession::with_options(agent.clone(), bridge.clone(), fast_options());

    session.start().await.unwrap();
    let mut status_rx = session.watch_status();

    bridge.push_exited(&agent, "shell session ended");
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            if matches!(*status_rx.borrow(), SessionStatus::Error { .. }) {
                break;
            }
            status_rx.changed().await.expect("status channel closed");
        }
    })
    .await
    .expect("session never observed the exit");

    assert!(session.can_reconnect());
    assert!(matches!(
        session.submit_input("x").await,
        Err(SessionError::NotConnected)
    ));

    session.start().await.expect("reconnect failed");
    assert_eq!(session.status(), SessionStatus::Connected);
    assert_eq!(bridge.opens.load(Ordering::SeqCst), 2);
}

// ===========================================================================
// Cleanup sequencer
// ===========================================================================

#[tokio::test]
async fn test_stop_issues_one_close_and_is_terminal() {
    let bridge = ScriptedBridge::new();
    let session = TerminalSession::with_options(
        AgentId::new("abc123"),
        bridge.clone(),
        fast_options(),
    );

    session.start().await.unwrap();
    session.stop().await;
    session.stop().await;

    assert_eq!(bridge.closes.load(Ordering::SeqCst), 1);
    assert_eq!(session.status(), SessionStatus::Closed);
    assert!(matches!(session.start().await, Err(SessionError::Closed)));
}

#[tokio::test]
async fn test_stop_bumps_epoch() {
    let bridge = ScriptedBridge::new();
    let session = TerminalSession::with_options(
        AgentId::new("abc123"),
        bridge.clone(),
        fast_options(),
    );

    session.start().await.unwrap();
    let epoch = session.epoch();
    session.stop().await;
    assert_eq!(session.epoch(), epoch + 1);
}

// ===========================================================================
// End-to-end against the loopback bridge
// ===========================================================================

#[tokio::test]
async fn test_full_lifecycle_against_loopback() {
    let bridge = Arc::new(LoopbackBridge::new());
    let agent = AgentId::new("abc123");
    let session = TerminalSession::with_options(agent.clone(), bridge.clone(), fast_options());

    session.start().await.expect("connect failed");
    assert_eq!(session.status(), SessionStatus::Connected);
    assert_eq!(bridge.geometry(&agent), Some(Geometry::new(24, 80)));

    // The loopback echoes input, so the command comes back decoded.
    let outputs = session.outputs();
    session.execute_command("ls").await.unwrap();
    assert_eq!(recv_text(&outputs).await, "ls\n");

    session.stop().await;
    assert_eq!(session.status(), SessionStatus::Closed);
    assert!(!bridge.is_open(&agent));
}

#[tokio::test]
async fn test_two_agents_are_isolated() {
    let bridge = Arc::new(LoopbackBridge::new());
    let agent_a = AgentId::new("agent-a");
    let agent_b = AgentId::new("agent-b");
    let session_a =
        TerminalSession::with_options(agent_a.clone(), bridge.clone(), fast_options());
    let session_b =
        TerminalSession::with_options(agent_b.clone(), bridge.clone(), fast_options());

    session_a.start().await.unwrap();
    session_b.start().await.unwrap();

    let outputs_a = session_a.outputs();
    let outputs_b = session_b.outputs();

    session_a.submit_input("only-a").await.unwrap();
    assert_eq!(recv_text(&outputs_a).await, "only-a");

    let result = tokio::time::timeout(Duration::from_millis(200), outputs_b.recv_async()).await;
    assert!(result.is_err(), "agent-b must not see agent-a's output");

    session_a.stop().await;
    assert_eq!(session_b.status(), SessionStatus::Connected);
    session_b.stop().await;
}

#[tokio::test]
async fn test_start_detached_connects_eventually() {
    let bridge = Arc::new(LoopbackBridge::new());
    let session = TerminalSession::with_options(
        AgentId::new("abc123"),
        bridge.clone(),
        fast_options(),
    );

    session.start_detached();
    let mut status_rx = session.watch_status();
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            if status_rx.borrow().is_connected() {
                break;
            }
            status_rx.changed().await.expect("status channel closed");
        }
    })
    .await
    .expect("detached start never connected");

    session.stop().await;
}
