//! Integration tests: pairing, gating, frame streaming and protocol
//! violations between a host orchestrator and viewers over real TCP on
//! localhost.

use std::net::{IpAddr, Ipv4Addr};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use deskbeam_core::collab::{InputInjector, ScreenCapture};
use deskbeam_core::protocol::{
    ChatMessage, InputEvent, KeyEvent, MouseEvent, PairingRequest, PairingResponse, Shortcut,
};
use deskbeam_core::{
    Collaborators, DeskbeamError, DeviceDescriptor, EnvelopeCodec, Frame, Message,
    OrchestratorConfig, PairingConfig, PairingFailure, SessionOrchestrator, SessionStatus,
    TransportConfig, TransportEvent, TransportService, ViewerClient, ViewerConfig,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

// ── Mock collaborators ───────────────────────────────────────────

#[derive(Default)]
struct MockCapture {
    frames: Mutex<Option<mpsc::Sender<Frame>>>,
    quality: AtomicU8,
}

impl MockCapture {
    fn sender(&self) -> Option<mpsc::Sender<Frame>> {
        self.frames.lock().unwrap().clone()
    }

    async fn push(&self, frame: Frame) {
        let tx = eventually(|| self.sender()).await;
        tx.send(frame).await.unwrap();
    }
}

#[async_trait]
impl ScreenCapture for MockCapture {
    async fn start(&self, frames: mpsc::Sender<Frame>) -> Result<(), DeskbeamError> {
        *self.frames.lock().unwrap() = Some(frames);
        Ok(())
    }

    async fn stop(&self) -> Result<(), DeskbeamError> {
        *self.frames.lock().unwrap() = None;
        // Teardown must complete even when a collaborator fails.
        Err(DeskbeamError::collaborator("capture", "already stopped"))
    }

    fn dimensions(&self) -> (u32, u32) {
        (64, 64)
    }

    fn set_quality(&self, quality: u8) {
        self.quality.store(quality, Ordering::SeqCst);
    }
}

#[derive(Default)]
struct MockInjector {
    events: Mutex<Vec<InputEvent>>,
    shortcuts: Mutex<Vec<Shortcut>>,
}

#[async_trait]
impl InputInjector for MockInjector {
    async fn start(&self) -> Result<(), DeskbeamError> {
        Ok(())
    }

    async fn stop(&self) -> Result<(), DeskbeamError> {
        Ok(())
    }

    async fn process_event(&self, event: InputEvent) -> Result<(), DeskbeamError> {
        self.events.lock().unwrap().push(event);
        Ok(())
    }

    async fn send_shortcut(&self, shortcut: Shortcut) -> Result<(), DeskbeamError> {
        self.shortcuts.lock().unwrap().push(shortcut);
        Ok(())
    }
}

// ── Helpers ──────────────────────────────────────────────────────

fn local_transport() -> TransportConfig {
    TransportConfig {
        bind_address: IpAddr::V4(Ipv4Addr::LOCALHOST),
        shutdown_grace: Duration::from_millis(500),
        ..TransportConfig::default()
    }
}

struct Host {
    orchestrator: SessionOrchestrator,
    capture: Arc<MockCapture>,
    injector: Arc<MockInjector>,
    device: DeviceDescriptor,
}

fn host_config() -> OrchestratorConfig {
    OrchestratorConfig {
        host_name: "test-host".into(),
        listen_port: 0,
        transport: local_transport(),
        quality_interval: Duration::from_millis(50),
        ..OrchestratorConfig::default()
    }
}

async fn start_host() -> Host {
    start_host_with(host_config()).await
}

async fn start_host_with(config: OrchestratorConfig) -> Host {
    let capture = Arc::new(MockCapture::default());
    let injector = Arc::new(MockInjector::default());
    let orchestrator =
        SessionOrchestrator::new(config, Collaborators::new(capture.clone(), injector.clone()));
    let addr = orchestrator.start().await.unwrap();
    let device = DeviceDescriptor::new("host", "test-host", addr.ip(), addr.port());
    Host {
        orchestrator,
        capture,
        injector,
        device,
    }
}

fn viewer() -> Arc<ViewerClient> {
    Arc::new(ViewerClient::new(ViewerConfig {
        device_id: "viewer-1".into(),
        device_name: "Test Viewer".into(),
        transport: local_transport(),
        ..ViewerConfig::default()
    }))
}

fn pin_of(host: &Host) -> String {
    host.orchestrator.current_pin().unwrap().digits
}

/// Poll `check` until it yields a value, failing after five seconds.
async fn eventually<T>(mut check: impl FnMut() -> Option<T>) -> T {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if let Some(v) = check() {
                return v;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time")
}

async fn next_event(rx: &mut mpsc::Receiver<TransportEvent>) -> TransportEvent {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("event timeout")
        .expect("event channel closed")
}

/// Connect a bare transport to the host and wait for it to come up.
async fn raw_peer(host: &Host) -> (TransportService, mpsc::Receiver<TransportEvent>) {
    let (raw, mut events) = TransportService::new(local_transport());
    raw.connect_to(&host.device).await.unwrap();
    assert_eq!(next_event(&mut events).await, TransportEvent::ConnectionStateChanged(true));
    (raw, events)
}

/// Send a pairing request and return the host's answer.
async fn request_pairing(
    raw: &TransportService,
    events: &mut mpsc::Receiver<TransportEvent>,
    pin: &str,
) -> PairingResponse {
    raw.send_pairing_request(PairingRequest::new("raw", "raw viewer", pin))
        .await
        .unwrap();
    loop {
        if let TransportEvent::Received(Message::PairingResponse(resp)) = next_event(events).await {
            return resp;
        }
    }
}

fn wrong_pin(correct: &str) -> &'static str {
    if correct == "100000" { "100001" } else { "100000" }
}

fn gradient(id: u64, w: u32, h: u32, seed: u8) -> Frame {
    let data = (0..w * h * 4).map(|i| (i as u8).wrapping_add(seed)).collect();
    Frame::raw(id, w, h, data)
}

// ── Pairing ──────────────────────────────────────────────────────

#[tokio::test]
async fn test_pairing_creates_connected_session() {
    let host = start_host().await;
    let viewer = viewer();
    viewer.connect_to(&host.device).await.unwrap();

    let token = viewer.pair(&pin_of(&host)).await.unwrap();
    assert!(viewer.is_paired());

    let session_id: Uuid = token.parse().unwrap();
    let active = eventually(|| host.orchestrator.sessions().active_session()).await;
    assert_eq!(active.session_id, session_id);
    assert_eq!(active.status, SessionStatus::Connected);
    assert_eq!(active.participants.client_name, "Test Viewer");
    assert_eq!(host.orchestrator.active_session_id(), Some(session_id));

    viewer.disconnect().await;
    host.orchestrator.shutdown().await;
}

#[tokio::test]
async fn test_wrong_pin_is_reported_and_retry_succeeds() {
    let host = start_host().await;
    let viewer = viewer();
    viewer.connect_to(&host.device).await.unwrap();

    let correct = pin_of(&host);
    let wrong = wrong_pin(&correct);

    let err = viewer.pair(wrong).await.unwrap_err();
    assert!(matches!(err, DeskbeamError::Pairing(PairingFailure::InvalidPin)));
    assert_eq!(err.to_string(), "pairing failed: wrong code");
    assert!(!viewer.is_paired());
    assert!(!host.orchestrator.is_paired());

    viewer.pair(&correct).await.unwrap();
    assert!(viewer.is_paired());

    viewer.disconnect().await;
    host.orchestrator.shutdown().await;
}

#[tokio::test]
async fn test_pairing_times_out_against_silent_host() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let silent = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        tokio::time::sleep(Duration::from_secs(2)).await;
        drop(stream);
    });

    let viewer = ViewerClient::new(ViewerConfig {
        transport: local_transport(),
        pairing_timeout: Duration::from_millis(200),
        ..ViewerConfig::default()
    });
    let device = DeviceDescriptor::new("silent", "silent", addr.ip(), addr.port());
    viewer.connect_to(&device).await.unwrap();

    assert!(matches!(viewer.pair("123456").await, Err(DeskbeamError::Timeout(_))));
    assert!(!viewer.is_paired());

    viewer.disconnect().await;
    silent.abort();
}

#[tokio::test]
async fn test_late_verdict_is_not_taken_for_the_next_attempt() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let slow_host = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut framed = Framed::new(stream, EnvelopeCodec::new());

        let first = framed.next().await.unwrap().unwrap();
        assert!(matches!(first, Message::PairingRequest(_)));
        tokio::time::sleep(Duration::from_millis(350)).await;
        let late = PairingResponse::rejected(PairingFailure::InvalidPin);
        framed.send(Message::PairingResponse(late)).await.unwrap();

        let second = framed.next().await.unwrap().unwrap();
        assert!(matches!(second, Message::PairingRequest(_)));
        let accepted = PairingResponse::accepted("session-2");
        framed.send(Message::PairingResponse(accepted)).await.unwrap();
        tokio::time::sleep(Duration::from_secs(2)).await;
    });

    let viewer = ViewerClient::new(ViewerConfig {
        transport: local_transport(),
        pairing_timeout: Duration::from_millis(300),
        ..ViewerConfig::default()
    });
    let device = DeviceDescriptor::new("slow", "slow", addr.ip(), addr.port());
    viewer.connect_to(&device).await.unwrap();

    assert!(matches!(viewer.pair("123456").await, Err(DeskbeamError::Timeout(_))));
    let token = viewer.pair("123456").await.unwrap();
    assert_eq!(token, "session-2");
    assert!(viewer.is_paired());

    viewer.disconnect().await;
    slow_host.abort();
}

#[tokio::test]
async fn test_second_pairing_request_is_refused() {
    let host = start_host().await;
    let (raw, mut events) = raw_peer(&host).await;
    let pin = pin_of(&host);

    let first = request_pairing(&raw, &mut events, &pin).await;
    assert!(first.success);
    let session_id: Uuid = first.session_token.unwrap().parse().unwrap();

    let second = request_pairing(&raw, &mut events, &pin).await;
    assert!(!second.success);
    assert_eq!(second.failure_reason, Some(PairingFailure::HostRefused));
    assert_eq!(second.session_token, None);

    assert_eq!(host.orchestrator.active_session_id(), Some(session_id));
    assert_eq!(host.orchestrator.sessions().all_sessions().len(), 1);
    let record = host.orchestrator.sessions().get(session_id).unwrap();
    assert_eq!(record.status, SessionStatus::Connected);

    raw.shutdown().await;
    host.orchestrator.shutdown().await;
}

#[tokio::test]
async fn test_lockout_over_the_wire() {
    let host = start_host_with(OrchestratorConfig {
        pairing: PairingConfig {
            max_attempts: 3,
            ..PairingConfig::default()
        },
        ..host_config()
    })
    .await;
    let (raw, mut events) = raw_peer(&host).await;
    let correct = pin_of(&host);
    let wrong = wrong_pin(&correct);

    for _ in 0..3 {
        let resp = request_pairing(&raw, &mut events, wrong).await;
        assert_eq!(resp.failure_reason, Some(PairingFailure::InvalidPin));
    }
    assert!(host.orchestrator.pairing().is_locked_out());

    let resp = request_pairing(&raw, &mut events, &correct).await;
    assert!(!resp.success);
    assert_eq!(resp.failure_reason, Some(PairingFailure::TooManyAttempts));
    assert!(!host.orchestrator.is_paired());
    assert!(host.orchestrator.sessions().all_sessions().is_empty());

    raw.shutdown().await;
    host.orchestrator.shutdown().await;
}

#[tokio::test]
async fn test_new_peer_replaces_paired_viewer() {
    let host = start_host().await;
    let first = viewer();
    first.connect_to(&host.device).await.unwrap();

    let before = host.orchestrator.current_pin().unwrap();
    let token = first.pair(&before.digits).await.unwrap();
    let old_session: Uuid = token.parse().unwrap();

    let (second, mut events) = raw_peer(&host).await;

    let record = eventually(|| {
        host.orchestrator
            .sessions()
            .get(old_session)
            .ok()
            .filter(|r| r.status == SessionStatus::Disconnected)
    })
    .await;
    assert_eq!(record.disconnect_reason.as_deref(), Some("connection lost"));
    let after = eventually(|| {
        host.orchestrator
            .current_pin()
            .filter(|c| c.generated_at != before.generated_at)
    })
    .await;
    assert!(!host.orchestrator.is_paired());

    let resp = request_pairing(&second, &mut events, &after.digits).await;
    assert!(resp.success);
    let new_session: Uuid = resp.session_token.unwrap().parse().unwrap();
    assert_ne!(new_session, old_session);
    assert_eq!(host.orchestrator.active_session_id(), Some(new_session));
    assert_eq!(host.orchestrator.sessions().all_sessions().len(), 2);

    first.disconnect().await;
    second.shutdown().await;
    host.orchestrator.shutdown().await;
}

// ── Gating ───────────────────────────────────────────────────────

#[tokio::test]
async fn test_input_is_dropped_until_paired() {
    let host = start_host().await;
    let (raw, mut events) = TransportService::new(local_transport());
    raw.connect_to(&host.device).await.unwrap();
    assert_eq!(next_event(&mut events).await, TransportEvent::ConnectionStateChanged(true));

    raw.send_input_event(MouseEvent::move_to(1, 1).into()).await.unwrap();
    raw.send_chat_message(ChatMessage::new("c1", "viewer", "too early"))
        .await
        .unwrap();

    let mut aux = host.orchestrator.subscribe_auxiliary();

    raw.send_pairing_request(PairingRequest::new("raw", "raw viewer", pin_of(&host)))
        .await
        .unwrap();
    match next_event(&mut events).await {
        TransportEvent::Received(Message::PairingResponse(resp)) => assert!(resp.success),
        other => panic!("expected pairing response, got {other:?}"),
    }

    let key = InputEvent::from(KeyEvent::press(0x41, 0x1E, 0));
    raw.send_input_event(key.clone()).await.unwrap();
    raw.send_input_event(InputEvent::Shortcut(Shortcut::AltTab))
        .await
        .unwrap();
    let chat = ChatMessage::new("c2", "viewer", "hello");
    raw.send_chat_message(chat.clone()).await.unwrap();

    eventually(|| (!host.injector.shortcuts.lock().unwrap().is_empty()).then_some(())).await;
    assert_eq!(*host.injector.events.lock().unwrap(), vec![key]);
    assert_eq!(*host.injector.shortcuts.lock().unwrap(), vec![Shortcut::AltTab]);

    let received = tokio::time::timeout(Duration::from_secs(5), aux.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(received, Message::ChatMessage(chat));

    raw.shutdown().await;
    host.orchestrator.shutdown().await;
}

#[tokio::test]
async fn test_send_auxiliary_requires_pairing() {
    let host = start_host().await;
    let msg = Message::ChatMessage(ChatMessage::new("c1", "host", "anyone?"));
    assert!(matches!(
        host.orchestrator.send_auxiliary(msg).await,
        Err(DeskbeamError::NotPaired)
    ));
    host.orchestrator.shutdown().await;
}

// ── Streaming ────────────────────────────────────────────────────

#[tokio::test]
async fn test_frames_are_streamed_and_reassembled() {
    let host = start_host().await;
    let viewer = viewer();
    viewer.connect_to(&host.device).await.unwrap();
    viewer.pair(&pin_of(&host)).await.unwrap();

    let cancel = CancellationToken::new();
    let runner = tokio::spawn({
        let viewer = Arc::clone(&viewer);
        let cancel = cancel.clone();
        async move { viewer.run(cancel).await }
    });
    let mut frames = viewer.frame_receiver();
    let mut quality = viewer.quality_receiver();

    let first = gradient(1, 256, 256, 0);
    host.capture.push(first.clone()).await;

    // Change one pixel: the second frame travels as a delta.
    let mut second = first.clone();
    second.frame_id = 2;
    second.data[0] ^= 0xFF;
    host.capture.push(second.clone()).await;

    tokio::time::sleep(Duration::from_millis(60)).await;
    let third = gradient(3, 256, 256, 7);
    host.capture.push(third.clone()).await;

    let shown = tokio::time::timeout(Duration::from_secs(5), frames.wait_for(|f| f.frame_id == 3))
        .await
        .unwrap()
        .unwrap()
        .clone();
    assert_eq!(shown.width, 256);
    assert_eq!(shown.data, third.data);

    let stats = viewer.stats_receiver().borrow().clone();
    assert_eq!(stats.total_frames, 3);
    assert_eq!(stats.delta_frames, 1);
    assert_eq!(stats.rejected_frames, 0);

    tokio::time::timeout(Duration::from_secs(5), quality.wait_for(Option::is_some))
        .await
        .unwrap()
        .unwrap();
    eventually(|| (host.orchestrator.monitor().sample_count() >= 3).then_some(())).await;

    cancel.cancel();
    runner.await.unwrap().unwrap();
    viewer.disconnect().await;
    host.orchestrator.shutdown().await;
}

#[tokio::test]
async fn test_stalled_viewer_lowers_recommended_quality() {
    let host = start_host().await;

    // Pair over a plain socket, then never read from it again.
    let mut stream = TcpStream::connect(host.device.socket_addr()).await.unwrap();
    let request = Message::PairingRequest(PairingRequest::new("stuck", "stuck", pin_of(&host)));
    let envelope = request.to_bytes().unwrap();
    stream.write_all(&(envelope.len() as i32).to_le_bytes()).await.unwrap();
    stream.write_all(&envelope).await.unwrap();
    eventually(|| host.orchestrator.is_paired().then_some(())).await;

    // 1 MiB frames fill the socket buffers within a few frames.
    for id in 0..80u64 {
        host.capture.push(gradient(id, 512, 512, id as u8)).await;
        tokio::time::sleep(Duration::from_millis(15)).await;
    }

    let monitor = host.orchestrator.monitor();
    assert!(
        monitor.average_latency() > 100.0,
        "average latency {} ms",
        monitor.average_latency()
    );
    assert!(monitor.current_bandwidth() < 1_000_000.0);
    assert_eq!(monitor.recommended_quality(), 50);
    assert!(host.orchestrator.transport().oldest_pending_frame().is_some());
    eventually(|| (host.capture.quality.load(Ordering::SeqCst) == 50).then_some(())).await;

    drop(stream);
    host.orchestrator.shutdown().await;
}

// ── Disconnect ───────────────────────────────────────────────────

#[tokio::test]
async fn test_disconnect_closes_session_and_regenerates_pin() {
    let host = start_host().await;
    let viewer = viewer();
    viewer.connect_to(&host.device).await.unwrap();

    let before = host.orchestrator.current_pin().unwrap();
    let token = viewer.pair(&before.digits).await.unwrap();
    let session_id: Uuid = token.parse().unwrap();

    viewer.disconnect().await;

    eventually(|| (!host.orchestrator.is_paired()).then_some(())).await;
    let record = eventually(|| {
        host.orchestrator
            .sessions()
            .get(session_id)
            .ok()
            .filter(|r| r.status == SessionStatus::Disconnected)
    })
    .await;
    assert_eq!(record.disconnect_reason.as_deref(), Some("connection lost"));

    let after = eventually(|| {
        host.orchestrator
            .current_pin()
            .filter(|c| c.generated_at != before.generated_at)
    })
    .await;
    assert_eq!(after.digits.len(), 6);

    host.orchestrator.shutdown().await;
    // Already closed out by the disconnect; shutdown leaves it alone.
    let record = host.orchestrator.sessions().get(session_id).unwrap();
    assert_eq!(record.status, SessionStatus::Disconnected);
}

// ── Protocol violations ──────────────────────────────────────────

#[tokio::test]
async fn test_zero_length_prefix_drops_connection() {
    let host = start_host().await;
    let mut stream = TcpStream::connect(host.device.socket_addr()).await.unwrap();

    stream.write_all(&0i32.to_le_bytes()).await.unwrap();
    stream.write_all(&[0x01, 0x02, 0x03]).await.unwrap();

    let mut buf = [0u8; 16];
    let read = tokio::time::timeout(Duration::from_secs(5), stream.read(&mut buf))
        .await
        .expect("host did not close the connection");
    assert!(matches!(read, Ok(0) | Err(_)));
    assert!(!host.orchestrator.is_paired());
    assert!(host.orchestrator.sessions().all_sessions().is_empty());

    host.orchestrator.shutdown().await;
}

#[tokio::test]
async fn test_negative_length_prefix_drops_connection() {
    let host = start_host().await;
    let mut stream = TcpStream::connect(host.device.socket_addr()).await.unwrap();

    stream.write_all(&(-8i32).to_le_bytes()).await.unwrap();

    let mut buf = [0u8; 16];
    let read = tokio::time::timeout(Duration::from_secs(5), stream.read(&mut buf))
        .await
        .expect("host did not close the connection");
    assert!(matches!(read, Ok(0) | Err(_)));

    host.orchestrator.shutdown().await;
}
