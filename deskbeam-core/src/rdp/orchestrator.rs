//! Host-side composition root.
//!
//! Wires the transport, pairing authority, session registry, delta
//! encoder and performance monitor to the platform collaborators:
//!
//! 1. On start, a PIN is generated and the transport starts listening.
//! 2. A viewer's `PairingRequest` is validated. On success a session is
//!    created and connected, the session id goes back as the token, and
//!    only then do capture and the other collaborators start.
//! 3. Each captured frame is delta-encoded and queued without waiting. The
//!    monitor samples it once the transport reports it written; a frame
//!    refused because earlier ones are still in transit is sampled with
//!    the age of the oldest of them. Every `quality_interval` a
//!    `ConnectionQuality` report is pushed.
//! 4. When the connection drops, collaborators stop, the session is
//!    disconnected, a fresh PIN is generated and the pipeline resets.
//!
//! "Paired" is not a separate flag: it is the presence of the active
//! session slot, so it cannot disagree with the registry.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::collab::{
    AudioCapture, ClipboardWatcher, Discovery, InputInjector, Recorder, ScreenCapture,
    apply_clipboard, dispatch_input,
};
use crate::error::{DeskbeamError, PairingFailure};
use crate::message::Message;
use crate::network::device::{DEFAULT_HOST_PORT, DeviceDescriptor};
use crate::network::transport::{TransportConfig, TransportEvent, TransportService};
use crate::pairing::{PairingAuthority, PairingConfig, PairingCredential};
use crate::protocol::{PairingRequest, PairingResponse};
use crate::rdp::delta::{DEFAULT_BLOCK_SIZE, DEFAULT_THRESHOLD_PERCENT, DeltaEncoder};
use crate::rdp::performance::PerformanceMonitor;
use crate::rdp::types::Frame;
use crate::session::{DEFAULT_MAX_RECONNECT_ATTEMPTS, SessionParticipants, SessionRegistry};

const AUXILIARY_CAPACITY: usize = 64;

// ── OrchestratorConfig ───────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub host_id: String,
    pub host_name: String,
    pub listen_port: u16,
    pub transport: TransportConfig,
    pub pairing: PairingConfig,
    pub max_reconnect_attempts: u32,
    pub block_size: usize,
    pub delta_threshold_percent: f64,
    /// How often a `ConnectionQuality` report is pushed.
    pub quality_interval: Duration,
    /// Feed the recommended quality back into the capture collaborator.
    pub adaptive_quality: bool,
    /// Frames buffered between capture and the pump.
    pub frame_queue: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            host_id: Uuid::new_v4().to_string(),
            host_name: "deskbeam-host".into(),
            listen_port: DEFAULT_HOST_PORT,
            transport: TransportConfig::default(),
            pairing: PairingConfig::default(),
            max_reconnect_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            block_size: DEFAULT_BLOCK_SIZE,
            delta_threshold_percent: DEFAULT_THRESHOLD_PERCENT,
            quality_interval: Duration::from_secs(2),
            adaptive_quality: true,
            frame_queue: 4,
        }
    }
}

// ── Collaborators ────────────────────────────────────────────────

/// Platform services supplied by the embedding binary.
#[derive(Clone)]
pub struct Collaborators {
    pub capture: Arc<dyn ScreenCapture>,
    pub input: Arc<dyn InputInjector>,
    pub clipboard: Option<Arc<dyn ClipboardWatcher>>,
    pub audio: Option<Arc<dyn AudioCapture>>,
    pub recorder: Option<Arc<dyn Recorder>>,
    pub discovery: Option<Arc<dyn Discovery>>,
}

impl Collaborators {
    pub fn new(capture: Arc<dyn ScreenCapture>, input: Arc<dyn InputInjector>) -> Self {
        Self {
            capture,
            input,
            clipboard: None,
            audio: None,
            recorder: None,
            discovery: None,
        }
    }

    pub fn with_clipboard(mut self, clipboard: Arc<dyn ClipboardWatcher>) -> Self {
        self.clipboard = Some(clipboard);
        self
    }

    pub fn with_audio(mut self, audio: Arc<dyn AudioCapture>) -> Self {
        self.audio = Some(audio);
        self
    }

    pub fn with_recorder(mut self, recorder: Arc<dyn Recorder>) -> Self {
        self.recorder = Some(recorder);
        self
    }

    pub fn with_discovery(mut self, discovery: Arc<dyn Discovery>) -> Self {
        self.discovery = Some(discovery);
        self
    }
}

// ── ActiveSession ────────────────────────────────────────────────

/// The paired viewer's session and the pumps serving it.
struct ActiveSession {
    session_id: Uuid,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

// ── Inner ────────────────────────────────────────────────────────

struct Inner {
    config: OrchestratorConfig,
    transport: TransportService,
    pairing: PairingAuthority,
    sessions: SessionRegistry,
    encoder: DeltaEncoder,
    monitor: PerformanceMonitor,
    collab: Collaborators,
    active: Mutex<Option<ActiveSession>>,
    auxiliary: broadcast::Sender<Message>,
    shutdown: CancellationToken,
}

impl Inner {
    fn active(&self) -> MutexGuard<'_, Option<ActiveSession>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn active_session_id(&self) -> Option<Uuid> {
        self.active().as_ref().map(|a| a.session_id)
    }

    fn is_paired(&self) -> bool {
        self.active().is_some()
    }

    async fn handle_event(self: &Arc<Self>, event: TransportEvent) {
        match event {
            TransportEvent::ConnectionStateChanged(true) => {
                debug!("viewer connected, awaiting pairing request");
            }
            TransportEvent::ConnectionStateChanged(false) => self.on_disconnected().await,
            TransportEvent::Received(msg) => self.on_message(msg).await,
            TransportEvent::FrameDelivered { bytes, latency, .. } => {
                if self.is_paired() {
                    self.monitor.record_sample(bytes, latency.as_secs_f64() * 1000.0);
                }
            }
        }
    }

    async fn on_message(self: &Arc<Self>, msg: Message) {
        match msg {
            Message::PairingRequest(req) => self.on_pairing_request(req).await,
            msg if !self.is_paired() => {
                debug!(kind = %msg.kind(), "dropping message from unpaired peer");
            }
            Message::InputEvent(event) => {
                if let Err(e) = dispatch_input(self.collab.input.as_ref(), event).await {
                    warn!(error = %e, "input injection failed");
                }
            }
            Message::ClipboardData(data) => match &self.collab.clipboard {
                Some(watcher) => {
                    if let Err(e) = apply_clipboard(watcher.as_ref(), data).await {
                        warn!(error = %e, "clipboard update failed");
                    }
                }
                None => debug!("no clipboard watcher, dropping clipboard data"),
            },
            msg if msg.kind().is_auxiliary() => {
                let _ = self.auxiliary.send(msg);
            }
            other => debug!(kind = %other.kind(), "ignoring message not meant for the host"),
        }
    }

    async fn on_pairing_request(self: &Arc<Self>, req: PairingRequest) {
        info!(client = %req.client_device_name, id = %req.client_device_id, "pairing request");

        if self.is_paired() {
            self.respond(PairingResponse::rejected(PairingFailure::HostRefused))
                .await;
            return;
        }

        if let Err(reason) = self.pairing.validate(&req.pin).into_result() {
            self.respond(PairingResponse::rejected(reason)).await;
            return;
        }

        let record = self.sessions.create(SessionParticipants {
            host_id: self.config.host_id.clone(),
            host_name: self.config.host_name.clone(),
            client_id: req.client_device_id,
            client_name: req.client_device_name,
        });
        let session_id = record.session_id;
        if let Err(e) = self.sessions.connect(session_id) {
            error!(session = %session_id, error = %e, "could not connect new session");
            self.respond(PairingResponse::rejected(PairingFailure::HostRefused))
                .await;
            return;
        }

        self.encoder.reset();
        self.monitor.reset();
        self.respond(PairingResponse::accepted(session_id.to_string()))
            .await;
        self.start_streaming(session_id).await;
    }

    async fn respond(&self, resp: PairingResponse) {
        if let Err(e) = self.transport.send_pairing_response(resp).await {
            warn!(error = %e, "could not send pairing response");
        }
    }

    /// Mark the session active, then start collaborators and pumps.
    async fn start_streaming(self: &Arc<Self>, session_id: Uuid) {
        let cancel = self.shutdown.child_token();
        *self.active() = Some(ActiveSession {
            session_id,
            cancel: cancel.clone(),
            tasks: Vec::new(),
        });
        info!(session = %session_id, "viewer paired, streaming started");

        let mut tasks = Vec::new();

        if let Some(recorder) = &self.collab.recorder {
            if let Err(e) = recorder.start_recording(&session_id.to_string()).await {
                warn!(error = %e, "recorder failed to start");
            }
        }

        if let Err(e) = self.collab.input.start().await {
            warn!(error = %e, "input injector failed to start");
        }

        let (frame_tx, frame_rx) = mpsc::channel(self.config.frame_queue.max(1));
        tasks.push(tokio::spawn(frame_pump(
            Arc::clone(self),
            frame_rx,
            cancel.clone(),
        )));
        if let Err(e) = self.collab.capture.start(frame_tx).await {
            error!(error = %e, "screen capture failed to start");
        }

        if let Some(watcher) = &self.collab.clipboard {
            let (tx, rx) = mpsc::channel(8);
            tasks.push(tokio::spawn(clipboard_pump(Arc::clone(self), rx, cancel.clone())));
            if let Err(e) = watcher.start(tx).await {
                warn!(error = %e, "clipboard watcher failed to start");
            }
        }

        if let Some(audio) = &self.collab.audio {
            let (tx, rx) = mpsc::channel(32);
            tasks.push(tokio::spawn(audio_pump(Arc::clone(self), rx, cancel.clone())));
            if let Err(e) = audio.start(tx).await {
                warn!(error = %e, "audio capture failed to start");
            }
        }

        match self.active().as_mut() {
            Some(active) if active.session_id == session_id => active.tasks = tasks,
            // Torn down while starting; nothing else will await these.
            _ => tasks.into_iter().for_each(|t| t.abort()),
        }
    }

    /// Stop collaborators and pumps for the active session, if any.
    ///
    /// Collaborator failures are logged and swallowed so teardown always
    /// completes. Returns the session that was active.
    async fn stop_streaming(&self) -> Option<Uuid> {
        let active = self.active().take()?;
        active.cancel.cancel();

        if let Err(e) = self.collab.capture.stop().await {
            debug!(error = %e, "screen capture stop failed");
        }
        if let Err(e) = self.collab.input.stop().await {
            debug!(error = %e, "input injector stop failed");
        }
        if let Some(watcher) = &self.collab.clipboard {
            if let Err(e) = watcher.stop().await {
                debug!(error = %e, "clipboard watcher stop failed");
            }
        }
        if let Some(audio) = &self.collab.audio {
            if let Err(e) = audio.stop().await {
                debug!(error = %e, "audio capture stop failed");
            }
        }
        if let Some(recorder) = &self.collab.recorder {
            if let Err(e) = recorder.stop_recording().await {
                debug!(error = %e, "recorder stop failed");
            }
        }

        let grace = self.config.transport.shutdown_grace;
        for task in active.tasks {
            let abort = task.abort_handle();
            if tokio::time::timeout(grace, task).await.is_err() {
                abort.abort();
            }
        }

        Some(active.session_id)
    }

    async fn on_disconnected(&self) {
        if let Some(session_id) = self.stop_streaming().await {
            if let Err(e) = self
                .sessions
                .disconnect(session_id, Some("connection lost".into()))
            {
                warn!(session = %session_id, error = %e, "could not close out session");
            }
            info!(session = %session_id, "viewer disconnected");
        }

        self.encoder.reset();
        self.monitor.reset();
        self.pairing.generate();
    }

    /// Encode, sample and queue one captured frame.
    async fn process_frame(&self, frame: Frame, last_quality_push: &mut Instant) {
        if !self.is_paired() || !self.transport.is_connected() {
            return;
        }

        if let Some(recorder) = &self.collab.recorder {
            if let Err(e) = recorder.write_frame(&frame).await {
                debug!(error = %e, "recorder dropped a frame");
            }
        }

        let encoded = self.encoder.encode(frame);
        let frame_id = encoded.frame_id;

        if let Err(e) = self.transport.send_screen_data(encoded) {
            // The viewer never sees this frame, so later deltas cannot
            // reference it.
            self.encoder.reset();
            match e {
                DeskbeamError::QueueFull => {
                    let stalled = self.transport.oldest_pending_frame().unwrap_or_default();
                    self.monitor.record_sample(0, stalled.as_secs_f64() * 1000.0);
                    debug!(frame_id, ?stalled, "link behind, frame dropped");
                }
                e => warn!(frame_id, error = %e, "frame send failed"),
            }
        }

        if last_quality_push.elapsed() >= self.config.quality_interval {
            *last_quality_push = Instant::now();
            self.push_quality();
        }
    }

    fn push_quality(&self) {
        let report = self.monitor.connection_quality();
        if self.config.adaptive_quality {
            self.collab.capture.set_quality(report.quality);
        }
        debug!(
            quality = report.quality,
            fps = report.fps,
            bandwidth = report.bandwidth,
            rating = %report.rating,
            "connection quality"
        );
        if let Err(e) = self.transport.try_send(Message::ConnectionQuality(report)) {
            debug!(error = %e, "quality report dropped");
        }
    }
}

async fn event_loop(
    inner: Arc<Inner>,
    mut events: mpsc::Receiver<TransportEvent>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            event = events.recv() => match event {
                Some(event) => inner.handle_event(event).await,
                None => break,
            }
        }
    }
    debug!("orchestrator event loop stopped");
}

async fn frame_pump(inner: Arc<Inner>, mut frames: mpsc::Receiver<Frame>, cancel: CancellationToken) {
    let mut last_quality_push = Instant::now();
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            frame = frames.recv() => match frame {
                Some(frame) => inner.process_frame(frame, &mut last_quality_push).await,
                None => break,
            }
        }
    }
}

async fn clipboard_pump(
    inner: Arc<Inner>,
    mut changes: mpsc::Receiver<crate::protocol::ClipboardData>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            change = changes.recv() => match change {
                Some(data) if inner.is_paired() => {
                    if let Err(e) = inner.transport.send_clipboard_data(data).await {
                        debug!(error = %e, "clipboard relay failed");
                    }
                }
                Some(_) => {}
                None => break,
            }
        }
    }
}

async fn audio_pump(
    inner: Arc<Inner>,
    mut chunks: mpsc::Receiver<crate::protocol::AudioData>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            chunk = chunks.recv() => match chunk {
                Some(audio) if inner.is_paired() => {
                    if let Some(recorder) = &inner.collab.recorder {
                        if let Err(e) = recorder.write_audio(&audio).await {
                            debug!(error = %e, "recorder dropped audio");
                        }
                    }
                    if let Err(e) = inner.transport.send_audio_data(audio) {
                        debug!(error = %e, "audio chunk dropped");
                    }
                }
                Some(_) => {}
                None => break,
            }
        }
    }
}

// ── SessionOrchestrator ──────────────────────────────────────────

/// Host service lifecycle handle.
pub struct SessionOrchestrator {
    inner: Arc<Inner>,
    events: Mutex<Option<mpsc::Receiver<TransportEvent>>>,
    event_task: Mutex<Option<JoinHandle<()>>>,
}

impl SessionOrchestrator {
    pub fn new(config: OrchestratorConfig, collab: Collaborators) -> Self {
        let (transport, events) = TransportService::new(config.transport.clone());
        let (auxiliary, _) = broadcast::channel(AUXILIARY_CAPACITY);
        let inner = Arc::new(Inner {
            pairing: PairingAuthority::new(config.pairing),
            sessions: SessionRegistry::with_max_reconnect_attempts(config.max_reconnect_attempts),
            encoder: DeltaEncoder::with_config(config.block_size, config.delta_threshold_percent),
            monitor: PerformanceMonitor::new(),
            transport,
            collab,
            active: Mutex::new(None),
            auxiliary,
            shutdown: CancellationToken::new(),
            config,
        });
        Self {
            inner,
            events: Mutex::new(Some(events)),
            event_task: Mutex::new(None),
        }
    }

    /// Generate a PIN, start listening and process events in the background.
    ///
    /// Returns the bound address.
    pub async fn start(&self) -> Result<SocketAddr, DeskbeamError> {
        let events = lock(&self.events)
            .take()
            .ok_or_else(|| DeskbeamError::Other("orchestrator already started".into()))?;

        self.inner.pairing.generate();
        let addr = self.inner.transport.listen(self.inner.config.listen_port).await?;

        if let Some(discovery) = &self.inner.collab.discovery {
            let local = DeviceDescriptor::new(
                self.inner.config.host_id.clone(),
                self.inner.config.host_name.clone(),
                addr.ip(),
                addr.port(),
            );
            if let Err(e) = discovery.start_broadcasting(local).await {
                warn!(error = %e, "discovery broadcast failed to start");
            }
        }

        let task = tokio::spawn(event_loop(
            Arc::clone(&self.inner),
            events,
            self.inner.shutdown.child_token(),
        ));
        *lock(&self.event_task) = Some(task);

        info!(%addr, host = %self.inner.config.host_name, "host service started");
        Ok(addr)
    }

    /// Stop everything; the active session is ended.
    pub async fn shutdown(&self) {
        self.inner.shutdown.cancel();
        let task = lock(&self.event_task).take();
        if let Some(task) = task {
            let _ = task.await;
        }

        if let Some(session_id) = self.inner.stop_streaming().await {
            if let Err(e) = self.inner.sessions.end(session_id) {
                warn!(session = %session_id, error = %e, "could not end session");
            }
        }
        if let Some(discovery) = &self.inner.collab.discovery {
            if let Err(e) = discovery.stop().await {
                debug!(error = %e, "discovery stop failed");
            }
        }
        self.inner.transport.shutdown().await;
        info!("host service stopped");
    }

    /// Send a file, chat or print message to the paired viewer.
    pub async fn send_auxiliary(&self, msg: Message) -> Result<(), DeskbeamError> {
        if !msg.kind().is_auxiliary() {
            return Err(DeskbeamError::Other(format!(
                "{} is not an auxiliary message",
                msg.kind()
            )));
        }
        if !self.inner.is_paired() {
            return Err(DeskbeamError::NotPaired);
        }
        self.inner.transport.send(msg).await
    }

    /// File, chat and print messages received from the paired viewer.
    pub fn subscribe_auxiliary(&self) -> broadcast::Receiver<Message> {
        self.inner.auxiliary.subscribe()
    }

    pub fn is_paired(&self) -> bool {
        self.inner.is_paired()
    }

    pub fn active_session_id(&self) -> Option<Uuid> {
        self.inner.active_session_id()
    }

    /// The PIN the shell should display.
    pub fn current_pin(&self) -> Option<PairingCredential> {
        self.inner.pairing.current()
    }

    pub fn pairing(&self) -> &PairingAuthority {
        &self.inner.pairing
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.inner.sessions
    }

    pub fn monitor(&self) -> &PerformanceMonitor {
        &self.inner.monitor
    }

    pub fn transport(&self) -> &TransportService {
        &self.inner.transport
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.inner.config
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}
