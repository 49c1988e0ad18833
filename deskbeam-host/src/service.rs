//! Host service core logic.
//!
//! Wires the headless collaborators into a [`SessionOrchestrator`], starts
//! it, and reports pairing codes, session changes and auxiliary traffic to
//! the log until asked to stop.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use deskbeam_core::collab::{ClipboardWatcher, ScreenCapture};
use deskbeam_core::protocol::ClipboardData;
use deskbeam_core::{
    Collaborators, DeskbeamError, Message, PairingEvent, PairingOutcome, SessionEvent,
    SessionOrchestrator, UdpDiscovery,
};

use crate::config::HostConfig;
use crate::headless::{LoggingInjector, MemoryClipboard, SilentAudio, TestPatternCapture};

// ── HostService ──────────────────────────────────────────────────

/// The top-level host service.
pub struct HostService {
    orchestrator: SessionOrchestrator,
    capture: Arc<TestPatternCapture>,
    clipboard: Arc<MemoryClipboard>,
}

impl HostService {
    /// Build the orchestrator and its collaborators from `config`.
    pub fn new(config: &HostConfig) -> Self {
        let (width, height) = config.screen_size();
        let capture = Arc::new(TestPatternCapture::new(width, height, config.frame_interval()));
        let clipboard = Arc::new(MemoryClipboard::new());

        let mut collab = Collaborators::new(
            Arc::clone(&capture) as Arc<dyn ScreenCapture>,
            Arc::new(LoggingInjector::new()),
        )
        .with_clipboard(Arc::clone(&clipboard) as Arc<dyn ClipboardWatcher>)
        .with_audio(Arc::new(SilentAudio::new(config.audio_settings())));
        if let Some(discovery) = config.discovery_config() {
            collab = collab.with_discovery(Arc::new(UdpDiscovery::new(discovery)));
        }

        Self {
            orchestrator: SessionOrchestrator::new(config.to_orchestrator_config(), collab),
            capture,
            clipboard,
        }
    }

    pub fn orchestrator(&self) -> &SessionOrchestrator {
        &self.orchestrator
    }

    pub fn capture(&self) -> &TestPatternCapture {
        &self.capture
    }

    /// Last clipboard contents received from the viewer.
    pub fn clipboard(&self) -> Option<ClipboardData> {
        self.clipboard.contents()
    }

    /// Start listening. Returns the bound address.
    pub async fn start(&self) -> Result<SocketAddr, DeskbeamError> {
        let addr = self.orchestrator.start().await?;
        if let Some(pin) = self.orchestrator.current_pin() {
            info!("pairing code: {} (valid for {:?})", pin.digits, pin.ttl);
        }
        Ok(addr)
    }

    /// Log service events until `stop` fires, then shut the orchestrator down.
    pub async fn run(&self, stop: CancellationToken) {
        let mut pairing = self.orchestrator.pairing().subscribe();
        let mut sessions = self.orchestrator.sessions().subscribe();
        let mut auxiliary = self.orchestrator.subscribe_auxiliary();

        loop {
            tokio::select! {
                _ = stop.cancelled() => break,
                event = pairing.recv() => match event {
                    Ok(event) => log_pairing(&event),
                    Err(broadcast::error::RecvError::Lagged(n)) => warn!(n, "pairing events dropped"),
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                event = sessions.recv() => match event {
                    Ok(event) => log_session(&event),
                    Err(broadcast::error::RecvError::Lagged(n)) => warn!(n, "session events dropped"),
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                msg = auxiliary.recv() => match msg {
                    Ok(msg) => log_auxiliary(&msg),
                    Err(broadcast::error::RecvError::Lagged(n)) => warn!(n, "auxiliary messages dropped"),
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            }
        }

        self.orchestrator.shutdown().await;
    }
}

fn log_pairing(event: &PairingEvent) {
    match event {
        PairingEvent::CredentialGenerated(pin) => {
            info!("pairing code: {} (valid for {:?})", pin.digits, pin.ttl);
        }
        PairingEvent::AttemptCompleted(PairingOutcome::Accepted) => info!("viewer paired"),
        PairingEvent::AttemptCompleted(PairingOutcome::Rejected(reason)) => {
            warn!(%reason, "pairing attempt rejected");
        }
    }
}

fn log_session(event: &SessionEvent) {
    match event {
        SessionEvent::Created(id) => info!(session = %id, "session created"),
        SessionEvent::StatusChanged { session, from, to } => {
            info!(%session, %from, %to, "session status changed");
        }
        SessionEvent::ReconnectFailed(id) => warn!(session = %id, "reconnect budget exhausted"),
    }
}

fn log_auxiliary(msg: &Message) {
    match msg {
        Message::ChatMessage(chat) => info!(from = %chat.sender_name, "chat: {}", chat.text),
        other => info!(kind = %other.kind(), "auxiliary message from viewer"),
    }
}

// ── Tests ────────────────────────────────────────────────────────
