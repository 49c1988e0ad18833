//! Viewer-side client.
//!
//! Dials a host, pairs with the PIN the host displays, then receives
//! frames and reassembles them through a [`FrameAssembler`]. The latest
//! image and statistics are published on `tokio::sync::watch` channels so
//! a renderer can read them without blocking the receive loop.
//!
//! Input, clipboard and auxiliary sends are refused until pairing succeeds.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::{Duration, Instant};

use tokio::sync::{Mutex, broadcast, mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::DeskbeamError;
use crate::message::Message;
use crate::network::device::DeviceDescriptor;
use crate::network::transport::{TransportConfig, TransportEvent, TransportService};
use crate::protocol::{ClipboardData, ConnectionQuality, InputEvent, PairingRequest};
use crate::rdp::assembler::FrameAssembler;
use crate::rdp::types::{Frame, FrameEncoding};

/// Default bound on the pairing round trip.
pub const DEFAULT_PAIRING_TIMEOUT: Duration = Duration::from_secs(10);

const INBOUND_CAPACITY: usize = 64;
const FPS_WINDOW: usize = 60;

// ── ViewerConfig ─────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ViewerConfig {
    pub device_id: String,
    pub device_name: String,
    pub transport: TransportConfig,
    pub pairing_timeout: Duration,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            device_id: uuid::Uuid::new_v4().to_string(),
            device_name: "deskbeam-viewer".into(),
            transport: TransportConfig::default(),
            pairing_timeout: DEFAULT_PAIRING_TIMEOUT,
        }
    }
}

// ── DisplayFrame / FrameStats ────────────────────────────────────

/// The assembled screen image handed to the renderer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DisplayFrame {
    pub frame_id: u64,
    pub width: u32,
    pub height: u32,
    pub encoding: FrameEncoding,
    pub data: Vec<u8>,
}

/// Per-frame statistics exposed to the UI.
#[derive(Debug, Clone, Default)]
pub struct FrameStats {
    /// Smoothed frames per second.
    pub fps: f64,
    pub total_frames: u64,
    pub delta_frames: u64,
    /// Frames the assembler could not apply.
    pub rejected_frames: u64,
    /// Payload bytes received.
    pub total_bytes: u64,
    pub width: u32,
    pub height: u32,
}

// ── ViewerClient ─────────────────────────────────────────────────

pub struct ViewerClient {
    config: ViewerConfig,
    transport: TransportService,
    events: Mutex<mpsc::Receiver<TransportEvent>>,
    paired: AtomicBool,
    /// Pairing requests that timed out; their verdicts may still arrive.
    unanswered: AtomicU32,
    frame_tx: watch::Sender<DisplayFrame>,
    stats_tx: watch::Sender<FrameStats>,
    quality_tx: watch::Sender<Option<ConnectionQuality>>,
    inbound: broadcast::Sender<Message>,
}

impl ViewerClient {
    pub fn new(config: ViewerConfig) -> Self {
        let (transport, events) = TransportService::new(config.transport.clone());
        let (frame_tx, _) = watch::channel(DisplayFrame::default());
        let (stats_tx, _) = watch::channel(FrameStats::default());
        let (quality_tx, _) = watch::channel(None);
        let (inbound, _) = broadcast::channel(INBOUND_CAPACITY);
        Self {
            config,
            transport,
            events: Mutex::new(events),
            paired: AtomicBool::new(false),
            unanswered: AtomicU32::new(0),
            frame_tx,
            stats_tx,
            quality_tx,
            inbound,
        }
    }

    /// Latest assembled image.
    pub fn frame_receiver(&self) -> watch::Receiver<DisplayFrame> {
        self.frame_tx.subscribe()
    }

    pub fn stats_receiver(&self) -> watch::Receiver<FrameStats> {
        self.stats_tx.subscribe()
    }

    /// Latest `ConnectionQuality` report from the host.
    pub fn quality_receiver(&self) -> watch::Receiver<Option<ConnectionQuality>> {
        self.quality_tx.subscribe()
    }

    /// Clipboard, audio, file, chat and print messages from the host.
    pub fn subscribe_inbound(&self) -> broadcast::Receiver<Message> {
        self.inbound.subscribe()
    }

    pub fn is_paired(&self) -> bool {
        self.paired.load(Ordering::SeqCst)
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    pub async fn connect_to(&self, host: &DeviceDescriptor) -> Result<(), DeskbeamError> {
        info!(%host, "connecting");
        self.unanswered.store(0, Ordering::SeqCst);
        self.transport.connect_to(host).await
    }

    /// Present `pin` to the host and wait for its verdict.
    ///
    /// Returns the session token. No answer within the pairing timeout is
    /// reported as [`DeskbeamError::Timeout`] and counts as a failed pairing.
    /// The host answers requests in order, so a verdict that turns up after
    /// its request timed out is skipped by the next call.
    pub async fn pair(&self, pin: &str) -> Result<String, DeskbeamError> {
        let request = PairingRequest::new(&self.config.device_id, &self.config.device_name, pin);
        self.transport.send_pairing_request(request).await?;

        let timeout = self.config.pairing_timeout;
        let mut events = self.events.lock().await;
        let verdict = tokio::time::timeout(timeout, async {
            loop {
                match events.recv().await {
                    Some(TransportEvent::Received(Message::PairingResponse(resp))) => {
                        if self.take_unanswered() {
                            debug!(success = resp.success, "discarding late pairing response");
                            continue;
                        }
                        return resp.into_result().map_err(DeskbeamError::from);
                    }
                    Some(TransportEvent::ConnectionStateChanged(false)) | None => {
                        self.unanswered.store(0, Ordering::SeqCst);
                        return Err(DeskbeamError::NotConnected);
                    }
                    Some(other) => debug!(?other, "ignoring event while pairing"),
                }
            }
        })
        .await
        .map_err(|_| {
            self.unanswered.fetch_add(1, Ordering::SeqCst);
            DeskbeamError::Timeout(timeout)
        })?;

        match &verdict {
            Ok(_) => {
                self.paired.store(true, Ordering::SeqCst);
                info!("paired with host");
            }
            Err(e) => warn!(error = %e, "pairing failed"),
        }
        verdict
    }

    /// Receive and assemble frames until the connection drops or `cancel` fires.
    pub async fn run(&self, cancel: CancellationToken) -> Result<(), DeskbeamError> {
        let mut events = self.events.lock().await;
        let mut assembler = FrameAssembler::new();
        let mut stats = FrameStats::default();
        let mut intervals: VecDeque<Duration> = VecDeque::with_capacity(FPS_WINDOW);
        let mut last_frame = Instant::now();

        loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => break,
                event = events.recv() => event,
            };

            match event {
                Some(TransportEvent::Received(Message::ScreenData(frame))) => {
                    let now = Instant::now();
                    if intervals.len() == FPS_WINDOW {
                        intervals.pop_front();
                    }
                    intervals.push_back(now.duration_since(last_frame));
                    last_frame = now;

                    let shown = Self::on_frame(&mut assembler, &mut stats, frame);
                    stats.fps = smoothed_fps(&intervals);
                    self.stats_tx.send_replace(stats.clone());
                    if let Some(shown) = shown {
                        self.frame_tx.send_replace(shown);
                    }
                }
                Some(TransportEvent::Received(Message::ConnectionQuality(q))) => {
                    self.quality_tx.send_replace(Some(q));
                }
                Some(TransportEvent::Received(msg)) => {
                    let kind = msg.kind();
                    if kind.is_auxiliary()
                        || matches!(msg, Message::ClipboardData(_) | Message::AudioData(_))
                    {
                        let _ = self.inbound.send(msg);
                    } else {
                        debug!(%kind, "ignoring message not meant for the viewer");
                    }
                }
                Some(TransportEvent::ConnectionStateChanged(true))
                | Some(TransportEvent::FrameDelivered { .. }) => {}
                Some(TransportEvent::ConnectionStateChanged(false)) | None => {
                    info!("disconnected from host");
                    break;
                }
            }
        }

        self.paired.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn on_frame(
        assembler: &mut FrameAssembler,
        stats: &mut FrameStats,
        frame: Frame,
    ) -> Option<DisplayFrame> {
        stats.total_frames += 1;
        stats.total_bytes += frame.data.len() as u64;
        if frame.is_delta {
            stats.delta_frames += 1;
        }

        match assembler.apply(&frame) {
            Ok(buffer) => {
                let data = buffer.to_vec();
                let (width, height) = assembler.dimensions();
                stats.width = width;
                stats.height = height;
                Some(DisplayFrame {
                    frame_id: frame.frame_id,
                    width,
                    height,
                    encoding: assembler.encoding(),
                    data,
                })
            }
            Err(e) => {
                stats.rejected_frames += 1;
                warn!(frame_id = frame.frame_id, error = %e, "frame rejected");
                None
            }
        }
    }

    pub async fn send_input(&self, event: InputEvent) -> Result<(), DeskbeamError> {
        self.ensure_paired()?;
        self.transport.send_input_event(event).await
    }

    pub async fn send_clipboard(&self, data: ClipboardData) -> Result<(), DeskbeamError> {
        self.ensure_paired()?;
        self.transport.send_clipboard_data(data).await
    }

    /// Send a file, chat or print message to the host.
    pub async fn send_auxiliary(&self, msg: Message) -> Result<(), DeskbeamError> {
        if !msg.kind().is_auxiliary() {
            return Err(DeskbeamError::Other(format!(
                "{} is not an auxiliary message",
                msg.kind()
            )));
        }
        self.ensure_paired()?;
        self.transport.send(msg).await
    }

    pub async fn disconnect(&self) {
        self.paired.store(false, Ordering::SeqCst);
        self.transport.shutdown().await;
    }

    /// Consume one outstanding timed-out request, if any.
    fn take_unanswered(&self) -> bool {
        self.unanswered
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn ensure_paired(&self) -> Result<(), DeskbeamError> {
        if self.is_paired() {
            Ok(())
        } else {
            Err(DeskbeamError::NotPaired)
        }
    }
}

fn smoothed_fps(intervals: &VecDeque<Duration>) -> f64 {
    if intervals.is_empty() {
        return 0.0;
    }
    let avg = intervals.iter().map(Duration::as_secs_f64).sum::<f64>() / intervals.len() as f64;
    if avg > 0.0 { 1.0 / avg } else { 0.0 }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sends_are_refused_before_pairing() {
        let client = ViewerClient::new(ViewerConfig::default());
        let input = InputEvent::from(crate::protocol::MouseEvent::move_to(1, 1));
        assert!(matches!(client.send_input(input).await, Err(DeskbeamError::NotPaired)));
        assert!(matches!(
            client.send_clipboard(ClipboardData::Text("x".into())).await,
            Err(DeskbeamError::NotPaired)
        ));
    }

    #[test]
    fn fps_from_intervals() {
        let mut intervals = VecDeque::new();
        assert_eq!(smoothed_fps(&intervals), 0.0);
        intervals.extend([Duration::from_millis(50); 4]);
        assert!((smoothed_fps(&intervals) - 20.0).abs() < 1e-9);
    }
}
