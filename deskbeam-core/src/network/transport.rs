//! Single-connection TCP transport.
//!
//! The host side [`listen`](TransportService::listen)s and keeps at most one
//! active peer: accepting a new stream fully tears down the previous one
//! (loops cancelled and awaited) before the new one is installed. The
//! viewer side [`connect_to`](TransportService::connect_to)s a host.
//!
//! Each connection runs two tasks:
//!
//! ```text
//!  send()/try_send() ──► [bounded queue] ──► writer task ──► socket
//!  socket ──► reader task ──► TransportEvent::Received ──► owner
//! ```
//!
//! Whichever task stops first cancels the other. The owner sees
//! `ConnectionStateChanged(false)` exactly once per connection.
//!
//! Frames share the queue but are limited to `frame_budget` queued or in
//! the middle of being written. Once a frame reaches the socket the owner
//! gets a `FrameDelivered` event carrying the time it spent in transit, so
//! a link that stops draining shows up as latency rather than as a growing
//! backlog.

use std::collections::VecDeque;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::codec::EnvelopeCodec;
use crate::error::DeskbeamError;
use crate::message::Message;
use crate::network::device::DeviceDescriptor;
use crate::protocol::{
    AudioData, ChatMessage, ClipboardData, ConnectionQuality, FileTransferChunk,
    FileTransferComplete, FileTransferRequest, FileTransferResponse, InputEvent, MessageRead,
    PairingRequest, PairingResponse, PrintJob, PrintJobResponse, PrintJobStatus,
};
use crate::rdp::types::Frame;

/// Default number of frames between `send_screen_data` and the socket.
pub const DEFAULT_FRAME_BUDGET: usize = 2;

// ── TransportConfig ──────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Address `listen` binds to.
    pub bind_address: IpAddr,
    /// Outbound queue depth per connection.
    pub queue_capacity: usize,
    /// Frames allowed queued or being written at once; more are refused
    /// with `QueueFull`.
    pub frame_budget: usize,
    /// Depth of the event channel handed to the owner.
    pub event_capacity: usize,
    /// Deadline for `connect_to`.
    pub connect_timeout: Duration,
    /// How long teardown waits for loops before aborting them.
    pub shutdown_grace: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            queue_capacity: 256,
            frame_budget: DEFAULT_FRAME_BUDGET,
            event_capacity: 1024,
            connect_timeout: Duration::from_secs(5),
            shutdown_grace: Duration::from_secs(2),
        }
    }
}

// ── TransportEvent ───────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// `true` when a connection is installed, `false` once it is gone.
    ConnectionStateChanged(bool),
    /// A decoded message from the peer.
    Received(Message),
    /// A frame was fully written to the socket `latency` after it was queued.
    FrameDelivered {
        frame_id: u64,
        bytes: u64,
        latency: Duration,
    },
}

// ── Connection ───────────────────────────────────────────────────

/// Queue times of frames accepted but not yet written, oldest first.
#[derive(Default)]
struct FramesInFlight {
    queued: Mutex<VecDeque<Instant>>,
}

impl FramesInFlight {
    fn lock(&self) -> MutexGuard<'_, VecDeque<Instant>> {
        self.queued.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The oldest frame reached the socket; returns its transit time.
    fn written(&self) -> Option<Duration> {
        self.lock().pop_front().map(|queued| queued.elapsed())
    }

    fn oldest_age(&self) -> Option<Duration> {
        self.lock().front().map(Instant::elapsed)
    }
}

/// The live peer connection.
struct Connection {
    peer: SocketAddr,
    outbound: mpsc::Sender<Message>,
    frames: Arc<FramesInFlight>,
    cancel: CancellationToken,
    closed: Arc<AtomicBool>,
    tasks: Vec<JoinHandle<()>>,
}

impl Connection {
    fn is_open(&self) -> bool {
        !self.closed.load(Ordering::SeqCst)
    }
}

/// Emit `ConnectionStateChanged(false)` unless already emitted.
async fn mark_closed(closed: &AtomicBool, events: &mpsc::Sender<TransportEvent>) {
    if closed
        .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
        .is_ok()
    {
        let _ = events.send(TransportEvent::ConnectionStateChanged(false)).await;
    }
}

async fn read_loop<R>(
    mut reader: FramedRead<R, EnvelopeCodec>,
    events: mpsc::Sender<TransportEvent>,
    cancel: CancellationToken,
    closed: Arc<AtomicBool>,
    peer: SocketAddr,
) where
    R: AsyncRead + Unpin,
{
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            next = reader.next() => match next {
                Some(Ok(msg)) => {
                    tokio::select! {
                        sent = events.send(TransportEvent::Received(msg)) => {
                            if sent.is_err() {
                                break;
                            }
                        }
                        _ = cancel.cancelled() => break,
                    }
                }
                Some(Err(e)) => {
                    warn!(%peer, error = %e, "receive failed, dropping connection");
                    break;
                }
                None => {
                    debug!(%peer, "peer closed the connection");
                    break;
                }
            }
        }
    }
    cancel.cancel();
    mark_closed(&closed, &events).await;
}

async fn write_loop<W>(
    mut writer: FramedWrite<W, EnvelopeCodec>,
    mut outbound: mpsc::Receiver<Message>,
    frames: Arc<FramesInFlight>,
    events: mpsc::Sender<TransportEvent>,
    cancel: CancellationToken,
    closed: Arc<AtomicBool>,
    peer: SocketAddr,
) where
    W: AsyncWrite + Unpin,
{
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            msg = outbound.recv() => {
                let Some(msg) = msg else { break };
                let kind = msg.kind();
                let frame = match &msg {
                    Message::ScreenData(f) => Some((f.frame_id, f.data.len() as u64)),
                    _ => None,
                };
                tokio::select! {
                    sent = writer.send(msg) => {
                        if let Err(e) = sent {
                            warn!(%peer, %kind, error = %e, "send failed, dropping connection");
                            break;
                        }
                    }
                    _ = cancel.cancelled() => break,
                }
                if let Some((frame_id, bytes)) = frame {
                    if let Some(latency) = frames.written() {
                        let delivered = TransportEvent::FrameDelivered { frame_id, bytes, latency };
                        if events.try_send(delivered).is_err() {
                            debug!(%peer, frame_id, "delivery report dropped");
                        }
                    }
                }
            }
        }
    }
    cancel.cancel();
    let _ = writer.close().await;
    mark_closed(&closed, &events).await;
}

// ── TransportService ─────────────────────────────────────────────

struct Shared {
    config: TransportConfig,
    events: mpsc::Sender<TransportEvent>,
    active: Mutex<Option<Connection>>,
    /// Serializes connection replacement.
    install: tokio::sync::Mutex<()>,
}

impl Shared {
    fn active(&self) -> MutexGuard<'_, Option<Connection>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace the active connection with one over `reader`/`writer`.
    async fn install<R, W>(&self, reader: R, writer: W, peer: SocketAddr)
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let _guard = self.install.lock().await;

        let previous = self.active().take();
        if let Some(old) = previous {
            info!(old = %old.peer, new = %peer, "replacing active connection");
            self.teardown(old).await;
        }

        // Announce before the reader can deliver anything from the new peer.
        info!(%peer, "connection established");
        let _ = self
            .events
            .send(TransportEvent::ConnectionStateChanged(true))
            .await;

        let (outbound, queue) = mpsc::channel(self.config.queue_capacity);
        let frames = Arc::new(FramesInFlight::default());
        let cancel = CancellationToken::new();
        let closed = Arc::new(AtomicBool::new(false));

        // Hold the slot while spawning so a send triggered by the first
        // received message already finds this connection.
        let mut active = self.active();
        let reader_task = tokio::spawn(read_loop(
            FramedRead::new(reader, EnvelopeCodec::new()),
            self.events.clone(),
            cancel.clone(),
            Arc::clone(&closed),
            peer,
        ));
        let writer_task = tokio::spawn(write_loop(
            FramedWrite::new(writer, EnvelopeCodec::new()),
            queue,
            Arc::clone(&frames),
            self.events.clone(),
            cancel.clone(),
            Arc::clone(&closed),
            peer,
        ));

        *active = Some(Connection {
            peer,
            outbound,
            frames,
            cancel,
            closed,
            tasks: vec![reader_task, writer_task],
        });
    }

    /// Cancel both loops, wait for them within the grace period, then
    /// make sure the closed event went out.
    async fn teardown(&self, conn: Connection) {
        conn.cancel.cancel();
        for task in conn.tasks {
            let abort = task.abort_handle();
            if tokio::time::timeout(self.config.shutdown_grace, task)
                .await
                .is_err()
            {
                warn!(peer = %conn.peer, "connection task did not stop in time, aborting");
                abort.abort();
            }
        }
        mark_closed(&conn.closed, &self.events).await;
        debug!(peer = %conn.peer, "connection torn down");
    }
}

/// Owner-facing handle to the transport.
///
/// Cheap to share behind an `Arc`; all methods take `&self`.
pub struct TransportService {
    shared: Arc<Shared>,
    shutdown: CancellationToken,
    accept_task: Mutex<Option<JoinHandle<()>>>,
    local_addr: Mutex<Option<SocketAddr>>,
}

impl TransportService {
    /// Create the service and the event stream its owner must drain.
    pub fn new(config: TransportConfig) -> (Self, mpsc::Receiver<TransportEvent>) {
        let (events, rx) = mpsc::channel(config.event_capacity);
        let shared = Arc::new(Shared {
            config,
            events,
            active: Mutex::new(None),
            install: tokio::sync::Mutex::new(()),
        });
        let service = Self {
            shared,
            shutdown: CancellationToken::new(),
            accept_task: Mutex::new(None),
            local_addr: Mutex::new(None),
        };
        (service, rx)
    }

    pub fn config(&self) -> &TransportConfig {
        &self.shared.config
    }

    /// Bind `port` and accept peers in the background, one at a time.
    ///
    /// Returns the bound address (useful with port `0`).
    pub async fn listen(&self, port: u16) -> Result<SocketAddr, DeskbeamError> {
        let listener =
            TcpListener::bind(SocketAddr::new(self.shared.config.bind_address, port)).await?;
        let local = listener.local_addr()?;
        info!(addr = %local, "listening for viewers");

        let task = tokio::spawn(accept_loop(
            listener,
            Arc::clone(&self.shared),
            self.shutdown.child_token(),
        ));
        if let Some(previous) = lock(&self.accept_task).replace(task) {
            previous.abort();
        }
        *lock(&self.local_addr) = Some(local);
        Ok(local)
    }

    /// Dial a host and install the connection.
    pub async fn connect_to(&self, device: &DeviceDescriptor) -> Result<(), DeskbeamError> {
        let addr = device.socket_addr();
        let timeout = self.shared.config.connect_timeout;
        let stream = tokio::time::timeout(timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| DeskbeamError::Timeout(timeout))??;
        stream.set_nodelay(true)?;
        let (reader, writer) = stream.into_split();
        self.shared.install(reader, writer, addr).await;
        Ok(())
    }

    /// Install an arbitrary stream pair as the active connection.
    pub async fn attach<R, W>(&self, reader: R, writer: W, peer: SocketAddr)
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        self.shared.install(reader, writer, peer).await;
    }

    /// Tear down the active connection, if any.
    pub async fn disconnect(&self) {
        let _guard = self.shared.install.lock().await;
        let active = self.shared.active().take();
        if let Some(conn) = active {
            info!(peer = %conn.peer, "disconnecting");
            self.shared.teardown(conn).await;
        }
    }

    /// Stop accepting and close the active connection.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let task = lock(&self.accept_task).take();
        if let Some(task) = task {
            let abort = task.abort_handle();
            if tokio::time::timeout(self.shared.config.shutdown_grace, task)
                .await
                .is_err()
            {
                abort.abort();
            }
        }
        self.disconnect().await;
        info!("transport stopped");
    }

    pub fn is_connected(&self) -> bool {
        self.shared.active().as_ref().is_some_and(Connection::is_open)
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.shared
            .active()
            .as_ref()
            .filter(|c| c.is_open())
            .map(|c| c.peer)
    }

    /// Address bound by the last `listen`.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *lock(&self.local_addr)
    }

    /// Age of the oldest frame accepted but not yet written, if any.
    pub fn oldest_pending_frame(&self) -> Option<Duration> {
        self.shared
            .active()
            .as_ref()
            .filter(|c| c.is_open())
            .and_then(|c| c.frames.oldest_age())
    }

    /// Queue `msg`, waiting for queue space. Frames never wait.
    pub async fn send(&self, msg: Message) -> Result<(), DeskbeamError> {
        if let Message::ScreenData(frame) = msg {
            return self.send_screen_data(frame);
        }
        let (outbound, _) = self.outbound()?;
        outbound.send(msg).await?;
        Ok(())
    }

    /// Queue `msg` without waiting; fails with `QueueFull` under back-pressure.
    pub fn try_send(&self, msg: Message) -> Result<(), DeskbeamError> {
        if let Message::ScreenData(frame) = msg {
            return self.send_screen_data(frame);
        }
        let (outbound, _) = self.outbound()?;
        outbound.try_send(msg)?;
        Ok(())
    }

    fn outbound(&self) -> Result<(mpsc::Sender<Message>, Arc<FramesInFlight>), DeskbeamError> {
        match self.shared.active().as_ref() {
            Some(conn) if conn.is_open() => Ok((conn.outbound.clone(), Arc::clone(&conn.frames))),
            _ => Err(DeskbeamError::NotConnected),
        }
    }

    // ── Per-kind senders ─────────────────────────────────────────

    /// Frames never wait for queue space; a newer frame supersedes them.
    ///
    /// Fails with `QueueFull` while `frame_budget` frames are still on
    /// their way to the socket.
    pub fn send_screen_data(&self, frame: Frame) -> Result<(), DeskbeamError> {
        let (outbound, frames) = self.outbound()?;
        // Held across the enqueue so the writer cannot report this frame
        // before its queue time is recorded.
        let mut queued = frames.lock();
        if queued.len() >= self.shared.config.frame_budget.max(1) {
            return Err(DeskbeamError::QueueFull);
        }
        outbound.try_send(Message::ScreenData(frame))?;
        queued.push_back(Instant::now());
        Ok(())
    }

    pub async fn send_input_event(&self, event: InputEvent) -> Result<(), DeskbeamError> {
        self.send(Message::InputEvent(event)).await
    }

    pub async fn send_pairing_request(&self, req: PairingRequest) -> Result<(), DeskbeamError> {
        self.send(Message::PairingRequest(req)).await
    }

    pub async fn send_pairing_response(&self, resp: PairingResponse) -> Result<(), DeskbeamError> {
        self.send(Message::PairingResponse(resp)).await
    }

    pub async fn send_connection_quality(
        &self,
        quality: ConnectionQuality,
    ) -> Result<(), DeskbeamError> {
        self.send(Message::ConnectionQuality(quality)).await
    }

    pub async fn send_clipboard_data(&self, data: ClipboardData) -> Result<(), DeskbeamError> {
        self.send(Message::ClipboardData(data)).await
    }

    /// Audio is latency sensitive; like frames it never waits.
    pub fn send_audio_data(&self, data: AudioData) -> Result<(), DeskbeamError> {
        self.try_send(Message::AudioData(data))
    }

    pub async fn send_file_transfer_request(
        &self,
        req: FileTransferRequest,
    ) -> Result<(), DeskbeamError> {
        self.send(Message::FileTransferRequest(req)).await
    }

    pub async fn send_file_transfer_response(
        &self,
        resp: FileTransferResponse,
    ) -> Result<(), DeskbeamError> {
        self.send(Message::FileTransferResponse(resp)).await
    }

    pub async fn send_file_transfer_chunk(
        &self,
        chunk: FileTransferChunk,
    ) -> Result<(), DeskbeamError> {
        self.send(Message::FileTransferChunk(chunk)).await
    }

    pub async fn send_file_transfer_complete(
        &self,
        done: FileTransferComplete,
    ) -> Result<(), DeskbeamError> {
        self.send(Message::FileTransferComplete(done)).await
    }

    pub async fn send_chat_message(&self, msg: ChatMessage) -> Result<(), DeskbeamError> {
        self.send(Message::ChatMessage(msg)).await
    }

    pub async fn send_message_read(&self, receipt: MessageRead) -> Result<(), DeskbeamError> {
        self.send(Message::MessageRead(receipt)).await
    }

    pub async fn send_print_job(&self, job: PrintJob) -> Result<(), DeskbeamError> {
        self.send(Message::PrintJob(job)).await
    }

    pub async fn send_print_job_response(
        &self,
        resp: PrintJobResponse,
    ) -> Result<(), DeskbeamError> {
        self.send(Message::PrintJobResponse(resp)).await
    }

    pub async fn send_print_job_status(&self, status: PrintJobStatus) -> Result<(), DeskbeamError> {
        self.send(Message::PrintJobStatus(status)).await
    }
}

async fn accept_loop(listener: TcpListener, shared: Arc<Shared>, cancel: CancellationToken) {
    loop {
        let accepted = tokio::select! {
            _ = cancel.cancelled() => break,
            accepted = listener.accept() => accepted,
        };
        match accepted {
            Ok((stream, peer)) => {
                if let Err(e) = stream.set_nodelay(true) {
                    debug!(%peer, error = %e, "set_nodelay failed");
                }
                let (reader, writer) = stream.into_split();
                shared.install(reader, writer, peer).await;
            }
            Err(e) => {
                warn!(error = %e, "accept failed");
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        }
    }
    debug!("accept loop stopped");
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ChatMessage;
    use tokio::io::AsyncWriteExt;

    fn local_config() -> TransportConfig {
        TransportConfig {
            bind_address: IpAddr::V4(Ipv4Addr::LOCALHOST),
            shutdown_grace: Duration::from_millis(500),
            ..TransportConfig::default()
        }
    }

    fn chat(text: &str) -> Message {
        Message::ChatMessage(ChatMessage::new("m1", "tester", text))
    }

    async fn next_event(rx: &mut mpsc::Receiver<TransportEvent>) -> TransportEvent {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("event timeout")
            .expect("event channel closed")
    }

    fn peer() -> SocketAddr {
        "127.0.0.1:9".parse().unwrap()
    }

    #[tokio::test]
    async fn send_without_connection_fails() {
        let (svc, _rx) = TransportService::new(local_config());
        assert!(matches!(svc.try_send(chat("x")), Err(DeskbeamError::NotConnected)));
        assert!(matches!(svc.send(chat("x")).await, Err(DeskbeamError::NotConnected)));
        assert!(!svc.is_connected());
    }

    #[tokio::test]
    async fn attached_stream_delivers_messages() {
        let (svc, mut rx) = TransportService::new(local_config());
        let (ours, theirs) = tokio::io::duplex(64 * 1024);
        let (r, w) = tokio::io::split(ours);
        svc.attach(r, w, peer()).await;
        assert_eq!(next_event(&mut rx).await, TransportEvent::ConnectionStateChanged(true));

        let (_their_r, mut their_w) = tokio::io::split(theirs);
        let hello = chat("hello");
        let envelope = hello.to_bytes().unwrap();
        their_w
            .write_all(&(envelope.len() as i32).to_le_bytes())
            .await
            .unwrap();
        their_w.write_all(&envelope).await.unwrap();

        assert_eq!(next_event(&mut rx).await, TransportEvent::Received(hello));
    }

    #[tokio::test]
    async fn zero_length_prefix_closes_without_dispatch() {
        let (svc, mut rx) = TransportService::new(local_config());
        let (ours, theirs) = tokio::io::duplex(1024);
        let (r, w) = tokio::io::split(ours);
        svc.attach(r, w, peer()).await;
        assert_eq!(next_event(&mut rx).await, TransportEvent::ConnectionStateChanged(true));

        let (_their_r, mut their_w) = tokio::io::split(theirs);
        their_w.write_all(&0i32.to_le_bytes()).await.unwrap();
        their_w.write_all(&[0x30, 1, 2, 3]).await.unwrap();

        assert_eq!(next_event(&mut rx).await, TransportEvent::ConnectionStateChanged(false));
        assert!(!svc.is_connected());
    }

    #[tokio::test]
    async fn disconnect_fires_closed_once() {
        let (svc, mut rx) = TransportService::new(local_config());
        let (ours, _theirs) = tokio::io::duplex(1024);
        let (r, w) = tokio::io::split(ours);
        svc.attach(r, w, peer()).await;
        assert_eq!(next_event(&mut rx).await, TransportEvent::ConnectionStateChanged(true));

        svc.disconnect().await;
        svc.disconnect().await;
        assert_eq!(next_event(&mut rx).await, TransportEvent::ConnectionStateChanged(false));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn new_peer_replaces_old_one() {
        let (svc, mut rx) = TransportService::new(local_config());
        let addr = svc.listen(0).await.unwrap();

        let _first = TcpStream::connect(addr).await.unwrap();
        assert_eq!(next_event(&mut rx).await, TransportEvent::ConnectionStateChanged(true));

        let second = TcpStream::connect(addr).await.unwrap();
        assert_eq!(next_event(&mut rx).await, TransportEvent::ConnectionStateChanged(false));
        assert_eq!(next_event(&mut rx).await, TransportEvent::ConnectionStateChanged(true));
        assert_eq!(svc.peer_addr(), Some(second.local_addr().unwrap()));

        svc.shutdown().await;
        assert_eq!(next_event(&mut rx).await, TransportEvent::ConnectionStateChanged(false));
    }

    fn frame(id: u64, bytes: usize) -> Frame {
        Frame::raw(id, (bytes / 4) as u32, 1, vec![0x5a; bytes])
    }

    #[tokio::test]
    async fn written_frames_are_reported_with_latency() {
        let (svc, mut rx) = TransportService::new(local_config());
        let (ours, _theirs) = tokio::io::duplex(64 * 1024);
        let (r, w) = tokio::io::split(ours);
        svc.attach(r, w, peer()).await;
        assert_eq!(next_event(&mut rx).await, TransportEvent::ConnectionStateChanged(true));

        svc.send_screen_data(frame(7, 400)).unwrap();
        match next_event(&mut rx).await {
            TransportEvent::FrameDelivered { frame_id, bytes, .. } => {
                assert_eq!((frame_id, bytes), (7, 400));
            }
            other => panic!("expected delivery report, got {other:?}"),
        }
        assert_eq!(svc.oldest_pending_frame(), None);
    }

    #[tokio::test]
    async fn stalled_peer_exhausts_the_frame_budget() {
        let config = TransportConfig {
            frame_budget: 2,
            ..local_config()
        };
        let (svc, mut rx) = TransportService::new(config);
        // Nobody reads the other end, so the second frame never fits.
        let (ours, _theirs) = tokio::io::duplex(1024);
        let (r, w) = tokio::io::split(ours);
        svc.attach(r, w, peer()).await;
        assert_eq!(next_event(&mut rx).await, TransportEvent::ConnectionStateChanged(true));

        svc.send_screen_data(frame(1, 4096)).unwrap();
        svc.send_screen_data(frame(2, 4096)).unwrap();
        assert!(matches!(svc.send_screen_data(frame(3, 4096)), Err(DeskbeamError::QueueFull)));
        assert!(matches!(
            svc.try_send(Message::ScreenData(frame(4, 4096))),
            Err(DeskbeamError::QueueFull)
        ));

        tokio::time::sleep(Duration::from_millis(30)).await;
        let age = svc.oldest_pending_frame().unwrap();
        assert!(age >= Duration::from_millis(30));

        // Other kinds still get through the queue.
        svc.try_send(chat("still here")).unwrap();
        svc.disconnect().await;
    }

    #[tokio::test]
    async fn listen_and_connect_round_trip() {
        let (host, mut host_rx) = TransportService::new(local_config());
        let addr = host.listen(0).await.unwrap();

        let (viewer, mut viewer_rx) = TransportService::new(local_config());
        let device = DeviceDescriptor::new("host", "host", addr.ip(), addr.port());
        viewer.connect_to(&device).await.unwrap();

        assert_eq!(next_event(&mut viewer_rx).await, TransportEvent::ConnectionStateChanged(true));
        assert_eq!(next_event(&mut host_rx).await, TransportEvent::ConnectionStateChanged(true));

        let ping = ChatMessage::new("1", "v", "ping");
        viewer.send_chat_message(ping.clone()).await.unwrap();
        assert_eq!(
            next_event(&mut host_rx).await,
            TransportEvent::Received(Message::ChatMessage(ping))
        );

        viewer.disconnect().await;
        assert_eq!(next_event(&mut host_rx).await, TransportEvent::ConnectionStateChanged(false));

        host.shutdown().await;
    }
}
