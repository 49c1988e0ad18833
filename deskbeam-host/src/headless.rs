//! Headless collaborators.
//!
//! Stand-ins for the platform layer so the host runs on machines without a
//! desktop session: a moving test pattern instead of screen capture, an
//! injector that logs instead of replaying input, an in-memory clipboard and
//! an audio source that produces silence.

use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use deskbeam_core::DeskbeamError;
use deskbeam_core::collab::{AudioCapture, ClipboardWatcher, InputInjector, ScreenCapture};
use deskbeam_core::protocol::{
    AudioData, AudioSettings, ClipboardData, InputEvent, Shortcut, unix_millis,
};
use deskbeam_core::rdp::performance::NEUTRAL_QUALITY;
use deskbeam_core::rdp::types::{BYTES_PER_PIXEL, Frame};

/// Side of the bouncing square, in pixels.
const SPRITE: u32 = 48;
/// Pixels the square moves per frame.
const SPRITE_STEP: u32 = 6;
const AUDIO_CHUNK: Duration = Duration::from_millis(100);

/// A running producer task and the token that stops it.
#[derive(Default)]
struct Producer {
    slot: Mutex<Option<(CancellationToken, JoinHandle<()>)>>,
}

impl Producer {
    fn start<F>(&self, run: impl FnOnce(CancellationToken) -> F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run(cancel.clone()));
        if let Some((old, _)) = lock(&self.slot).replace((cancel, task)) {
            old.cancel();
        }
    }

    async fn stop(&self) {
        let running = lock(&self.slot).take();
        if let Some((cancel, task)) = running {
            cancel.cancel();
            let _ = task.await;
        }
    }

    fn is_running(&self) -> bool {
        lock(&self.slot).is_some()
    }
}

// ── Screen ───────────────────────────────────────────────────────

/// Render the test pattern for frame number `tick` as BGRA.
///
/// A fixed diagonal gradient with a square bouncing across it, so
/// consecutive frames differ in a few blocks only.
pub fn test_pattern(width: u32, height: u32, tick: u64) -> Vec<u8> {
    let (w, h) = (width as usize, height as usize);
    let mut data = vec![0u8; w * h * BYTES_PER_PIXEL];
    for y in 0..h {
        for x in 0..w {
            let i = (y * w + x) * BYTES_PER_PIXEL;
            data[i] = (x * 255 / w.max(1)) as u8;
            data[i + 1] = (y * 255 / h.max(1)) as u8;
            data[i + 2] = ((x + y) % 256) as u8;
            data[i + 3] = 0xff;
        }
    }

    let (sx, sy) = sprite_origin(width, height, tick);
    for y in sy..(sy + SPRITE).min(height) {
        for x in sx..(sx + SPRITE).min(width) {
            let i = (y as usize * w + x as usize) * BYTES_PER_PIXEL;
            data[i..i + BYTES_PER_PIXEL].copy_from_slice(&[0xff, 0xff, 0xff, 0xff]);
        }
    }
    data
}

fn sprite_origin(width: u32, height: u32, tick: u64) -> (u32, u32) {
    let bounce = |span: u32| -> u32 {
        let travel = span.saturating_sub(SPRITE);
        if travel == 0 {
            return 0;
        }
        let period = 2 * travel as u64;
        let pos = (tick * SPRITE_STEP as u64) % period;
        if pos < travel as u64 { pos as u32 } else { (period - pos) as u32 }
    };
    (bounce(width), bounce(height))
}

/// Produces [`test_pattern`] frames at a fixed rate.
pub struct TestPatternCapture {
    width: u32,
    height: u32,
    interval: Duration,
    quality: Arc<AtomicU8>,
    produced: Arc<AtomicU64>,
    producer: Producer,
}

impl TestPatternCapture {
    pub fn new(width: u32, height: u32, interval: Duration) -> Self {
        Self {
            width: width.max(1),
            height: height.max(1),
            interval: interval.max(Duration::from_millis(1)),
            quality: Arc::new(AtomicU8::new(NEUTRAL_QUALITY)),
            produced: Arc::new(AtomicU64::new(0)),
            producer: Producer::default(),
        }
    }

    pub fn quality(&self) -> u8 {
        self.quality.load(Ordering::Relaxed)
    }

    /// Frames produced since construction.
    pub fn frames_produced(&self) -> u64 {
        self.produced.load(Ordering::Relaxed)
    }

    pub fn is_running(&self) -> bool {
        self.producer.is_running()
    }
}

#[async_trait]
impl ScreenCapture for TestPatternCapture {
    async fn start(&self, frames: mpsc::Sender<Frame>) -> Result<(), DeskbeamError> {
        let (width, height, interval) = (self.width, self.height, self.interval);
        let quality = Arc::clone(&self.quality);
        let produced = Arc::clone(&self.produced);
        info!(width, height, ?interval, "test pattern capture started");

        self.producer.start(move |cancel| async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            let mut tick = 0u64;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                let mut frame = Frame::raw(tick, width, height, test_pattern(width, height, tick));
                frame.quality = quality.load(Ordering::Relaxed);
                tick += 1;
                match frames.try_send(frame) {
                    Ok(()) => {
                        produced.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(mpsc::error::TrySendError::Full(_)) => debug!(tick, "frame skipped"),
                    Err(mpsc::error::TrySendError::Closed(_)) => break,
                }
            }
        });
        Ok(())
    }

    async fn stop(&self) -> Result<(), DeskbeamError> {
        self.producer.stop().await;
        Ok(())
    }

    fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn set_quality(&self, quality: u8) {
        self.quality.store(quality.min(100), Ordering::Relaxed);
    }
}

// ── Input ────────────────────────────────────────────────────────

/// Logs remote input instead of replaying it.
#[derive(Default)]
pub struct LoggingInjector {
    events: AtomicU64,
    shortcuts: AtomicU64,
}

impl LoggingInjector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events_seen(&self) -> u64 {
        self.events.load(Ordering::Relaxed)
    }

    pub fn shortcuts_seen(&self) -> u64 {
        self.shortcuts.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl InputInjector for LoggingInjector {
    async fn start(&self) -> Result<(), DeskbeamError> {
        Ok(())
    }

    async fn stop(&self) -> Result<(), DeskbeamError> {
        Ok(())
    }

    async fn process_event(&self, event: InputEvent) -> Result<(), DeskbeamError> {
        self.events.fetch_add(1, Ordering::Relaxed);
        debug!(?event, "input");
        Ok(())
    }

    async fn send_shortcut(&self, shortcut: Shortcut) -> Result<(), DeskbeamError> {
        self.shortcuts.fetch_add(1, Ordering::Relaxed);
        info!(?shortcut, "shortcut");
        Ok(())
    }
}

// ── Clipboard ────────────────────────────────────────────────────

/// A clipboard that lives in memory.
///
/// [`MemoryClipboard::copy`] plays the part of a local copy and is reported
/// to the orchestrator while it is watching.
#[derive(Default)]
pub struct MemoryClipboard {
    contents: Mutex<Option<ClipboardData>>,
    watcher: Mutex<Option<mpsc::Sender<ClipboardData>>>,
}

impl MemoryClipboard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the contents as a local user would and report the change.
    pub async fn copy(&self, data: ClipboardData) {
        *lock(&self.contents) = Some(data.clone());
        let watcher = lock(&self.watcher).clone();
        if let Some(tx) = watcher {
            let _ = tx.send(data).await;
        }
    }

    pub fn contents(&self) -> Option<ClipboardData> {
        lock(&self.contents).clone()
    }
}

#[async_trait]
impl ClipboardWatcher for MemoryClipboard {
    async fn start(&self, changes: mpsc::Sender<ClipboardData>) -> Result<(), DeskbeamError> {
        *lock(&self.watcher) = Some(changes);
        Ok(())
    }

    async fn stop(&self) -> Result<(), DeskbeamError> {
        lock(&self.watcher).take();
        Ok(())
    }

    async fn get_text(&self) -> Result<Option<String>, DeskbeamError> {
        Ok(match lock(&self.contents).as_ref() {
            Some(ClipboardData::Text(text)) => Some(text.clone()),
            _ => None,
        })
    }

    async fn set_text(&self, text: String) -> Result<(), DeskbeamError> {
        debug!(len = text.len(), "clipboard text from viewer");
        *lock(&self.contents) = Some(ClipboardData::Text(text));
        Ok(())
    }

    async fn get_image(&self) -> Result<Option<(u32, u32, Vec<u8>)>, DeskbeamError> {
        Ok(match lock(&self.contents).as_ref() {
            Some(ClipboardData::Image { width, height, png }) => Some((*width, *height, png.clone())),
            _ => None,
        })
    }

    async fn set_image(&self, width: u32, height: u32, png: Vec<u8>) -> Result<(), DeskbeamError> {
        debug!(width, height, "clipboard image from viewer");
        *lock(&self.contents) = Some(ClipboardData::Image { width, height, png });
        Ok(())
    }
}

// ── Audio ────────────────────────────────────────────────────────

/// Emits chunks of silence while enabled.
pub struct SilentAudio {
    settings: Mutex<AudioSettings>,
    producer: Producer,
}

impl SilentAudio {
    pub fn new(settings: AudioSettings) -> Self {
        Self {
            settings: Mutex::new(settings),
            producer: Producer::default(),
        }
    }

    pub fn settings(&self) -> AudioSettings {
        *lock(&self.settings)
    }
}

/// One chunk of silence for `settings`.
pub fn silent_chunk(settings: AudioSettings, length: Duration) -> AudioData {
    let frames = (settings.sample_rate as u128 * length.as_millis() / 1000) as usize;
    AudioData {
        sample_rate: settings.sample_rate,
        channels: settings.channels,
        samples: vec![0u8; frames * settings.channels as usize * 2],
        captured_at: unix_millis(),
    }
}

#[async_trait]
impl AudioCapture for SilentAudio {
    async fn start(&self, chunks: mpsc::Sender<AudioData>) -> Result<(), DeskbeamError> {
        let settings = self.settings();
        if !settings.enabled {
            debug!("audio disabled");
            return Ok(());
        }
        self.producer.start(move |cancel| async move {
            let mut ticker = tokio::time::interval(AUDIO_CHUNK);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                match chunks.try_send(silent_chunk(settings, AUDIO_CHUNK)) {
                    Ok(()) | Err(mpsc::error::TrySendError::Full(_)) => {}
                    Err(mpsc::error::TrySendError::Closed(_)) => break,
                }
            }
        });
        Ok(())
    }

    async fn stop(&self) -> Result<(), DeskbeamError> {
        self.producer.stop().await;
        Ok(())
    }

    async fn update_settings(&self, settings: AudioSettings) -> Result<(), DeskbeamError> {
        *lock(&self.settings) = settings;
        Ok(())
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use deskbeam_core::DeltaEncoder;
    use deskbeam_core::collab::dispatch_input;
    use deskbeam_core::protocol::MouseEvent;

    #[test]
    fn pattern_has_expected_size_and_alpha() {
        let data = test_pattern(64, 32, 0);
        assert_eq!(data.len(), 64 * 32 * 4);
        assert!(data.chunks(4).all(|px| px[3] == 0xff));
    }

    #[test]
    fn sprite_bounces_inside_the_frame() {
        for tick in 0..200 {
            let (x, y) = sprite_origin(200, 100, tick);
            assert!(x + SPRITE <= 200);
            assert!(y + SPRITE <= 100);
        }
        assert_eq!(sprite_origin(200, 100, 0), (0, 0));
        assert_eq!(sprite_origin(20, 20, 5), (0, 0));
    }

    #[test]
    fn consecutive_patterns_encode_as_deltas() {
        let encoder = DeltaEncoder::new();
        let (w, h) = (640, 480);
        encoder.encode(Frame::raw(0, w, h, test_pattern(w, h, 0)));
        let next = encoder.encode(Frame::raw(1, w, h, test_pattern(w, h, 1)));
        assert!(next.is_delta);
        assert!(!next.regions.is_empty());
    }

    #[tokio::test]
    async fn capture_produces_frames_until_stopped() {
        let capture = TestPatternCapture::new(32, 32, Duration::from_millis(5));
        capture.set_quality(150);
        assert_eq!(capture.quality(), 100);

        let (tx, mut rx) = mpsc::channel(4);
        capture.start(tx).await.unwrap();
        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert_eq!((first.frame_id, second.frame_id), (0, 1));
        assert_eq!((first.width, first.height), capture.dimensions());
        assert!(first.is_full_raw());

        capture.stop().await.unwrap();
        assert!(!capture.is_running());
        assert!(capture.frames_produced() >= 2);
    }

    #[tokio::test]
    async fn injector_counts_events_and_shortcuts() {
        let injector = LoggingInjector::new();
        dispatch_input(&injector, MouseEvent::move_to(3, 4).into()).await.unwrap();
        dispatch_input(&injector, InputEvent::Shortcut(Shortcut::AltTab)).await.unwrap();
        assert_eq!(injector.events_seen(), 1);
        assert_eq!(injector.shortcuts_seen(), 1);
    }

    #[tokio::test]
    async fn clipboard_reports_local_copies_while_watching() {
        let clipboard = MemoryClipboard::new();
        clipboard.set_text("from viewer".into()).await.unwrap();
        assert_eq!(clipboard.get_text().await.unwrap().as_deref(), Some("from viewer"));
        assert!(clipboard.get_image().await.unwrap().is_none());

        let (tx, mut rx) = mpsc::channel(1);
        clipboard.start(tx).await.unwrap();
        clipboard.copy(ClipboardData::Text("local".into())).await;
        assert_eq!(rx.recv().await, Some(ClipboardData::Text("local".into())));

        clipboard.stop().await.unwrap();
        clipboard.copy(ClipboardData::Text("unseen".into())).await;
        assert!(rx.recv().await.is_none());
    }

    #[test]
    fn silent_chunk_length() {
        let chunk = silent_chunk(AudioSettings::default(), Duration::from_millis(100));
        assert_eq!(chunk.samples.len(), 4800 * 2 * 2);
        assert!(chunk.samples.iter().all(|&b| b == 0));
    }

    #[tokio::test]
    async fn disabled_audio_stays_quiet() {
        let audio = SilentAudio::new(AudioSettings {
            enabled: false,
            ..AudioSettings::default()
        });
        let (tx, mut rx) = mpsc::channel(1);
        audio.start(tx).await.unwrap();
        audio.stop().await.unwrap();
        assert!(rx.recv().await.is_none());
    }
}
