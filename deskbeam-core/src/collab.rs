//! Platform collaborator interfaces.
//!
//! The orchestrator never touches the OS directly. Screen capture, input
//! injection, clipboard, audio, recording and discovery are supplied by
//! the embedding binary through these traits. Producers push into the
//! `mpsc::Sender` handed to `start`; `stop` must make them stop pushing.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::DeskbeamError;
use crate::network::device::DeviceDescriptor;
use crate::protocol::{AudioData, AudioSettings, ClipboardData, InputEvent, Shortcut};
use crate::rdp::types::Frame;

/// Produces screen frames.
#[async_trait]
pub trait ScreenCapture: Send + Sync {
    async fn start(&self, frames: mpsc::Sender<Frame>) -> Result<(), DeskbeamError>;
    async fn stop(&self) -> Result<(), DeskbeamError>;
    /// Current capture size in pixels.
    fn dimensions(&self) -> (u32, u32);
    /// Quality hint (0-100) for pre-compressed output.
    fn set_quality(&self, quality: u8);
}

/// Replays remote input on the local desktop.
#[async_trait]
pub trait InputInjector: Send + Sync {
    async fn start(&self) -> Result<(), DeskbeamError>;
    async fn stop(&self) -> Result<(), DeskbeamError>;
    async fn process_event(&self, event: InputEvent) -> Result<(), DeskbeamError>;
    async fn send_shortcut(&self, shortcut: Shortcut) -> Result<(), DeskbeamError>;
}

/// Watches and updates the local clipboard.
#[async_trait]
pub trait ClipboardWatcher: Send + Sync {
    /// Begin reporting local clipboard changes into `changes`.
    async fn start(&self, changes: mpsc::Sender<ClipboardData>) -> Result<(), DeskbeamError>;
    async fn stop(&self) -> Result<(), DeskbeamError>;
    async fn get_text(&self) -> Result<Option<String>, DeskbeamError>;
    async fn set_text(&self, text: String) -> Result<(), DeskbeamError>;
    /// Returns `(width, height, png)`.
    async fn get_image(&self) -> Result<Option<(u32, u32, Vec<u8>)>, DeskbeamError>;
    async fn set_image(&self, width: u32, height: u32, png: Vec<u8>) -> Result<(), DeskbeamError>;
}

/// Produces audio chunks.
#[async_trait]
pub trait AudioCapture: Send + Sync {
    async fn start(&self, chunks: mpsc::Sender<AudioData>) -> Result<(), DeskbeamError>;
    async fn stop(&self) -> Result<(), DeskbeamError>;
    async fn update_settings(&self, settings: AudioSettings) -> Result<(), DeskbeamError>;
}

/// Persists a session's frames and audio.
#[async_trait]
pub trait Recorder: Send + Sync {
    async fn start_recording(&self, session_name: &str) -> Result<(), DeskbeamError>;
    async fn stop_recording(&self) -> Result<(), DeskbeamError>;
    async fn write_frame(&self, frame: &Frame) -> Result<(), DeskbeamError>;
    async fn write_audio(&self, audio: &AudioData) -> Result<(), DeskbeamError>;
}

/// Peer appearance and disappearance on the LAN.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryEvent {
    DeviceDiscovered(DeviceDescriptor),
    /// Carries the lost device's id.
    DeviceLost(String),
}

/// LAN presence announcements.
#[async_trait]
pub trait Discovery: Send + Sync {
    async fn start_broadcasting(&self, local: DeviceDescriptor) -> Result<(), DeskbeamError>;
    async fn start_listening(&self, events: mpsc::Sender<DiscoveryEvent>) -> Result<(), DeskbeamError>;
    async fn stop(&self) -> Result<(), DeskbeamError>;
}

/// Apply received clipboard contents through a watcher.
pub async fn apply_clipboard(
    watcher: &dyn ClipboardWatcher,
    data: ClipboardData,
) -> Result<(), DeskbeamError> {
    match data {
        ClipboardData::Text(text) => watcher.set_text(text).await,
        ClipboardData::Image { width, height, png } => watcher.set_image(width, height, png).await,
    }
}

/// Route an input event, sending shortcuts through the dedicated path.
pub async fn dispatch_input(
    injector: &dyn InputInjector,
    event: InputEvent,
) -> Result<(), DeskbeamError> {
    match event {
        InputEvent::Shortcut(shortcut) => injector.send_shortcut(shortcut).await,
        other => injector.process_event(other).await,
    }
}
