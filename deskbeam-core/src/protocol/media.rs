//! Clipboard, audio and link-quality payloads.

use serde::{Deserialize, Serialize};

use crate::message::Message;
use crate::rdp::performance::QualityRating;

// ── Clipboard ─────────────────────────────────────────────────────

/// Clipboard contents, relayed in either direction once paired.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum ClipboardData {
    Text(String),
    /// Encoded image bytes (PNG) as handed over by the clipboard watcher.
    Image { width: u32, height: u32, png: Vec<u8> },
}

impl ClipboardData {
    pub fn into_message(self) -> Message {
        Message::ClipboardData(self)
    }

    /// Payload size in bytes, for logging.
    pub fn len(&self) -> usize {
        match self {
            ClipboardData::Text(text) => text.len(),
            ClipboardData::Image { png, .. } => png.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ── Audio ─────────────────────────────────────────────────────────

/// A chunk of captured PCM audio (host → viewer).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AudioData {
    pub sample_rate: u32,
    pub channels: u16,
    /// Interleaved little-endian i16 samples.
    pub samples: Vec<u8>,
    /// Unix milliseconds at capture.
    pub captured_at: u64,
}

impl AudioData {
    pub fn into_message(self) -> Message {
        Message::AudioData(self)
    }
}

/// Settings pushed to the audio capture collaborator.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct AudioSettings {
    pub sample_rate: u32,
    pub channels: u16,
    pub enabled: bool,
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            channels: 2,
            enabled: true,
        }
    }
}

// ── Connection Quality ────────────────────────────────────────────

/// Periodic link report from host to viewer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ConnectionQuality {
    /// Recommended encoding quality (0-100).
    pub quality: u8,
    pub fps: f64,
    /// Bytes per second.
    pub bandwidth: f64,
    /// Mean latency in milliseconds.
    pub latency_ms: f64,
    pub rating: QualityRating,
}

impl ConnectionQuality {
    pub fn into_message(self) -> Message {
        Message::ConnectionQuality(self)
    }
}
