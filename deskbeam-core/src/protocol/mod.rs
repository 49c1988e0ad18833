//! Structured payload definitions for every wire message kind.
//!
//! Payloads are serialized with `serde` + `bincode` and carried inside a
//! [`Message`] envelope. The screen payload is the pipeline's own
//! [`Frame`](crate::rdp::types::Frame).
//!
//! [`Message`]: crate::message::Message

pub mod chat;
pub mod file;
pub mod input;
pub mod media;
pub mod pairing;
pub mod print;

use std::time::{SystemTime, UNIX_EPOCH};

pub use chat::{ChatMessage, MessageRead};
pub use file::{FileTransferChunk, FileTransferComplete, FileTransferRequest, FileTransferResponse};
pub use input::{
    InputEvent, KeyAction, KeyEvent, MouseButton, MouseEvent, MouseEventKind, Shortcut,
    key_modifiers,
};
pub use media::{AudioData, AudioSettings, ClipboardData, ConnectionQuality};
pub use pairing::{PairingRequest, PairingResponse};
pub use print::{PrintJob, PrintJobResponse, PrintJobState, PrintJobStatus};

/// Current wall-clock time as Unix milliseconds (0 if the clock is before the epoch).
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
