//! Wire message kinds and the tagged envelope.
//!
//! An envelope is one kind byte followed by the bincode-encoded payload for
//! that kind:
//!
//! ```text
//! kind:    u8
//! payload: [u8]  (bincode, layout depends on kind)
//! ```
//!
//! [`Message`] is a closed sum type, so every consumer matches all kinds
//! exhaustively. Uses `TryFrom` for the kind byte.

use std::fmt;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::DeskbeamError;
use crate::protocol::{
    AudioData, ChatMessage, ClipboardData, ConnectionQuality, FileTransferChunk,
    FileTransferComplete, FileTransferRequest, FileTransferResponse, InputEvent, MessageRead,
    PairingRequest, PairingResponse, PrintJob, PrintJobResponse, PrintJobStatus,
};
use crate::rdp::types::Frame;

// ── MessageKind ──────────────────────────────────────────────────

/// All message kinds understood by the protocol.
///
/// Organized by category:
/// - `0x01..0x0F`: Pairing
/// - `0x10..0x1F`: Screen / input / media streams
/// - `0x20..0x2F`: File transfer
/// - `0x30..0x3F`: Chat
/// - `0x40..0x4F`: Printing
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    // ── Pairing (0x0x) ───────────────────────────────────────────
    PairingRequest = 0x01,
    PairingResponse = 0x02,

    // ── Streams (0x1x) ───────────────────────────────────────────
    ScreenData = 0x10,
    InputEvent = 0x11,
    ConnectionQuality = 0x12,
    ClipboardData = 0x13,
    AudioData = 0x14,

    // ── File (0x2x) ──────────────────────────────────────────────
    FileTransferRequest = 0x20,
    FileTransferResponse = 0x21,
    FileTransferChunk = 0x22,
    FileTransferComplete = 0x23,

    // ── Chat (0x3x) ──────────────────────────────────────────────
    ChatMessage = 0x30,
    MessageRead = 0x31,

    // ── Print (0x4x) ─────────────────────────────────────────────
    PrintJob = 0x40,
    PrintJobResponse = 0x41,
    PrintJobStatus = 0x42,
}

impl TryFrom<u8> for MessageKind {
    type Error = DeskbeamError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x01 => Ok(MessageKind::PairingRequest),
            0x02 => Ok(MessageKind::PairingResponse),

            0x10 => Ok(MessageKind::ScreenData),
            0x11 => Ok(MessageKind::InputEvent),
            0x12 => Ok(MessageKind::ConnectionQuality),
            0x13 => Ok(MessageKind::ClipboardData),
            0x14 => Ok(MessageKind::AudioData),

            0x20 => Ok(MessageKind::FileTransferRequest),
            0x21 => Ok(MessageKind::FileTransferResponse),
            0x22 => Ok(MessageKind::FileTransferChunk),
            0x23 => Ok(MessageKind::FileTransferComplete),

            0x30 => Ok(MessageKind::ChatMessage),
            0x31 => Ok(MessageKind::MessageRead),

            0x40 => Ok(MessageKind::PrintJob),
            0x41 => Ok(MessageKind::PrintJobResponse),
            0x42 => Ok(MessageKind::PrintJobStatus),

            _ => Err(DeskbeamError::UnknownVariant {
                type_name: "MessageKind",
                value: value as u64,
            }),
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl MessageKind {
    /// Pairing messages are the only kinds allowed before a peer is paired.
    pub fn is_pairing(&self) -> bool {
        matches!(self, MessageKind::PairingRequest | MessageKind::PairingResponse)
    }

    /// File, chat and print kinds, which the host relays to its shell.
    pub fn is_auxiliary(&self) -> bool {
        (*self as u8) >= 0x20
    }
}

// ── Message ──────────────────────────────────────────────────────

/// One decoded envelope.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    PairingRequest(PairingRequest),
    PairingResponse(PairingResponse),
    ScreenData(Frame),
    InputEvent(InputEvent),
    ConnectionQuality(ConnectionQuality),
    ClipboardData(ClipboardData),
    AudioData(AudioData),
    FileTransferRequest(FileTransferRequest),
    FileTransferResponse(FileTransferResponse),
    FileTransferChunk(FileTransferChunk),
    FileTransferComplete(FileTransferComplete),
    ChatMessage(ChatMessage),
    MessageRead(MessageRead),
    PrintJob(PrintJob),
    PrintJobResponse(PrintJobResponse),
    PrintJobStatus(PrintJobStatus),
}

impl Message {
    /// The kind tag written in front of the payload.
    pub fn kind(&self) -> MessageKind {
        match self {
            Message::PairingRequest(_) => MessageKind::PairingRequest,
            Message::PairingResponse(_) => MessageKind::PairingResponse,
            Message::ScreenData(_) => MessageKind::ScreenData,
            Message::InputEvent(_) => MessageKind::InputEvent,
            Message::ConnectionQuality(_) => MessageKind::ConnectionQuality,
            Message::ClipboardData(_) => MessageKind::ClipboardData,
            Message::AudioData(_) => MessageKind::AudioData,
            Message::FileTransferRequest(_) => MessageKind::FileTransferRequest,
            Message::FileTransferResponse(_) => MessageKind::FileTransferResponse,
            Message::FileTransferChunk(_) => MessageKind::FileTransferChunk,
            Message::FileTransferComplete(_) => MessageKind::FileTransferComplete,
            Message::ChatMessage(_) => MessageKind::ChatMessage,
            Message::MessageRead(_) => MessageKind::MessageRead,
            Message::PrintJob(_) => MessageKind::PrintJob,
            Message::PrintJobResponse(_) => MessageKind::PrintJobResponse,
            Message::PrintJobStatus(_) => MessageKind::PrintJobStatus,
        }
    }

    /// Serialize into envelope bytes (kind byte + payload), without the
    /// length prefix.
    pub fn to_bytes(&self) -> Result<Vec<u8>, DeskbeamError> {
        let mut out = vec![self.kind() as u8];
        match self {
            Message::PairingRequest(p) => write_payload(&mut out, p)?,
            Message::PairingResponse(p) => write_payload(&mut out, p)?,
            Message::ScreenData(p) => write_payload(&mut out, p)?,
            Message::InputEvent(p) => write_payload(&mut out, p)?,
            Message::ConnectionQuality(p) => write_payload(&mut out, p)?,
            Message::ClipboardData(p) => write_payload(&mut out, p)?,
            Message::AudioData(p) => write_payload(&mut out, p)?,
            Message::FileTransferRequest(p) => write_payload(&mut out, p)?,
            Message::FileTransferResponse(p) => write_payload(&mut out, p)?,
            Message::FileTransferChunk(p) => write_payload(&mut out, p)?,
            Message::FileTransferComplete(p) => write_payload(&mut out, p)?,
            Message::ChatMessage(p) => write_payload(&mut out, p)?,
            Message::MessageRead(p) => write_payload(&mut out, p)?,
            Message::PrintJob(p) => write_payload(&mut out, p)?,
            Message::PrintJobResponse(p) => write_payload(&mut out, p)?,
            Message::PrintJobStatus(p) => write_payload(&mut out, p)?,
        }
        Ok(out)
    }

    /// Deserialize envelope bytes (kind byte + payload).
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DeskbeamError> {
        let (&tag, payload) = bytes
            .split_first()
            .ok_or_else(|| DeskbeamError::ProtocolViolation("empty envelope".into()))?;

        let message = match MessageKind::try_from(tag)? {
            MessageKind::PairingRequest => Message::PairingRequest(read_payload(payload)?),
            MessageKind::PairingResponse => Message::PairingResponse(read_payload(payload)?),
            MessageKind::ScreenData => Message::ScreenData(read_payload(payload)?),
            MessageKind::InputEvent => Message::InputEvent(read_payload(payload)?),
            MessageKind::ConnectionQuality => Message::ConnectionQuality(read_payload(payload)?),
            MessageKind::ClipboardData => Message::ClipboardData(read_payload(payload)?),
            MessageKind::AudioData => Message::AudioData(read_payload(payload)?),
            MessageKind::FileTransferRequest => {
                Message::FileTransferRequest(read_payload(payload)?)
            }
            MessageKind::FileTransferResponse => {
                Message::FileTransferResponse(read_payload(payload)?)
            }
            MessageKind::FileTransferChunk => Message::FileTransferChunk(read_payload(payload)?),
            MessageKind::FileTransferComplete => {
                Message::FileTransferComplete(read_payload(payload)?)
            }
            MessageKind::ChatMessage => Message::ChatMessage(read_payload(payload)?),
            MessageKind::MessageRead => Message::MessageRead(read_payload(payload)?),
            MessageKind::PrintJob => Message::PrintJob(read_payload(payload)?),
            MessageKind::PrintJobResponse => Message::PrintJobResponse(read_payload(payload)?),
            MessageKind::PrintJobStatus => Message::PrintJobStatus(read_payload(payload)?),
        };
        Ok(message)
    }
}

fn write_payload<T: Serialize>(out: &mut Vec<u8>, payload: &T) -> Result<(), DeskbeamError> {
    bincode::serialize_into(out, payload)?;
    Ok(())
}

fn read_payload<T: DeserializeOwned>(payload: &[u8]) -> Result<T, DeskbeamError> {
    Ok(bincode::deserialize(payload)?)
}
