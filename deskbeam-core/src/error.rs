//! Domain-specific error types for deskbeam.
//!
//! All fallible operations return `Result<T, DeskbeamError>`.
//! Pairing rejections are a separate [`PairingFailure`] enum because they
//! travel over the wire inside a `PairingResponse`.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::session::SessionStatus;

/// The canonical error type for deskbeam.
#[derive(Debug, Error)]
pub enum DeskbeamError {
    // ── Protocol Errors ──────────────────────────────────────────
    /// The peer violated framing or envelope rules. The connection is dropped.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// A kind byte did not map to any known message kind.
    #[error("unknown {type_name} discriminant: {value:#x}")]
    UnknownVariant { type_name: &'static str, value: u64 },

    /// A declared frame length was outside `(0, max]`.
    #[error("invalid frame length: {length} (max {max})")]
    InvalidFrameLength { length: i64, max: usize },

    // ── Connection Errors ────────────────────────────────────────
    /// The TCP/IO layer reported an error.
    #[error("connection error: {0}")]
    Connection(#[from] std::io::Error),

    /// No connection is currently active.
    #[error("not connected")]
    NotConnected,

    /// The outbound queue is full; the message was dropped.
    #[error("send queue full")]
    QueueFull,

    /// An mpsc channel was closed unexpectedly.
    #[error("channel closed")]
    ChannelClosed,

    /// An operation exceeded its deadline.
    #[error("timeout after {0:?}")]
    Timeout(Duration),

    // ── Pairing Errors ───────────────────────────────────────────
    /// The host rejected a pairing attempt.
    #[error("pairing failed: {0}")]
    Pairing(#[from] PairingFailure),

    /// A gated operation was attempted before pairing succeeded.
    #[error("peer is not paired")]
    NotPaired,

    // ── Session Errors ───────────────────────────────────────────
    /// No session record exists with this id.
    #[error("session {0} not found")]
    SessionNotFound(Uuid),

    /// The requested transition is not valid from the current status.
    #[error("session {session}: cannot {operation} from {from}")]
    InvalidTransition {
        session: Uuid,
        from: SessionStatus,
        operation: &'static str,
    },

    // ── Serialization Errors ─────────────────────────────────────
    /// Encoding or decoding of a payload failed.
    #[error("encoding error: {0}")]
    Encoding(String),

    // ── Collaborator Errors ──────────────────────────────────────
    /// A platform collaborator (capture, input, clipboard, ...) failed.
    #[error("{collaborator} failed: {message}")]
    Collaborator {
        collaborator: &'static str,
        message: String,
    },

    /// Catch-all for errors that do not fit another variant.
    #[error("{0}")]
    Other(String),
}

impl DeskbeamError {
    /// Shorthand for a collaborator failure.
    pub fn collaborator(collaborator: &'static str, message: impl Into<String>) -> Self {
        DeskbeamError::Collaborator {
            collaborator,
            message: message.into(),
        }
    }

    /// Whether this error must tear down the connection it occurred on.
    pub fn is_fatal_for_connection(&self) -> bool {
        matches!(
            self,
            DeskbeamError::ProtocolViolation(_)
                | DeskbeamError::UnknownVariant { .. }
                | DeskbeamError::InvalidFrameLength { .. }
                | DeskbeamError::Connection(_)
                | DeskbeamError::Encoding(_)
        )
    }
}

// ── PairingFailure ────────────────────────────────────────────────

/// Why a pairing attempt was rejected.
///
/// The display text is what the viewer shows to its user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Error)]
pub enum PairingFailure {
    #[error("wrong code")]
    InvalidPin,
    #[error("code expired")]
    PinExpired,
    #[error("too many attempts")]
    TooManyAttempts,
    #[error("host refused the connection")]
    HostRefused,
}

// ── Convenient From implementations ──────────────────────────────

impl From<String> for DeskbeamError {
    fn from(s: String) -> Self {
        DeskbeamError::Other(s)
    }
}

impl From<&str> for DeskbeamError {
    fn from(s: &str) -> Self {
        DeskbeamError::Other(s.to_string())
    }
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for DeskbeamError {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        DeskbeamError::ChannelClosed
    }
}

impl<T> From<tokio::sync::mpsc::error::TrySendError<T>> for DeskbeamError {
    fn from(e: tokio::sync::mpsc::error::TrySendError<T>) -> Self {
        match e {
            tokio::sync::mpsc::error::TrySendError::Full(_) => DeskbeamError::QueueFull,
            tokio::sync::mpsc::error::TrySendError::Closed(_) => DeskbeamError::ChannelClosed,
        }
    }
}

impl From<Box<bincode::ErrorKind>> for DeskbeamError {
    fn from(e: Box<bincode::ErrorKind>) -> Self {
        DeskbeamError::Encoding(e.to_string())
    }
}
