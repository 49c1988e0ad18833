//! Pairing handshake payloads.
//!
//! ```text
//! Viewer ──[PairingRequest]──────────────────► Host
//!   Payload: PairingRequest (bincode)
//!
//! Host   ──[PairingResponse]─────────────────► Viewer
//!   Payload: PairingResponse (bincode)
//! ```
//!
//! A rejected attempt leaves the connection open; the viewer may retry
//! until the host locks the credential out.

use serde::{Deserialize, Serialize};

use crate::error::PairingFailure;
use crate::message::Message;
use crate::protocol::unix_millis;

/// Sent by the viewer to claim a session with the host's PIN.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PairingRequest {
    pub client_device_id: String,
    pub client_device_name: String,
    pub pin: String,
    /// Unix milliseconds at which the viewer sent the request.
    pub requested_at: u64,
}

impl PairingRequest {
    pub fn new(
        client_device_id: impl Into<String>,
        client_device_name: impl Into<String>,
        pin: impl Into<String>,
    ) -> Self {
        Self {
            client_device_id: client_device_id.into(),
            client_device_name: client_device_name.into(),
            pin: pin.into(),
            requested_at: unix_millis(),
        }
    }

    pub fn into_message(self) -> Message {
        Message::PairingRequest(self)
    }
}

/// The host's verdict on a [`PairingRequest`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PairingResponse {
    pub success: bool,
    /// The session id, present only on success.
    pub session_token: Option<String>,
    pub failure_reason: Option<PairingFailure>,
    pub message: Option<String>,
}

impl PairingResponse {
    pub fn accepted(session_token: impl Into<String>) -> Self {
        Self {
            success: true,
            session_token: Some(session_token.into()),
            failure_reason: None,
            message: None,
        }
    }

    pub fn rejected(reason: PairingFailure) -> Self {
        Self {
            success: false,
            session_token: None,
            failure_reason: Some(reason),
            message: Some(reason.to_string()),
        }
    }

    /// Collapse into a `Result` for the viewer side.
    ///
    /// A response claiming failure without a reason is treated as a refusal.
    pub fn into_result(self) -> Result<String, PairingFailure> {
        match (self.success, self.session_token, self.failure_reason) {
            (true, Some(token), _) => Ok(token),
            (_, _, Some(reason)) => Err(reason),
            _ => Err(PairingFailure::HostRefused),
        }
    }

    pub fn into_message(self) -> Message {
        Message::PairingResponse(self)
    }
}
