//! Chat payloads.

use serde::{Deserialize, Serialize};

use crate::protocol::unix_millis;

/// A text message between host and viewer users.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    pub message_id: String,
    pub sender_name: String,
    pub text: String,
    /// Unix milliseconds.
    pub sent_at: u64,
}

impl ChatMessage {
    pub fn new(
        message_id: impl Into<String>,
        sender_name: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            message_id: message_id.into(),
            sender_name: sender_name.into(),
            text: text.into(),
            sent_at: unix_millis(),
        }
    }
}

/// Read receipt for a [`ChatMessage`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MessageRead {
    pub message_id: String,
    pub read_at: u64,
}
