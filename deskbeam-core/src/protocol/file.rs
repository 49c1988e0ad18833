//! File transfer payloads.
//!
//! ```text
//! Sender   ──[FileTransferRequest]───────────► Receiver
//! Receiver ──[FileTransferResponse]──────────► Sender
//! Sender   ──[FileTransferChunk]─────────────► Receiver   (repeated)
//! Sender   ──[FileTransferComplete]──────────► Receiver
//! ```
//!
//! File data is only relayed while the peer is paired.

use serde::{Deserialize, Serialize};

/// Offer to send a file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileTransferRequest {
    pub transfer_id: String,
    pub file_name: String,
    pub file_size: u64,
    pub mime_type: Option<String>,
}

/// Acceptance or refusal of a [`FileTransferRequest`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileTransferResponse {
    pub transfer_id: String,
    pub accepted: bool,
    pub reason: Option<String>,
}

/// One slice of file contents.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileTransferChunk {
    pub transfer_id: String,
    /// Byte offset of `data` within the file.
    pub offset: u64,
    pub data: Vec<u8>,
}

/// End-of-transfer marker.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileTransferComplete {
    pub transfer_id: String,
    pub success: bool,
    pub total_bytes: u64,
}

impl FileTransferRequest {
    /// Number of chunks needed at `chunk_size` bytes per chunk.
    pub fn chunk_count(&self, chunk_size: u64) -> u64 {
        if chunk_size == 0 {
            return 0;
        }
        self.file_size.div_ceil(chunk_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_count_rounds_up() {
        let req = FileTransferRequest {
            transfer_id: "t1".into(),
            file_name: "a.bin".into(),
            file_size: 10_001,
            mime_type: None,
        };
        assert_eq!(req.chunk_count(1000), 11);
        assert_eq!(req.chunk_count(0), 0);
    }
}
