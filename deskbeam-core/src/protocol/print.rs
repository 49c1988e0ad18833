//! Remote printing payloads. Rendering and spooling are handled by the
//! hosting shell's printer adapter.

use serde::{Deserialize, Serialize};

/// A document to print on the receiving side.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PrintJob {
    pub job_id: String,
    pub document_name: String,
    pub copies: u16,
    /// Document bytes (PDF).
    pub document: Vec<u8>,
}

/// Acceptance or refusal of a [`PrintJob`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PrintJobResponse {
    pub job_id: String,
    pub accepted: bool,
    pub message: Option<String>,
}

/// Progress report for an accepted job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PrintJobStatus {
    pub job_id: String,
    pub state: PrintJobState,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PrintJobState {
    Queued,
    Printing,
    Completed,
    Failed,
    Cancelled,
}
