//! # Screen pipeline
//!
//! ```text
//! HOST                                          VIEWER
//! ┌──────────────────────────┐                 ┌─────────────────────┐
//! │ ScreenCapture (collab)   │                 │ TransportService    │
//! │   ↓                      │                 │   ↓                 │
//! │ DeltaEncoder             │   TCP, framed   │ FrameAssembler      │
//! │   ↓                      │ ─────────────►  │   ↓                 │
//! │ PerformanceMonitor       │                 │ watch<DisplayFrame> │
//! │   ↓                      │                 │                     │
//! │ TransportService         │                 │                     │
//! └──────────────────────────┘                 └─────────────────────┘
//!
//! Input: viewer ──[InputEvent]──► host InputInjector (collab)
//! ```
//!
//! | Module         | Purpose                                           |
//! |----------------|---------------------------------------------------|
//! | `types`        | `Frame` and changed-region types                  |
//! | `delta`        | Block-level delta encoding against a reference    |
//! | `performance`  | Rolling fps / bandwidth / latency and quality     |
//! | `assembler`    | Viewer-side reconstruction of full and delta frames |
//! | `orchestrator` | Host-side composition root                        |
//! | `client`       | Viewer-side pairing and frame consumer            |

pub mod assembler;
pub mod client;
pub mod delta;
pub mod orchestrator;
pub mod performance;
pub mod types;

// ── Re-exports ───────────────────────────────────────────────────

pub use assembler::FrameAssembler;
pub use client::{DisplayFrame, FrameStats, ViewerClient, ViewerConfig};
pub use delta::DeltaEncoder;
pub use orchestrator::{Collaborators, OrchestratorConfig, SessionOrchestrator};
pub use performance::{PerformanceMonitor, QualityRating};
pub use types::{ChangedRegion, Frame, FrameEncoding};
