//! # deskbeam-core
//!
//! Control and data plane for LAN remote desktop.
//!
//! This crate contains:
//! - **Protocol types**: `Message`, `MessageKind` and the payload structs in `protocol`
//! - **Codec**: `EnvelopeCodec`, length-prefixed framing for `tokio_util`
//! - **Network**: `TransportService`, a single-peer TCP transport, and
//!   `UdpDiscovery` for LAN presence
//! - **Pairing**: `PairingAuthority`, PIN issue and validation with lockout
//! - **Session**: `SessionRegistry`, session lifecycle and duration accounting
//! - **RDP**: delta encoding, performance monitoring, the host orchestrator
//!   and the viewer client
//! - **Collab**: traits for platform capture, input, clipboard and audio
//! - **Error**: `DeskbeamError`, a typed `thiserror` hierarchy

pub mod codec;
pub mod collab;
pub mod error;
pub mod message;
pub mod network;
pub mod pairing;
pub mod protocol;
pub mod rdp;
pub mod session;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use codec::{EnvelopeCodec, MAX_FRAME_SIZE};
pub use error::{DeskbeamError, PairingFailure};
pub use message::{Message, MessageKind};
pub use network::{
    DeviceClass, DeviceDescriptor, DiscoveryConfig, TransportConfig, TransportEvent,
    TransportService, UdpDiscovery,
};
pub use pairing::{PairingAuthority, PairingConfig, PairingCredential, PairingEvent, PairingOutcome};
pub use session::{SessionEvent, SessionParticipants, SessionRecord, SessionRegistry, SessionStatus};

pub use rdp::{
    Collaborators, DeltaEncoder, Frame, FrameAssembler, OrchestratorConfig, PerformanceMonitor,
    QualityRating, SessionOrchestrator, ViewerClient, ViewerConfig,
};
