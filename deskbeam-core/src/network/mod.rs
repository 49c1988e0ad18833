//! TCP transport, UDP presence and peer addressing.

pub mod device;
pub mod discovery;
pub mod transport;

pub use device::{DeviceClass, DeviceDescriptor};
pub use discovery::{DiscoveryConfig, PeerTable, UdpDiscovery};
pub use transport::{TransportConfig, TransportEvent, TransportService};
