//! Peers found on the LAN.

use std::fmt;
use std::net::{IpAddr, SocketAddr};

use serde::{Deserialize, Serialize};

/// UDP port used for discovery broadcasts.
pub const DEFAULT_DISCOVERY_PORT: u16 = 12345;
/// TCP port the host listens on.
pub const DEFAULT_HOST_PORT: u16 = 12346;
/// TCP port a viewer binds when it needs a fixed local port.
pub const DEFAULT_CLIENT_PORT: u16 = 12347;
/// Interval between discovery broadcasts, in seconds.
pub const DEFAULT_DISCOVERY_INTERVAL_SECS: u64 = 5;
/// A peer not heard from for this long is considered lost, in seconds.
pub const DEFAULT_DISCOVERY_TIMEOUT_SECS: u64 = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DeviceClass {
    Desktop,
    Laptop,
    Tablet,
    Phone,
    #[default]
    Unknown,
}

/// A reachable deskbeam peer. Immutable once discovered.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    pub id: String,
    pub name: String,
    pub address: IpAddr,
    pub port: u16,
    pub class: DeviceClass,
    pub mac: Option<String>,
}

impl DeviceDescriptor {
    pub fn new(id: impl Into<String>, name: impl Into<String>, address: IpAddr, port: u16) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            address,
            port,
            class: DeviceClass::Unknown,
            mac: None,
        }
    }

    pub fn with_class(mut self, class: DeviceClass) -> Self {
        self.class = class;
        self
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.address, self.port)
    }
}

impl fmt::Display for DeviceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.socket_addr())
    }
}
