//! Viewer configuration.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use deskbeam_core::network::device::{DEFAULT_DISCOVERY_PORT, DEFAULT_HOST_PORT};
use deskbeam_core::{DeskbeamError, DiscoveryConfig, TransportConfig, ViewerConfig};

/// Top-level configuration for the viewer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerAppConfig {
    pub network: NetworkConfig,
    /// How this viewer introduces itself to the host.
    pub identity: IdentityConfig,
    pub display: DisplayConfig,
    pub logging: LoggingConfig,
}

/// Network settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Host address (IP:port). Empty means search the LAN.
    pub host_address: String,
    /// Connection timeout in milliseconds.
    pub connect_timeout_ms: u64,
    /// How long to wait for the host's pairing verdict, in milliseconds.
    pub pairing_timeout_ms: u64,
    /// UDP port hosts announce themselves on.
    pub discovery_port: u16,
    /// How long to listen for announcements, in milliseconds.
    pub discovery_wait_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Stable device id. Empty means a random id per run.
    pub device_id: String,
    pub device_name: String,
}

/// Console display settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Interval between stats lines, in milliseconds.
    pub stats_interval_ms: u64,
    /// Write the latest frame here as a PPM image on exit.
    pub snapshot_path: Option<PathBuf>,
}

/// Logging.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level.
    pub level: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            host_address: format!("127.0.0.1:{DEFAULT_HOST_PORT}"),
            connect_timeout_ms: 5000,
            pairing_timeout_ms: 10_000,
            discovery_port: DEFAULT_DISCOVERY_PORT,
            discovery_wait_ms: 6000,
        }
    }
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            device_id: String::new(),
            device_name: "deskbeam-viewer".into(),
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            stats_interval_ms: 2000,
            snapshot_path: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

// ── Loading ──────────────────────────────────────────────────────

impl ViewerAppConfig {
    /// Load from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!("invalid config {}: {e}; using defaults", path.display());
                Self::default()
            }),
            Err(_) => {
                tracing::info!("no config at {}; using defaults", path.display());
                Self::default()
            }
        }
    }

    /// Write default config to a file.
    pub fn write_default(path: &Path) -> std::io::Result<()> {
        let text = toml::to_string_pretty(&Self::default()).map_err(std::io::Error::other)?;
        std::fs::write(path, text)
    }

    /// The configured host, or `None` when the LAN should be searched.
    pub fn host_addr(&self) -> Result<Option<SocketAddr>, DeskbeamError> {
        let text = self.network.host_address.trim();
        if text.is_empty() {
            return Ok(None);
        }
        text.parse()
            .map(Some)
            .map_err(|e| DeskbeamError::Other(format!("bad host address {text:?}: {e}")))
    }

    pub fn stats_interval(&self) -> Duration {
        Duration::from_millis(self.display.stats_interval_ms.max(100))
    }

    pub fn discovery_config(&self) -> DiscoveryConfig {
        DiscoveryConfig {
            port: self.network.discovery_port,
            ..DiscoveryConfig::default()
        }
    }

    pub fn discovery_wait(&self) -> Duration {
        Duration::from_millis(self.network.discovery_wait_ms)
    }

    pub fn to_viewer_config(&self) -> ViewerConfig {
        let defaults = ViewerConfig::default();
        ViewerConfig {
            device_id: if self.identity.device_id.is_empty() {
                defaults.device_id
            } else {
                self.identity.device_id.clone()
            },
            device_name: self.identity.device_name.clone(),
            transport: TransportConfig {
                connect_timeout: Duration::from_millis(self.network.connect_timeout_ms.max(1)),
                ..TransportConfig::default()
            },
            pairing_timeout: Duration::from_millis(self.network.pairing_timeout_ms.max(1)),
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
