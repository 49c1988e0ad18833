//! Configuration for the host service.

use std::net::IpAddr;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use deskbeam_core::network::device::{
    DEFAULT_DISCOVERY_INTERVAL_SECS, DEFAULT_DISCOVERY_PORT, DEFAULT_DISCOVERY_TIMEOUT_SECS,
    DEFAULT_HOST_PORT,
};
use deskbeam_core::pairing::{DEFAULT_MAX_ATTEMPTS, PairingConfig};
use deskbeam_core::protocol::AudioSettings;
use deskbeam_core::rdp::delta::{DEFAULT_BLOCK_SIZE, DEFAULT_THRESHOLD_PERCENT};
use deskbeam_core::network::transport::DEFAULT_FRAME_BUDGET;
use deskbeam_core::{DiscoveryConfig, OrchestratorConfig, TransportConfig};

/// Largest capture size accepted; a full raw frame this size still fits
/// the wire's message limit.
pub const MAX_SCREEN_WIDTH: u32 = 3840;
pub const MAX_SCREEN_HEIGHT: u32 = 2160;
const MIN_SCREEN_SIDE: u32 = 16;

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// How this host identifies itself to viewers.
    pub identity: IdentityConfig,
    pub network: NetworkConfig,
    pub pairing: PairingSection,
    pub screen: ScreenConfig,
    pub performance: PerformanceConfig,
    pub audio: AudioSection,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Stable device id. Empty means a random id per run.
    pub device_id: String,
    pub device_name: String,
}

/// Network configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Address to bind the listener to.
    pub bind_address: IpAddr,
    /// TCP port viewers connect to.
    pub listen_port: u16,
    /// Announce this host on the LAN.
    pub discovery: bool,
    /// UDP port for presence broadcasts.
    pub discovery_port: u16,
    pub discovery_interval_secs: u64,
    pub discovery_timeout_secs: u64,
    /// Outbound message queue depth.
    pub send_queue: usize,
    /// Frames allowed on their way to the viewer before new ones are dropped.
    pub frame_budget: usize,
    /// Grace period for connection teardown, in milliseconds.
    pub shutdown_grace_ms: u64,
}

/// Pairing PIN policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PairingSection {
    /// PIN lifetime in seconds.
    pub pin_ttl_secs: u64,
    /// Wrong guesses allowed before lockout.
    pub max_attempts: u32,
}

/// Screen capture configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScreenConfig {
    /// Target frames per second.
    pub fps: u8,
    pub width: u32,
    pub height: u32,
    /// Block size for delta detection (pixels).
    pub block_size: usize,
    /// Changed-area percentage above which full frames are sent.
    pub delta_threshold_percent: f64,
}

/// Performance tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformanceConfig {
    /// Interval between quality reports, in milliseconds.
    pub quality_interval_ms: u64,
    /// Enable adaptive quality adjustment.
    pub adaptive_quality: bool,
}

/// Audio streaming (host to viewer).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioSection {
    pub enabled: bool,
    pub sample_rate: u32,
    pub channels: u16,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            device_id: String::new(),
            device_name: "deskbeam-host".into(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::from([0, 0, 0, 0]),
            listen_port: DEFAULT_HOST_PORT,
            discovery: true,
            discovery_port: DEFAULT_DISCOVERY_PORT,
            discovery_interval_secs: DEFAULT_DISCOVERY_INTERVAL_SECS,
            discovery_timeout_secs: DEFAULT_DISCOVERY_TIMEOUT_SECS,
            send_queue: 256,
            frame_budget: DEFAULT_FRAME_BUDGET,
            shutdown_grace_ms: 2000,
        }
    }
}

impl Default for PairingSection {
    fn default() -> Self {
        Self {
            pin_ttl_secs: 5 * 60,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl Default for ScreenConfig {
    fn default() -> Self {
        Self {
            fps: 30,
            width: 1280,
            height: 720,
            block_size: DEFAULT_BLOCK_SIZE,
            delta_threshold_percent: DEFAULT_THRESHOLD_PERCENT,
        }
    }
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            quality_interval_ms: 2000,
            adaptive_quality: true,
        }
    }
}

impl Default for AudioSection {
    fn default() -> Self {
        Self {
            enabled: false,
            sample_rate: 48_000,
            channels: 2,
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

impl HostConfig {
    /// Load configuration from a TOML file, falling back to defaults.
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

    /// Write the default configuration to a file (for bootstrapping).
    pub fn write_default(path: &Path) -> std::io::Result<()> {
        let text = toml::to_string_pretty(&Self::default()).map_err(std::io::Error::other)?;
        std::fs::write(path, text)
    }

    /// Frame interval derived from the configured fps (clamped to 1..=60).
    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.screen.fps.clamp(1, 60) as f64)
    }

    /// Capture size, clamped to 16x16..=3840x2160.
    pub fn screen_size(&self) -> (u32, u32) {
        (
            self.screen.width.clamp(MIN_SCREEN_SIDE, MAX_SCREEN_WIDTH),
            self.screen.height.clamp(MIN_SCREEN_SIDE, MAX_SCREEN_HEIGHT),
        )
    }

    pub fn audio_settings(&self) -> AudioSettings {
        AudioSettings {
            sample_rate: self.audio.sample_rate.clamp(8_000, 192_000),
            channels: self.audio.channels.clamp(1, 8),
            enabled: self.audio.enabled,
        }
    }

    /// Discovery settings, or `None` when announcements are disabled.
    pub fn discovery_config(&self) -> Option<DiscoveryConfig> {
        self.network.discovery.then(|| DiscoveryConfig {
            port: self.network.discovery_port,
            interval: Duration::from_secs(self.network.discovery_interval_secs.max(1)),
            timeout: Duration::from_secs(self.network.discovery_timeout_secs.max(1)),
            ..DiscoveryConfig::default()
        })
    }

    /// Convert into an `OrchestratorConfig`, clamping out-of-range values.
    pub fn to_orchestrator_config(&self) -> OrchestratorConfig {
        let defaults = OrchestratorConfig::default();
        OrchestratorConfig {
            host_id: if self.identity.device_id.is_empty() {
                defaults.host_id
            } else {
                self.identity.device_id.clone()
            },
            host_name: self.identity.device_name.clone(),
            listen_port: self.network.listen_port,
            transport: TransportConfig {
                bind_address: self.network.bind_address,
                queue_capacity: self.network.send_queue.max(1),
                frame_budget: self.network.frame_budget.max(1),
                shutdown_grace: Duration::from_millis(self.network.shutdown_grace_ms),
                ..TransportConfig::default()
            },
            pairing: PairingConfig {
                ttl: Duration::from_secs(self.pairing.pin_ttl_secs.max(1)),
                max_attempts: self.pairing.max_attempts.max(1),
            },
            block_size: self.screen.block_size.clamp(8, 256),
            delta_threshold_percent: self.screen.delta_threshold_percent.clamp(0.0, 100.0),
            quality_interval: Duration::from_millis(self.performance.quality_interval_ms.max(100)),
            adaptive_quality: self.performance.adaptive_quality,
            ..defaults
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
