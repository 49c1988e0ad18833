//! UDP broadcast presence.
//!
//! A broadcaster sends its bincode-encoded [`DeviceDescriptor`] to the
//! discovery port every interval. A listener keeps a [`PeerTable`] of who
//! it has heard from and reports peers that go quiet for longer than the
//! timeout as lost.

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::collab::{Discovery, DiscoveryEvent};
use crate::error::DeskbeamError;
use crate::network::device::{
    DEFAULT_DISCOVERY_INTERVAL_SECS, DEFAULT_DISCOVERY_PORT, DEFAULT_DISCOVERY_TIMEOUT_SECS,
    DeviceDescriptor,
};

const MAX_DATAGRAM: usize = 2048;

#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    pub port: u16,
    /// Destination for announcements; the limited broadcast address by default.
    pub broadcast_address: IpAddr,
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_DISCOVERY_PORT,
            broadcast_address: IpAddr::V4(Ipv4Addr::BROADCAST),
            interval: Duration::from_secs(DEFAULT_DISCOVERY_INTERVAL_SECS),
            timeout: Duration::from_secs(DEFAULT_DISCOVERY_TIMEOUT_SECS),
        }
    }
}

// ── PeerTable ────────────────────────────────────────────────────

/// Last-seen bookkeeping for announced peers.
#[derive(Debug, Default)]
pub struct PeerTable {
    peers: HashMap<String, (DeviceDescriptor, Instant)>,
}

impl PeerTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an announcement. Returns `true` when the peer is new or its
    /// descriptor changed.
    pub fn observe(&mut self, device: DeviceDescriptor, now: Instant) -> bool {
        match self.peers.get_mut(&device.id) {
            Some((known, seen)) => {
                *seen = now;
                if *known == device {
                    false
                } else {
                    *known = device;
                    true
                }
            }
            None => {
                self.peers.insert(device.id.clone(), (device, now));
                true
            }
        }
    }

    /// Remove and return the ids of peers silent for longer than `timeout`.
    pub fn expire(&mut self, now: Instant, timeout: Duration) -> Vec<String> {
        let lost: Vec<String> = self
            .peers
            .iter()
            .filter(|(_, (_, seen))| now.saturating_duration_since(*seen) > timeout)
            .map(|(id, _)| id.clone())
            .collect();
        for id in &lost {
            self.peers.remove(id);
        }
        lost
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    pub fn devices(&self) -> Vec<DeviceDescriptor> {
        self.peers.values().map(|(d, _)| d.clone()).collect()
    }
}

/// Decode an announcement. An unspecified address is replaced with the
/// datagram's source address.
pub fn decode_announcement(bytes: &[u8], from: SocketAddr) -> Result<DeviceDescriptor, DeskbeamError> {
    let mut device: DeviceDescriptor = bincode::deserialize(bytes)?;
    if device.address.is_unspecified() {
        device.address = from.ip();
    }
    Ok(device)
}

// ── UdpDiscovery ─────────────────────────────────────────────────

pub struct UdpDiscovery {
    config: DiscoveryConfig,
    cancel: Mutex<CancellationToken>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl UdpDiscovery {
    pub fn new(config: DiscoveryConfig) -> Self {
        Self {
            config,
            cancel: Mutex::new(CancellationToken::new()),
            tasks: Mutex::new(Vec::new()),
        }
    }

    fn token(&self) -> CancellationToken {
        lock(&self.cancel).child_token()
    }
}

#[async_trait]
impl Discovery for UdpDiscovery {
    async fn start_broadcasting(&self, local: DeviceDescriptor) -> Result<(), DeskbeamError> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).await?;
        socket.set_broadcast(true)?;
        let payload = bincode::serialize(&local)?;
        let target = SocketAddr::new(self.config.broadcast_address, self.config.port);
        let interval = self.config.interval;
        let cancel = self.token();

        info!(%target, device = %local, "announcing presence");
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(10)));
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(e) = socket.send_to(&payload, target).await {
                            debug!(error = %e, "announcement not sent");
                        }
                    }
                }
            }
        });
        lock(&self.tasks).push(task);
        Ok(())
    }

    async fn start_listening(&self, events: mpsc::Sender<DiscoveryEvent>) -> Result<(), DeskbeamError> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, self.config.port)).await?;
        let timeout = self.config.timeout;
        let cancel = self.token();

        info!(port = self.config.port, "listening for peers");
        let task = tokio::spawn(async move {
            let mut table = PeerTable::new();
            let mut sweep = tokio::time::interval((timeout / 3).max(Duration::from_millis(10)));
            let mut buf = vec![0u8; MAX_DATAGRAM];
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = sweep.tick() => {
                        for id in table.expire(Instant::now(), timeout) {
                            debug!(%id, "peer lost");
                            if events.send(DiscoveryEvent::DeviceLost(id)).await.is_err() {
                                return;
                            }
                        }
                    }
                    received = socket.recv_from(&mut buf) => {
                        let (n, from) = match received {
                            Ok(r) => r,
                            Err(e) => {
                                warn!(error = %e, "discovery socket error");
                                continue;
                            }
                        };
                        match decode_announcement(&buf[..n], from) {
                            Ok(device) => {
                                if table.observe(device.clone(), Instant::now()) {
                                    debug!(%device, "peer discovered");
                                    if events.send(DiscoveryEvent::DeviceDiscovered(device)).await.is_err() {
                                        return;
                                    }
                                }
                            }
                            Err(e) => debug!(%from, error = %e, "ignoring malformed announcement"),
                        }
                    }
                }
            }
        });
        lock(&self.tasks).push(task);
        Ok(())
    }

    async fn stop(&self) -> Result<(), DeskbeamError> {
        {
            let mut cancel = lock(&self.cancel);
            cancel.cancel();
            *cancel = CancellationToken::new();
        }
        let tasks: Vec<_> = lock(&self.tasks).drain(..).collect();
        for task in tasks {
            let _ = task.await;
        }
        Ok(())
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device(id: &str, name: &str) -> DeviceDescriptor {
        DeviceDescriptor::new(id, name, IpAddr::V4(Ipv4Addr::new(192, 168, 1, 20)), 12346)
    }

    #[test]
    fn table_reports_new_and_changed_peers() {
        let mut table = PeerTable::new();
        let t0 = Instant::now();
        assert!(table.observe(device("a", "Office"), t0));
        assert!(!table.observe(device("a", "Office"), t0 + Duration::from_secs(1)));
        assert!(table.observe(device("a", "Renamed"), t0 + Duration::from_secs(2)));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn table_expires_silent_peers() {
        let mut table = PeerTable::new();
        let t0 = Instant::now();
        table.observe(device("a", "A"), t0);
        table.observe(device("b", "B"), t0 + Duration::from_secs(10));

        let timeout = Duration::from_secs(15);
        assert!(table.expire(t0 + Duration::from_secs(15), timeout).is_empty());
        assert_eq!(table.expire(t0 + Duration::from_secs(16), timeout), vec!["a".to_string()]);
        assert_eq!(table.devices(), vec![device("b", "B")]);
    }

    #[test]
    fn unspecified_address_takes_sender_ip() {
        let announced = DeviceDescriptor::new("h", "Host", IpAddr::V4(Ipv4Addr::UNSPECIFIED), 12346);
        let bytes = bincode::serialize(&announced).unwrap();
        let from: SocketAddr = "10.1.2.3:40000".parse().unwrap();

        let decoded = decode_announcement(&bytes, from).unwrap();
        assert_eq!(decoded.socket_addr().to_string(), "10.1.2.3:12346");
    }

    #[test]
    fn garbage_announcement_is_an_error() {
        let from: SocketAddr = "10.1.2.3:40000".parse().unwrap();
        assert!(decode_announcement(&[0xff], from).is_err());
    }

    #[tokio::test]
    async fn announcements_reach_a_listener() {
        let port = {
            let probe = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
            probe.local_addr().unwrap().port()
        };
        let config = DiscoveryConfig {
            port,
            broadcast_address: IpAddr::V4(Ipv4Addr::LOCALHOST),
            interval: Duration::from_millis(20),
            timeout: Duration::from_secs(5),
        };
        let listener = UdpDiscovery::new(config.clone());
        let speaker = UdpDiscovery::new(config);

        let (tx, mut rx) = mpsc::channel(8);
        listener.start_listening(tx).await.unwrap();
        speaker.start_broadcasting(device("host-1", "Office")).await.unwrap();

        let event = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event, DiscoveryEvent::DeviceDiscovered(device("host-1", "Office")));

        speaker.stop().await.unwrap();
        listener.stop().await.unwrap();
    }
}
