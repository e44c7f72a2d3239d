//! Host network provider.
//!
//! On host systems, the OS handles networking. This provider is a thin wrapper
//! that reports the system's network status.

use super::{connect_tcp, LinkInfo, LinkStatus, NetworkError, NetworkProvider};
use crate::config::WifiConfig;
use log::info;
use std::net::{IpAddr, TcpStream};
use std::time::Duration;

/// Host network provider.
///
/// On host systems, networking is always available via the OS.
/// There is no radio, so MAC, BSSID, RSSI and encryption are unknown.
pub struct HostNetwork {
    ip_addr: Option<IpAddr>,
    ssid: Option<String>,
}

impl HostNetwork {
    /// Create a new host network provider.
    pub fn new() -> Self {
        Self {
            ip_addr: None,
            ssid: None,
        }
    }

    /// Get the primary local IP address.
    ///
    /// This uses a trick: create a UDP socket and "connect" to a public IP
    /// (doesn't actually send anything), then check which local address was chosen.
    fn detect_local_ip() -> Option<IpAddr> {
        use std::net::UdpSocket;

        let socket = UdpSocket::bind("0.0.0.0:0").ok()?;
        socket.connect("8.8.8.8:80").ok()?;
        let local_addr = socket.local_addr().ok()?;
        Some(local_addr.ip())
    }
}

impl Default for HostNetwork {
    fn default() -> Self {
        Self::new()
    }
}

impl NetworkProvider for HostNetwork {
    type Stream = TcpStream;

    fn status(&self) -> LinkStatus {
        // The actual connection will fail at socket level if not
        LinkStatus::Connected
    }

    fn firmware_version(&self) -> Option<String> {
        None
    }

    fn begin(&mut self, config: &WifiConfig) -> LinkStatus {
        self.ip_addr = Self::detect_local_ip();
        self.ssid = Some(config.ssid.clone());

        match self.ip_addr {
            Some(ip) => info!("Host network ready, local IP: {}", ip),
            None => info!("Host network ready, no default route detected"),
        }

        LinkStatus::Connected
    }

    fn link_info(&self) -> LinkInfo {
        LinkInfo {
            ip: self.ip_addr,
            ssid: self.ssid.clone(),
            ..LinkInfo::default()
        }
    }

    fn open(
        &mut self,
        host: &str,
        port: u16,
        read_timeout: Option<Duration>,
    ) -> Result<TcpStream, NetworkError> {
        connect_tcp(host, port, read_timeout)
    }
}
