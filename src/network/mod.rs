//! Network abstraction layer.
//!
//! This module provides a platform-independent network interface that works on:
//! - **ESP32** (`esp32` feature): WiFi station via ESP-IDF
//! - **Host**: Native OS networking
//!
//! # Example
//!
//! ```ignore
//! use weather_fetch_esp32::network::{LinkStatus, NetworkProvider};
//!
//! #[cfg(feature = "esp32")]
//! let mut network = network::WifiNetwork::new(modem, sysloop)?;
//!
//! #[cfg(not(feature = "esp32"))]
//! let mut network = network::HostNetwork::new();
//!
//! // Same code for both platforms
//! while network.begin(&config.wifi) != LinkStatus::Connected {}
//! let stream = network.open("api.openweathermap.org", 80, None)?;
//! ```

use crate::config::WifiConfig;
use log::{debug, error, info, warn};
use std::fmt;
use std::io::{self, Read, Write};
use std::net::{IpAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

#[cfg(feature = "esp32")]
mod wifi;

#[cfg(not(feature = "esp32"))]
mod host;

#[cfg(feature = "esp32")]
pub use wifi::WifiNetwork;

#[cfg(not(feature = "esp32"))]
pub use host::HostNetwork;

/// Radio status as reported by the WiFi driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkStatus {
    /// Radio present but not associated with an access point.
    Idle,
    /// Associated and holding an IP address.
    Connected,
    /// No WiFi hardware available.
    NoShield,
}

impl fmt::Display for LinkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Connected => write!(f, "connected"),
            Self::NoShield => write!(f, "no shield"),
        }
    }
}

/// A 6-byte hardware address (station MAC or access point BSSID).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MacAddress(pub [u8; 6]);

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            a, b, c, d, e, g
        )
    }
}

/// Authentication mode of the associated access point.
///
/// Raw codes follow ESP-IDF's `wifi_auth_mode_t`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encryption {
    Open,
    Wep,
    WpaPsk,
    Wpa2Psk,
    WpaWpa2Psk,
    Wpa2Enterprise,
    Wpa3Psk,
    Wpa2Wpa3Psk,
    WapiPsk,
    /// A mode this crate does not name.
    Unknown(u8),
}

impl Encryption {
    /// Decode a driver auth mode code.
    pub fn from_code(code: u8) -> Self {
        match code {
            0 => Self::Open,
            1 => Self::Wep,
            2 => Self::WpaPsk,
            3 => Self::Wpa2Psk,
            4 => Self::WpaWpa2Psk,
            5 => Self::Wpa2Enterprise,
            6 => Self::Wpa3Psk,
            7 => Self::Wpa2Wpa3Psk,
            8 => Self::WapiPsk,
            other => Self::Unknown(other),
        }
    }

    /// The driver auth mode code.
    pub fn code(&self) -> u8 {
        match self {
            Self::Open => 0,
            Self::Wep => 1,
            Self::WpaPsk => 2,
            Self::Wpa2Psk => 3,
            Self::WpaWpa2Psk => 4,
            Self::Wpa2Enterprise => 5,
            Self::Wpa3Psk => 6,
            Self::Wpa2Wpa3Psk => 7,
            Self::WapiPsk => 8,
            Self::Unknown(code) => *code,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Wep => "WEP",
            Self::WpaPsk => "WPA-PSK",
            Self::Wpa2Psk => "WPA2-PSK",
            Self::WpaWpa2Psk => "WPA/WPA2-PSK",
            Self::Wpa2Enterprise => "WPA2-Enterprise",
            Self::Wpa3Psk => "WPA3-PSK",
            Self::Wpa2Wpa3Psk => "WPA2/WPA3-PSK",
            Self::WapiPsk => "WAPI-PSK",
            Self::Unknown(_) => "unknown",
        }
    }
}

impl fmt::Display for Encryption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (0x{:X})", self.name(), self.code())
    }
}

/// Details of the current link, for diagnostics.
///
/// Fields are `None` where the platform cannot report them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkInfo {
    /// Local IP address.
    pub ip: Option<IpAddr>,
    /// Station MAC address.
    pub mac: Option<MacAddress>,
    /// SSID of the associated network.
    pub ssid: Option<String>,
    /// MAC address of the access point.
    pub bssid: Option<MacAddress>,
    /// Received signal strength in dBm.
    pub rssi: Option<i8>,
    /// Access point authentication mode.
    pub encryption: Option<Encryption>,
}

/// Network provider abstraction.
///
/// This trait abstracts over platform-specific WiFi bring-up and socket
/// creation, allowing the same fetch sequence to run on ESP32 and host.
pub trait NetworkProvider {
    /// Byte stream returned by [`open`](Self::open).
    type Stream: Read + Write;

    /// Current radio status.
    fn status(&self) -> LinkStatus;

    /// Firmware version reported by the radio, if it has one.
    fn firmware_version(&self) -> Option<String>;

    /// Make one attempt to join the network.
    ///
    /// Failures are logged and reported as [`LinkStatus::Idle`].
    fn begin(&mut self, config: &WifiConfig) -> LinkStatus;

    /// Details of the current link.
    fn link_info(&self) -> LinkInfo;

    /// Open a plaintext TCP connection.
    ///
    /// The connect call itself has no timeout. `read_timeout` applies to
    /// reads on the returned stream.
    fn open(
        &mut self,
        host: &str,
        port: u16,
        read_timeout: Option<Duration>,
    ) -> Result<Self::Stream, NetworkError>;
}

/// Resolve `host` and connect to the first address that accepts.
///
/// Shared by both providers since ESP-IDF exposes lwIP through `std::net`.
pub fn connect_tcp(
    host: &str,
    port: u16,
    read_timeout: Option<Duration>,
) -> Result<TcpStream, NetworkError> {
    let addrs: Vec<_> = (host, port)
        .to_socket_addrs()
        .map_err(|e| {
            error!("DNS resolution failed for {}: {}", host, e);
            NetworkError::DnsResolution(e)
        })?
        .collect();

    if addrs.is_empty() {
        error!("No addresses found for {}", host);
        return Err(NetworkError::NoAddresses);
    }

    let mut last_error = None;
    for addr in addrs {
        debug!("Resolved {} to {}", host, addr);
        match TcpStream::connect(addr) {
            Ok(stream) => {
                if let Err(e) = stream.set_read_timeout(read_timeout) {
                    warn!("Failed to set read timeout: {}", e);
                }
                if let Err(e) = stream.set_nodelay(true) {
                    warn!("Failed to disable Nagle's algorithm: {}", e);
                }
                info!("Connected to {} at {}", host, addr);
                return Ok(stream);
            }
            Err(e) => {
                warn!("TCP connection failed to {}: {}", addr, e);
                last_error = Some(e);
            }
        }
    }

    Err(NetworkError::Connection(last_error.unwrap_or_else(|| {
        io::Error::new(io::ErrorKind::NotConnected, "no address accepted")
    })))
}

/// Network errors.
#[derive(Debug)]
pub enum NetworkError {
    /// No WiFi hardware available.
    NoShield,
    /// Credentials rejected by the driver.
    InvalidCredentials,
    /// DNS resolution failed.
    DnsResolution(io::Error),
    /// No addresses found for hostname.
    NoAddresses,
    /// TCP connection failed.
    Connection(io::Error),
    /// ESP-IDF driver error.
    #[cfg(feature = "esp32")]
    Esp(esp_idf_sys::EspError),
}

impl fmt::Display for NetworkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoShield => write!(f, "WiFi hardware not present"),
            Self::InvalidCredentials => write!(f, "credentials rejected by driver"),
            Self::DnsResolution(e) => write!(f, "DNS resolution failed: {}", e),
            Self::NoAddresses => write!(f, "no addresses found for hostname"),
            Self::Connection(e) => write!(f, "connection failed: {}", e),
            #[cfg(feature = "esp32")]
            Self::Esp(e) => write!(f, "ESP error: {:?}", e),
        }
    }
}

impl std::error::Error for NetworkError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::DnsResolution(e) | Self::Connection(e) => Some(e),
            _ => None,
        }
    }
}

#[cfg(feature = "esp32")]
impl From<esp_idf_sys::EspError> for NetworkError {
    fn from(e: esp_idf_sys::EspError) -> Self {
        Self::Esp(e)
    }
}
