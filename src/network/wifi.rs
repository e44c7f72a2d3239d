//! ESP32 WiFi network provider.
//!
//! Wraps the ESP-IDF WiFi driver in station mode. Sockets go through lwIP
//! via `std::net`, so [`connect_tcp`] is shared with the host provider.

use super::{
    connect_tcp, Encryption, LinkInfo, LinkStatus, MacAddress, NetworkError, NetworkProvider,
};
use crate::config::WifiConfig;
use esp_idf_hal::modem::Modem;
use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::wifi::{AuthMethod, BlockingWifi, ClientConfiguration, Configuration, EspWifi};
use esp_idf_sys::EspError;
use log::{debug, error, info, warn};
use std::ffi::CStr;
use std::net::TcpStream;
use std::time::Duration;

/// WiFi-based network provider for ESP32.
///
/// A provider whose driver failed to come up has no radio and reports
/// [`LinkStatus::NoShield`].
pub struct WifiNetwork<'a> {
    /// ESP-IDF WiFi driver, `None` when bring-up failed.
    wifi: Option<BlockingWifi<EspWifi<'a>>>,
}

impl<'a> WifiNetwork<'a> {
    /// Bring up the WiFi driver on `modem`.
    ///
    /// Never fails: a driver error leaves the provider without a radio.
    pub fn new(modem: Modem, sysloop: EspSystemEventLoop) -> Self {
        let wifi = EspWifi::new(modem, sysloop.clone(), None)
            .and_then(|esp_wifi| BlockingWifi::wrap(esp_wifi, sysloop));

        match wifi {
            Ok(wifi) => Self { wifi: Some(wifi) },
            Err(e) => {
                error!("WiFi driver init failed: {:?}", e);
                Self { wifi: None }
            }
        }
    }

    fn driver(&mut self) -> Result<&mut BlockingWifi<EspWifi<'a>>, NetworkError> {
        self.wifi.as_mut().ok_or(NetworkError::NoShield)
    }

    fn try_begin(&mut self, config: &WifiConfig) -> Result<(), NetworkError> {
        let auth_method = if config.is_open() {
            AuthMethod::None
        } else {
            AuthMethod::WPA2Personal
        };

        let wifi_config = Configuration::Client(ClientConfiguration {
            ssid: config
                .ssid
                .as_str()
                .try_into()
                .map_err(|_| NetworkError::InvalidCredentials)?,
            password: config
                .password
                .as_str()
                .try_into()
                .map_err(|_| NetworkError::InvalidCredentials)?,
            auth_method,
            ..Default::default()
        });

        let wifi = self.driver()?;
        wifi.set_configuration(&wifi_config)?;

        if !wifi.is_started()? {
            wifi.start()?;
        }

        wifi.connect()?;
        wifi.wait_netif_up()?;

        Ok(())
    }

    /// Record of the access point we are associated with.
    fn ap_record() -> Option<esp_idf_sys::wifi_ap_record_t> {
        // SAFETY: all-zero is a valid bit pattern for this plain C struct
        let mut record: esp_idf_sys::wifi_ap_record_t = unsafe { std::mem::zeroed() };
        // SAFETY: `record` is a valid out-pointer for the duration of the call
        let result = unsafe { esp_idf_sys::esp_wifi_sta_get_ap_info(&mut record) };
        EspError::convert(result).ok().map(|_| record)
    }
}

impl NetworkProvider for WifiNetwork<'_> {
    type Stream = TcpStream;

    fn status(&self) -> LinkStatus {
        let Some(wifi) = self.wifi.as_ref() else {
            return LinkStatus::NoShield;
        };
        let connected = wifi.is_connected().unwrap_or(false);
        let up = wifi.wifi().is_up().unwrap_or(false);
        if connected && up {
            LinkStatus::Connected
        } else {
            LinkStatus::Idle
        }
    }

    fn firmware_version(&self) -> Option<String> {
        // SAFETY: ESP-IDF returns a pointer to a static NUL-terminated string
        let version = unsafe { CStr::from_ptr(esp_idf_sys::esp_get_idf_version()) };
        Some(version.to_string_lossy().into_owned())
    }

    fn begin(&mut self, config: &WifiConfig) -> LinkStatus {
        if self.wifi.is_none() {
            return LinkStatus::NoShield;
        }
        info!("Connecting to WiFi: {}", config.ssid);

        match self.try_begin(config) {
            Ok(()) => {
                info!("Connected to WiFi");
                LinkStatus::Connected
            }
            Err(e) => {
                warn!("WiFi connection attempt failed: {}", e);
                if let Some(Err(e)) = self.wifi.as_mut().map(|wifi| wifi.disconnect()) {
                    debug!("Disconnect after failed attempt: {:?}", e);
                }
                LinkStatus::Idle
            }
        }
    }

    fn link_info(&self) -> LinkInfo {
        let Some(wifi) = self.wifi.as_ref() else {
            return LinkInfo::default();
        };
        let netif = wifi.wifi().sta_netif();

        let ip = netif
            .get_ip_info()
            .ok()
            .and_then(|info| format!("{}", info.ip).parse().ok());
        let mac = netif.get_mac().ok().map(MacAddress);

        let mut info = LinkInfo {
            ip,
            mac,
            ..LinkInfo::default()
        };

        if let Some(record) = Self::ap_record() {
            let len = record
                .ssid
                .iter()
                .position(|&b| b == 0)
                .unwrap_or(record.ssid.len());
            info.ssid = Some(String::from_utf8_lossy(&record.ssid[..len]).into_owned());
            info.bssid = Some(MacAddress(record.bssid));
            info.rssi = Some(record.rssi);
            info.encryption = Some(Encryption::from_code(record.authmode as u8));
        } else {
            debug!("No access point record available");
        }

        info
    }

    fn open(
        &mut self,
        host: &str,
        port: u16,
        read_timeout: Option<Duration>,
    ) -> Result<TcpStream, NetworkError> {
        self.driver()?;
        connect_tcp(host, port, read_timeout)
    }
}
