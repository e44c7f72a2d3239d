//! Build-time configuration.
//!
//! Secrets (WiFi credentials, API key) are captured from the environment at
//! compile time so they end up in the firmware image without a separate
//! provisioning step.
//!
//! # Components
//!
//! - [`wifi`] - WiFi credential validation
//! - [`weather`] - API endpoint and query parameters
//!
//! # Keys
//!
//! | Key | Required | Default |
//! |-----|----------|---------|
//! | `WIFI_SSID` | yes | |
//! | `WIFI_PASSWORD` | no | empty (open network) |
//! | `OW_KEY` | yes | |
//! | `WEATHER_LAT` | no | `40.7608` |
//! | `WEATHER_LON` | no | `-111.8910` |
//! | `WEATHER_UNITS` | no | `imperial` |
//! | `WEATHER_RESPONSE_MODE` | no | `parse` |
//! | `WIFI_FIRMWARE_VERSION` | no | no check |

mod weather;
mod wifi;

pub use weather::{
    Units, WeatherEndpoint, WeatherQuery, DEFAULT_LAT, DEFAULT_LON, OPENWEATHERMAP, WEATHER_PATH,
};
pub use wifi::{WifiConfig, MAX_PASSWORD_LEN, MAX_SSID_LEN, MIN_PASSWORD_LEN};

use crate::response::ResponseMode;
use std::fmt;

/// Everything the fetch sequence needs.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Access point credentials.
    pub wifi: WifiConfig,
    /// Server to query.
    pub endpoint: WeatherEndpoint,
    /// Query parameters, including the API key.
    pub query: WeatherQuery,
    /// How the response is consumed.
    pub mode: ResponseMode,
    /// Firmware version the radio is expected to report, if any.
    pub expected_firmware: Option<String>,
}

impl AppConfig {
    /// Build the configuration from a key lookup.
    ///
    /// Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&'static str) -> Option<String>,
    {
        let get = |key: &'static str| lookup(key).filter(|v| !v.is_empty());

        let ssid = get("WIFI_SSID").ok_or(ConfigError::Missing("WIFI_SSID"))?;
        let password = get("WIFI_PASSWORD").unwrap_or_default();
        let wifi = WifiConfig::new(ssid, password)?;

        let mut query = WeatherQuery::new(get("OW_KEY").ok_or(ConfigError::Missing("OW_KEY"))?);
        if let Some(lat) = get("WEATHER_LAT") {
            query.lat = weather::validate_coordinate("WEATHER_LAT", &lat, 90.0)?;
        }
        if let Some(lon) = get("WEATHER_LON") {
            query.lon = weather::validate_coordinate("WEATHER_LON", &lon, 180.0)?;
        }
        if let Some(units) = get("WEATHER_UNITS") {
            query.units = units.parse()?;
        }

        let mode = match get("WEATHER_RESPONSE_MODE") {
            Some(mode) => mode.parse()?,
            None => ResponseMode::default(),
        };

        Ok(Self {
            wifi,
            endpoint: OPENWEATHERMAP,
            query,
            mode,
            expected_firmware: get("WIFI_FIRMWARE_VERSION"),
        })
    }

    /// Build the configuration from values captured when the crate was compiled.
    pub fn from_build_env() -> Result<Self, ConfigError> {
        Self::from_lookup(build_env)
    }
}

/// Values of the configuration keys at compile time.
pub fn build_env(key: &'static str) -> Option<String> {
    let value = match key {
        "WIFI_SSID" => option_env!("WIFI_SSID"),
        "WIFI_PASSWORD" => option_env!("WIFI_PASSWORD"),
        "OW_KEY" => option_env!("OW_KEY"),
        "WEATHER_LAT" => option_env!("WEATHER_LAT"),
        "WEATHER_LON" => option_env!("WEATHER_LON"),
        "WEATHER_UNITS" => option_env!("WEATHER_UNITS"),
        "WEATHER_RESPONSE_MODE" => option_env!("WEATHER_RESPONSE_MODE"),
        "WIFI_FIRMWARE_VERSION" => option_env!("WIFI_FIRMWARE_VERSION"),
        _ => None,
    };
    value.map(str::to_string)
}

/// Errors that can occur while building the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// SSID is empty.
    SsidEmpty,
    /// SSID exceeds maximum length.
    SsidTooLong { len: usize, max: usize },
    /// Password is too short for WPA2.
    PasswordTooShort { len: usize, min: usize },
    /// Password exceeds maximum length.
    PasswordTooLong { len: usize, max: usize },
    /// A required key has no value.
    Missing(&'static str),
    /// A key has a value that cannot be used.
    InvalidValue { key: &'static str, value: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SsidEmpty => write!(f, "SSID cannot be empty"),
            Self::SsidTooLong { len, max } => {
                write!(f, "SSID too long: {} bytes (max {})", len, max)
            }
            Self::PasswordTooShort { len, min } => {
                write!(f, "password too short: {} bytes (min {})", len, min)
            }
            Self::PasswordTooLong { len, max } => {
                write!(f, "password too long: {} bytes (max {})", len, max)
            }
            Self::Missing(key) => write!(f, "{} is not set", key),
            Self::InvalidValue { key, value } => write!(f, "invalid {}: {:?}", key, value),
        }
    }
}

impl std::error::Error for ConfigError {}
