//! Weather API endpoint and query parameters.

use super::ConfigError;
use std::fmt;
use std::str::FromStr;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// An HTTP endpoint serving the current-weather API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeatherEndpoint {
    /// Hostname, also sent as the `Host` header.
    pub host: &'static str,
    /// TCP port (plaintext HTTP).
    pub port: u16,
}

impl WeatherEndpoint {
    /// Create a new endpoint.
    pub const fn new(host: &'static str, port: u16) -> Self {
        Self { host, port }
    }

    /// Get the address string for connection (host:port).
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// OpenWeatherMap over plain HTTP.
pub const OPENWEATHERMAP: WeatherEndpoint = WeatherEndpoint::new("api.openweathermap.org", 80);

/// Path of the current-weather resource.
pub const WEATHER_PATH: &str = "/data/2.5/weather";

/// Default latitude (Salt Lake City).
pub const DEFAULT_LAT: &str = "40.7608";

/// Default longitude (Salt Lake City).
pub const DEFAULT_LON: &str = "-111.8910";

/// Measurement units accepted by the API.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Units {
    /// Kelvin, meters/sec.
    Standard,
    /// Celsius, meters/sec.
    Metric,
    /// Fahrenheit, miles/hour.
    #[default]
    Imperial,
}

impl Units {
    /// Query-string value.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::Metric => "metric",
            Self::Imperial => "imperial",
        }
    }
}

impl FromStr for Units {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "standard" => Ok(Self::Standard),
            "metric" => Ok(Self::Metric),
            "imperial" => Ok(Self::Imperial),
            _ => Err(ConfigError::InvalidValue {
                key: "WEATHER_UNITS",
                value: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for Units {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Query sent to the current-weather resource.
///
/// Coordinates are kept as the text they were configured with so the URL
/// carries exactly those digits.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct WeatherQuery {
    /// Latitude in decimal degrees.
    pub lat: String,
    /// Longitude in decimal degrees.
    pub lon: String,
    /// Measurement units.
    #[zeroize(skip)]
    pub units: Units,
    /// Number of results requested.
    pub cnt: u8,
    /// API key (`appid`).
    pub api_key: String,
}

impl WeatherQuery {
    /// Create a query for the default location.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            lat: DEFAULT_LAT.to_string(),
            lon: DEFAULT_LON.to_string(),
            units: Units::default(),
            cnt: 1,
            api_key: api_key.into(),
        }
    }

    /// Request target: path plus query string.
    pub fn request_target(&self) -> String {
        format!(
            "{}?lat={}&lon={}&units={}&cnt={}&appid={}",
            WEATHER_PATH, self.lat, self.lon, self.units, self.cnt, self.api_key
        )
    }
}

impl fmt::Debug for WeatherQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeatherQuery")
            .field("lat", &self.lat)
            .field("lon", &self.lon)
            .field("units", &self.units)
            .field("cnt", &self.cnt)
            .field("api_key", &"****")
            .finish()
    }
}

/// Check a coordinate parses as a number in range, returning it unchanged.
pub(crate) fn validate_coordinate(
    key: &'static str,
    value: &str,
    limit: f64,
) -> Result<String, ConfigError> {
    let trimmed = value.trim();
    match trimmed.parse::<f64>() {
        Ok(v) if v.is_finite() && v.abs() <= limit => Ok(trimmed.to_string()),
        _ => Err(ConfigError::InvalidValue {
            key,
            value: value.to_string(),
        }),
    }
}
