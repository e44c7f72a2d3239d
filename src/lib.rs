//! ESP32 weather fetch firmware library.
//!
//! Joins WiFi, sends one GET to the OpenWeatherMap current-weather API and
//! prints the response. Everything except the ESP-IDF WiFi driver is
//! platform-independent and can be tested on the host machine.

pub mod config;
pub mod http;
pub mod network;
pub mod response;
pub mod session;

// Re-export commonly used items
pub use config::{AppConfig, ConfigError, WifiConfig};
pub use network::{LinkInfo, LinkStatus, NetworkError, NetworkProvider};
pub use response::{DeserializeError, JsonDocument, ResponseMode};
pub use session::{Outcome, Session, SessionError};
