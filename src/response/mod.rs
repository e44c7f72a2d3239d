//! Consuming the weather API response.
//!
//! Two modes are supported:
//!
//! | Mode | Headers | Body |
//! |------|---------|------|
//! | [`ResponseMode::Parse`] | skipped under a read timeout | parsed into a [`JsonDocument`] |
//! | [`ResponseMode::Echo`] | forwarded | forwarded until disconnect |

mod echo;
mod json;
mod weather;

pub use echo::echo_until_disconnect;
pub use json::{DeserializeError, JsonDocument, DEFAULT_CAPACITY, NESTING_LIMIT, SLOT_SIZE};
pub use weather::{Condition, Readings, WeatherSummary};

use crate::config::ConfigError;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Read timeout applied to the socket in parse mode.
pub const PARSE_READ_TIMEOUT: Duration = Duration::from_secs(3);

/// How the response is consumed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ResponseMode {
    /// Skip headers, parse the body as JSON.
    #[default]
    Parse,
    /// Copy every byte to the console.
    Echo,
}

impl ResponseMode {
    /// Socket read timeout this mode needs.
    pub fn read_timeout(&self) -> Option<Duration> {
        match self {
            Self::Parse => Some(PARSE_READ_TIMEOUT),
            Self::Echo => None,
        }
    }

    /// Name accepted by `WEATHER_RESPONSE_MODE`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Parse => "parse",
            Self::Echo => "echo",
        }
    }
}

impl FromStr for ResponseMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "parse" => Ok(Self::Parse),
            "echo" => Ok(Self::Echo),
            _ => Err(ConfigError::InvalidValue {
                key: "WEATHER_RESPONSE_MODE",
                value: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for ResponseMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
