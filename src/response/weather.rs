//! Typed view of a current-weather document.

use super::JsonDocument;
use serde::Deserialize;
use std::fmt;

/// The few fields worth a one-line summary.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct WeatherSummary {
    /// City name.
    pub name: String,
    /// Temperature and humidity.
    pub main: Readings,
    /// Conditions, most significant first.
    #[serde(default)]
    pub weather: Vec<Condition>,
}

/// The `main` object of the response.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Readings {
    /// Temperature in the requested units.
    pub temp: f64,
    /// Relative humidity in percent.
    #[serde(default)]
    pub humidity: Option<f64>,
}

/// One entry of the `weather` array.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Condition {
    /// Human-readable description, e.g. "clear sky".
    pub description: String,
}

impl WeatherSummary {
    /// Extract the summary, or `None` if the document has another shape
    /// (an API error body, for instance).
    pub fn from_document(doc: &JsonDocument) -> Option<Self> {
        Self::deserialize(doc.root()).ok()
    }
}

impl fmt::Display for WeatherSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.main.temp)?;
        if let Some(humidity) = self.main.humidity {
            write!(f, ", humidity {}%", humidity)?;
        }
        if let Some(condition) = self.weather.first() {
            write!(f, ", {}", condition.description)?;
        }
        Ok(())
    }
}
