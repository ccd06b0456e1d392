use chrono::{Local, SecondsFormat};
use serde::{Deserialize, Serialize};

/// Unit label for temperature measurements.
pub const UNIT_CELSIUS: &str = "°C";

/// Unit label for relative humidity measurements.
pub const UNIT_PERCENT: &str = "%";

/// A single sensor value as published on the bus.
///
/// Serializes to `{"value": <f64>, "timestamp": "<ISO-8601>", "unit": "<unit>"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    /// The measured value.
    pub value: f64,

    /// ISO-8601 local time at which the value was published.
    pub timestamp: String,

    /// Unit of measurement (e.g., "°C", "%").
    pub unit: String,
}

impl Measurement {
    /// Create a measurement with an explicit timestamp.
    ///
    /// Values published together share one timestamp, so it is captured by
    /// the caller rather than here.
    pub fn new(value: f64, timestamp: impl Into<String>, unit: impl Into<String>) -> Self {
        Self {
            value,
            timestamp: timestamp.into(),
            unit: unit.into(),
        }
    }

    /// Temperature in degrees Celsius.
    pub fn celsius(value: f64, timestamp: impl Into<String>) -> Self {
        Self::new(value, timestamp, UNIT_CELSIUS)
    }

    /// Relative humidity in percent.
    pub fn percent(value: f64, timestamp: impl Into<String>) -> Self {
        Self::new(value, timestamp, UNIT_PERCENT)
    }
}

/// Current local time as an ISO-8601 / RFC 3339 string with microseconds.
pub fn current_timestamp() -> String {
    Local::now().to_rfc3339_opts(SecondsFormat::Micros, false)
}
