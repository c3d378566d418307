use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Temperature stored as Celsius internally.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Temperature(f64);

impl Temperature {
    pub fn from_celsius(c: f64) -> Self {
        Self(c)
    }

    pub fn from_fahrenheit(f: f64) -> Self {
        Self((f - 32.0) * (5.0 / 9.0))
    }

    /// Interpret a raw value in the unit the vendor charted it in.
    /// Anything other than `"F"` is taken as Celsius.
    pub fn from_unit(value: f64, unit: Option<&str>) -> Self {
        match unit {
            Some("F") => Self::from_fahrenheit(value),
            _ => Self::from_celsius(value),
        }
    }

    pub fn celsius(&self) -> f64 {
        self.0
    }

    pub fn fahrenheit(&self) -> f64 {
        self.0 * (9.0 / 5.0) + 32.0
    }
}

impl fmt::Display for Temperature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1}\u{00b0}C", self.0)
    }
}

/// Vendor identifier. The API mixes JSON numbers and strings for ids.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Id {
    Number(i64),
    Text(String),
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Id::Number(n) => write!(f, "{n}"),
            Id::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for Id {
    fn from(n: i64) -> Self {
        Id::Number(n)
    }
}

impl From<&str> for Id {
    fn from(s: &str) -> Self {
        Id::Text(s.to_string())
    }
}

/// A reading or battery value as reported: usually a number, sometimes a string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ReadingValue {
    Number(f64),
    Text(String),
}

impl ReadingValue {
    pub fn as_f64(&self) -> Option<f64> {
        let value = match self {
            ReadingValue::Number(n) => *n,
            ReadingValue::Text(s) => s.trim().parse().ok()?,
        };
        value.is_finite().then_some(value)
    }
}

impl fmt::Display for ReadingValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReadingValue::Number(n) => write!(f, "{n}"),
            ReadingValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<f64> for ReadingValue {
    fn from(n: f64) -> Self {
        ReadingValue::Number(n)
    }
}

impl From<&str> for ReadingValue {
    fn from(s: &str) -> Self {
        ReadingValue::Text(s.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Model {
    pub id: Id,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct HubSummary {
    pub id: Id,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RawDevice {
    pub model_code: String,
    pub name: String,
    pub model: Model,
    #[serde(default)]
    pub battery_level: Option<ReadingValue>,
    #[serde(default)]
    pub sensors: Vec<RawSensor>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RawSensor {
    pub id: Id,
    pub sensor_name: String,
    pub sensor_code: String,
    pub last_reading_value: ReadingValue,
    #[serde(default)]
    pub chart_unit: Option<String>,
}

/// Authenticated vendor session. Lives in memory only.
#[derive(Debug, Clone)]
pub struct Session {
    pub token_id: String,
    pub account_id: Option<String>,
    pub obtained_at: DateTime<Utc>,
}

/// Measurement channel a registry entry exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Temperature,
    Humidity,
}

impl Channel {
    pub fn from_sensor_name(name: &str) -> Option<Self> {
        match name {
            "Temperature" => Some(Channel::Temperature),
            "Humidity" => Some(Channel::Humidity),
            _ => None,
        }
    }
}

/// One (device, sensor) pair from a hub-detail payload, with device fields copied on.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorReading {
    pub id: Id,
    pub device_name: String,
    pub model: Model,
    pub battery_level: Option<ReadingValue>,
    pub sensor_name: String,
    pub sensor_code: String,
    pub last_reading_value: ReadingValue,
    pub chart_unit: Option<String>,
}

impl SensorReading {
    pub fn channel(&self) -> Option<Channel> {
        Channel::from_sensor_name(&self.sensor_name)
    }

    /// Numeric value ready for comparison and propagation.
    /// Temperatures are always returned in Celsius.
    pub fn normalized_value(&self) -> Result<f64> {
        let raw = self
            .last_reading_value
            .as_f64()
            .ok_or_else(|| Error::ValueParse {
                sensor: self.id.to_string(),
                value: self.last_reading_value.to_string(),
            })?;
        match self.channel() {
            Some(Channel::Temperature) => {
                Ok(Temperature::from_unit(raw, self.chart_unit.as_deref()).celsius())
            }
            _ => Ok(raw),
        }
    }
}

/// Descriptive fields written to a registry entry on every sighting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metadata {
    pub manufacturer: String,
    pub model: String,
    pub serial: String,
    pub display_name: String,
}
