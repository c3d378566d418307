use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use serde::Deserialize;

use crate::types::Id;
use crate::{Error, Result};

pub const DEFAULT_BASE_URL: &str = "https://marapi.myacurite.com";
pub const DEFAULT_REFRESH_INTERVAL_SECONDS: u64 = 300;
pub const DEFAULT_REQUEST_TIMEOUT_SECONDS: u64 = 30;
pub const DEFAULT_BATTERY_LOW_THRESHOLD: f64 = 20.0;
pub const DEFAULT_DEVICE_CODES: &[&str] = &["5in1WS", "2in1T"];
pub const DEFAULT_SENSOR_CODES: &[&str] = &["Temperature", "Humidity"];

/// Platform configuration block as handed over by the host.
#[derive(Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub account_id: Option<Id>,
    #[serde(default)]
    pub refresh_interval_seconds: Option<u64>,
    #[serde(default)]
    pub supported_device_codes: Vec<String>,
    #[serde(default)]
    pub supported_sensor_codes: Vec<String>,
    #[serde(default)]
    pub battery_low_threshold: Option<f64>,
    #[serde(default)]
    pub name_overrides: HashMap<String, String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub request_timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl Config {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: Some(email.into()),
            password: Some(password.into()),
            ..Self::default()
        }
    }

    pub fn from_json_str(s: &str) -> Result<Self> {
        serde_json::from_str(s).map_err(|e| Error::Config(format!("invalid config: {e}")))
    }

    pub fn validate(&self) -> Result<()> {
        self.credentials().map(|_| ())
    }

    pub fn credentials(&self) -> Result<Credentials> {
        match (non_empty(&self.email), non_empty(&self.password)) {
            (Some(email), Some(password)) => Ok(Credentials {
                email: email.to_string(),
                password: password.to_string(),
            }),
            _ => Err(Error::Config(
                "missing required config: email and password are required".to_string(),
            )),
        }
    }

    pub fn account_override(&self) -> Option<String> {
        self.account_id
            .as_ref()
            .map(Id::to_string)
            .filter(|id| !id.trim().is_empty())
    }

    pub fn refresh_interval(&self) -> Duration {
        let secs = match self.refresh_interval_seconds {
            Some(0) | None => DEFAULT_REFRESH_INTERVAL_SECONDS,
            Some(s) => s,
        };
        Duration::from_secs(secs)
    }

    pub fn request_timeout(&self) -> Duration {
        let secs = match self.request_timeout_seconds {
            Some(0) | None => DEFAULT_REQUEST_TIMEOUT_SECONDS,
            Some(s) => s,
        };
        Duration::from_secs(secs)
    }

    pub fn device_codes(&self) -> Vec<String> {
        or_defaults(&self.supported_device_codes, DEFAULT_DEVICE_CODES)
    }

    pub fn sensor_codes(&self) -> Vec<String> {
        or_defaults(&self.supported_sensor_codes, DEFAULT_SENSOR_CODES)
    }

    pub fn battery_threshold(&self) -> f64 {
        self.battery_low_threshold
            .unwrap_or(DEFAULT_BATTERY_LOW_THRESHOLD)
    }

    pub fn base_url(&self) -> String {
        non_empty(&self.base_url)
            .unwrap_or(DEFAULT_BASE_URL)
            .trim_end_matches('/')
            .to_string()
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("email", &self.email)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("account_id", &self.account_id)
            .field("refresh_interval_seconds", &self.refresh_interval_seconds)
            .field("supported_device_codes", &self.supported_device_codes)
            .field("supported_sensor_codes", &self.supported_sensor_codes)
            .field("battery_low_threshold", &self.battery_low_threshold)
            .field("name_overrides", &self.name_overrides)
            .field("base_url", &self.base_url)
            .field("request_timeout_seconds", &self.request_timeout_seconds)
            .finish()
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

fn or_defaults(configured: &[String], defaults: &[&str]) -> Vec<String> {
    if configured.is_empty() {
        defaults.iter().map(|s| s.to_string()).collect()
    } else {
        configured.to_vec()
    }
}
