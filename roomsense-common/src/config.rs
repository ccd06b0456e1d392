use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{Error, Result};

/// Smallest keep-alive interval accepted by the MQTT client.
pub const MIN_KEEPALIVE_SECS: u64 = 5;

/// MQTT broker connection configuration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MqttConfig {
    /// Broker host name or address.
    #[serde(default = "default_host")]
    pub host: String,

    /// Broker TCP port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Keep-alive interval in seconds.
    #[serde(default = "default_keepalive_secs")]
    pub keepalive_secs: u64,

    /// MQTT client identifier.
    #[serde(default = "default_client_id")]
    pub client_id: String,

    /// Topic carrying the `online` / `offline` liveness of the bridge.
    #[serde(default = "default_status_topic")]
    pub status_topic: String,

    /// How long to wait for the broker to accept the connection before the
    /// first poll cycle.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    1883
}

fn default_keepalive_secs() -> u64 {
    60
}

fn default_client_id() -> String {
    "mqtt-bridge-uart".to_string()
}

fn default_status_topic() -> String {
    "home/room1/status".to_string()
}

fn default_connect_timeout_secs() -> u64 {
    2
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            keepalive_secs: default_keepalive_secs(),
            client_id: default_client_id(),
            status_topic: default_status_topic(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

impl MqttConfig {
    /// Keep-alive interval as a `Duration`.
    pub fn keepalive(&self) -> Duration {
        Duration::from_secs(self.keepalive_secs)
    }

    /// Connection grace period as a `Duration`.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Check the settings the MQTT client would otherwise reject at runtime.
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(Error::Config("mqtt.host cannot be empty".to_string()));
        }

        if self.port == 0 {
            return Err(Error::Config("mqtt.port must be non-zero".to_string()));
        }

        if self.keepalive_secs < MIN_KEEPALIVE_SECS {
            return Err(Error::Config(format!(
                "mqtt.keepalive_secs must be at least {}",
                MIN_KEEPALIVE_SECS
            )));
        }

        if self.client_id.is_empty() || self.client_id.starts_with(char::is_whitespace) {
            return Err(Error::Config(
                "mqtt.client_id must be non-empty and not start with whitespace".to_string(),
            ));
        }

        if self.status_topic.is_empty() {
            return Err(Error::Config(
                "mqtt.status_topic cannot be empty".to_string(),
            ));
        }

        Ok(())
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable text format (default).
    #[default]
    Text,
    /// Structured JSON format.
    Json,
}

/// Common logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log output format: "text" or "json".
    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

/// Load a configuration from a JSON5 string.
pub fn parse_config<T: for<'de> Deserialize<'de>>(content: &str) -> Result<T> {
    json5::from_str(content).map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))
}
