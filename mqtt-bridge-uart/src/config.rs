//! Configuration for the UART bridge.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use roomsense_bridge_framework::{BridgeConfig, BridgeError, LoggingConfig, MqttConfig, Result};

/// Complete bridge configuration.
///
/// Every section is optional; an empty file yields a collector polling
/// `/dev/ttyUSB0` at 9600 baud and publishing to `localhost:1883`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UartBridgeConfig {
    /// MQTT connection settings
    #[serde(default)]
    pub mqtt: MqttConfig,

    /// Serial port settings
    #[serde(default)]
    pub serial: SerialConfig,

    /// Topics for published readings
    #[serde(default)]
    pub topics: TopicsConfig,

    /// Poll cycle timing
    #[serde(default)]
    pub timing: TimingConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Serial port configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerialConfig {
    /// Serial port path (e.g., "/dev/ttyUSB0" or "COM3")
    #[serde(default = "default_port")]
    pub port: String,

    /// Baud rate (default: 9600)
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    /// Data bits (default: 8)
    #[serde(default = "default_data_bits")]
    pub data_bits: u8,

    /// Parity: "none", "even", or "odd" (default: "none")
    #[serde(default = "default_parity")]
    pub parity: String,

    /// Stop bits: 1 or 2 (default: 1)
    #[serde(default = "default_stop_bits")]
    pub stop_bits: u8,

    /// How long a line read may wait for data, in milliseconds
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,

    /// Single ASCII character sent to request a reading
    #[serde(default = "default_command")]
    pub command: String,
}

fn default_port() -> String {
    "/dev/ttyUSB0".to_string()
}

fn default_baud_rate() -> u32 {
    9600
}

fn default_data_bits() -> u8 {
    8
}

fn default_parity() -> String {
    "none".to_string()
}

fn default_stop_bits() -> u8 {
    1
}

fn default_read_timeout_ms() -> u64 {
    1000
}

fn default_command() -> String {
    "R".to_string()
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            baud_rate: default_baud_rate(),
            data_bits: default_data_bits(),
            parity: default_parity(),
            stop_bits: default_stop_bits(),
            read_timeout_ms: default_read_timeout_ms(),
            command: default_command(),
        }
    }
}

impl SerialConfig {
    /// Read timeout as a `Duration`.
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    /// The request command as a byte, if it is a single ASCII character.
    pub fn command_byte(&self) -> Option<u8> {
        match self.command.as_bytes() {
            [byte] if byte.is_ascii() => Some(*byte),
            _ => None,
        }
    }
}

/// Topics the readings are published to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicsConfig {
    /// Temperature topic
    #[serde(default = "default_temperature_topic")]
    pub temperature: String,

    /// Humidity topic
    #[serde(default = "default_humidity_topic")]
    pub humidity: String,
}

fn default_temperature_topic() -> String {
    "home/room1/temperature".to_string()
}

fn default_humidity_topic() -> String {
    "home/room1/humidity".to_string()
}

impl Default for TopicsConfig {
    fn default() -> Self {
        Self {
            temperature: default_temperature_topic(),
            humidity: default_humidity_topic(),
        }
    }
}

/// Poll cycle timing.
///
/// A cycle is: request, settle delay, read/parse/publish, interval delay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimingConfig {
    /// Wait between sending the request and reading the response, in milliseconds
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,

    /// Wait after a cycle before the next request, in milliseconds
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
}

fn default_settle_ms() -> u64 {
    1000
}

fn default_interval_ms() -> u64 {
    4000
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            settle_ms: default_settle_ms(),
            interval_ms: default_interval_ms(),
        }
    }
}

impl TimingConfig {
    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// Length of one full cycle when the sensor answers within the settle
    /// delay or stays silent.
    pub fn cycle_period(&self) -> Duration {
        self.settle() + self.interval()
    }
}

impl BridgeConfig for UartBridgeConfig {
    fn mqtt(&self) -> &MqttConfig {
        &self.mqtt
    }

    fn logging(&self) -> &LoggingConfig {
        &self.logging
    }

    fn validate(&self) -> Result<()> {
        self.validate_mqtt()?;

        let serial = &self.serial;
        if serial.port.trim().is_empty() {
            return Err(BridgeError::validation("serial.port cannot be empty"));
        }

        if serial.baud_rate == 0 {
            return Err(BridgeError::validation("serial.baud_rate must be non-zero"));
        }

        if !(5..=8).contains(&serial.data_bits) {
            return Err(BridgeError::validation(format!(
                "serial.data_bits must be 5-8, got {}",
                serial.data_bits
            )));
        }

        match serial.parity.to_lowercase().as_str() {
            "none" | "even" | "odd" => {}
            other => {
                return Err(BridgeError::validation(format!(
                    "invalid serial.parity '{}' (use none, even, or odd)",
                    other
                )));
            }
        }

        if !matches!(serial.stop_bits, 1 | 2) {
            return Err(BridgeError::validation(format!(
                "serial.stop_bits must be 1 or 2, got {}",
                serial.stop_bits
            )));
        }

        if serial.read_timeout_ms == 0 {
            return Err(BridgeError::validation(
                "serial.read_timeout_ms must be non-zero",
            ));
        }

        if serial.command_byte().is_none() {
            return Err(BridgeError::validation(format!(
                "serial.command must be a single ASCII character, got '{}'",
                serial.command
            )));
        }

        if self.topics.temperature.is_empty() || self.topics.humidity.is_empty() {
            return Err(BridgeError::validation("topics cannot be empty"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use roomsense_common::parse_config;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: UartBridgeConfig = parse_config("{}").unwrap();
        config.validate().unwrap();

        assert_eq!(config.serial.port, "/dev/ttyUSB0");
        assert_eq!(config.serial.baud_rate, 9600);
        assert_eq!(config.serial.read_timeout(), Duration::from_secs(1));
        assert_eq!(config.serial.command_byte(), Some(b'R'));
        assert_eq!(config.topics.temperature, "home/room1/temperature");
        assert_eq!(config.topics.humidity, "home/room1/humidity");
        assert_eq!(config.mqtt.status_topic, "home/room1/status");
        assert_eq!(config.timing.cycle_period(), Duration::from_secs(5));
    }

    #[test]
    fn test_parse_full_config() {
        let json = r#"{
            mqtt: { host: "192.168.1.20", port: 1884 },
            serial: { port: "COM3", baud_rate: 19200, parity: "even" },
            topics: { temperature: "lab/t", humidity: "lab/h" },
            timing: { settle_ms: 500, interval_ms: 1500 },
            logging: { level: "debug" },
        }"#;

        let config: UartBridgeConfig = parse_config(json).unwrap();
        config.validate().unwrap();

        assert_eq!(config.mqtt.host, "192.168.1.20");
        assert_eq!(config.serial.port, "COM3");
        assert_eq!(config.serial.baud_rate, 19200);
        assert_eq!(config.serial.data_bits, 8);
        assert_eq!(config.topics.temperature, "lab/t");
        assert_eq!(config.timing.cycle_period(), Duration::from_secs(2));
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_validate_command() {
        let mut config = UartBridgeConfig::default();

        config.serial.command = "RR".to_string();
        assert!(config.validate().is_err());

        config.serial.command = "°".to_string();
        assert!(config.validate().is_err());

        config.serial.command = "M".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_serial_frame() {
        let mut config = UartBridgeConfig::default();
        config.serial.parity = "mark".to_string();
        assert!(config.validate().is_err());

        let mut config = UartBridgeConfig::default();
        config.serial.stop_bits = 3;
        assert!(config.validate().is_err());

        let mut config = UartBridgeConfig::default();
        config.serial.read_timeout_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_checks_mqtt_section() {
        let mut config = UartBridgeConfig::default();
        config.mqtt.host = String::new();
        assert!(matches!(
            config.validate(),
            Err(BridgeError::ConfigValidation(_))
        ));
    }
}
