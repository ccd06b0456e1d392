//! Error types for the bridge framework.

use thiserror::Error;

/// Result type alias using [`BridgeError`].
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Errors that can occur in a bridge.
#[derive(Error, Debug)]
pub enum BridgeError {
    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration file not found.
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: String },

    /// Configuration parse error.
    #[error("Failed to parse configuration: {0}")]
    ConfigParse(String),

    /// Configuration validation error.
    #[error("Configuration validation failed: {0}")]
    ConfigValidation(String),

    /// Worker error.
    #[error("Worker error: {0}")]
    Worker(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl BridgeError {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a configuration validation error.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::ConfigValidation(msg.into())
    }

    /// Create a worker error.
    pub fn worker(msg: impl Into<String>) -> Self {
        Self::Worker(msg.into())
    }
}

/// Errors raised by the MQTT publisher.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PublishError {
    /// The connection request could not be handed to the MQTT client.
    #[error("Failed to dispatch MQTT connect to {broker}: {message}")]
    ConnectDispatchFailed { broker: String, message: String },

    /// A publish request was rejected before reaching the broker.
    #[error("Failed to publish to {topic}: {message}")]
    SendFailed { topic: String, message: String },
}

impl PublishError {
    /// Create a connect dispatch error.
    pub fn dispatch(broker: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConnectDispatchFailed {
            broker: broker.into(),
            message: message.into(),
        }
    }

    /// Create a send error.
    pub fn send(topic: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SendFailed {
            topic: topic.into(),
            message: message.into(),
        }
    }
}

impl From<roomsense_common::Error> for BridgeError {
    fn from(err: roomsense_common::Error) -> Self {
        Self::Config(err.to_string())
    }
}
