//! Roomsense Bridge Framework
//!
//! Common abstractions for building bridges that poll a device and publish
//! its readings to an MQTT broker.
//!
//! # Overview
//!
//! This framework provides:
//! - [`BridgeConfig`] trait for configuration loading and validation
//! - [`BridgeRunner`] for managing bridge lifecycle (logging, Ctrl+C, cancellation)
//! - [`MqttPublisher`] for fire-and-forget publishing with an explicit
//!   connection state machine ([`ConnectionState`])
//! - [`BridgeStatus`] for the `online` / `offline` liveness topic
//! - [`BridgeArgs`] for common CLI argument parsing
//!
//! # Example
//!
//! ```ignore
//! use roomsense_bridge_framework::{BridgeArgs, BridgeConfig, BridgeRunner, MqttPublisher};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let args = BridgeArgs::parse_with_default("mybridge.json5");
//!     let config = MyBridgeConfig::load(&args.config)?;
//!
//!     let runner = BridgeRunner::new_with_args("mybridge", config, Some(&args))?;
//!
//!     // Run until Ctrl+C
//!     runner
//!         .run(|config, shutdown| my_worker(config, shutdown))
//!         .await?;
//!     Ok(())
//! }
//! ```

mod args;
mod config;
mod connection;
mod error;
mod publisher;
mod runner;
mod status;

pub use args::BridgeArgs;
pub use config::BridgeConfig;
pub use connection::{BusState, ConnectionState};
pub use error::{BridgeError, PublishError, Result};
pub use publisher::{MessageBus, MqttPublisher};
pub use runner::BridgeRunner;
pub use status::{BridgeStatus, StatusObserver, StatusSink};

// Re-export commonly used types from roomsense-common
pub use roomsense_common::{LogFormat, LoggingConfig, Measurement, MqttConfig};
pub use tokio_util::sync::CancellationToken;
