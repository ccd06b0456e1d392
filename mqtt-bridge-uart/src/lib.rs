//! MQTT bridge for a UART-attached temperature/humidity sensor.
//!
//! The bridge sends a single request byte (`R` by default) to a
//! microcontroller, reads back one line such as
//!
//! ```text
//! TEMP:23.5 HUM:60.2 STATUS:1
//! ```
//!
//! and publishes the values as JSON measurements.
//!
//! # Topics
//!
//! ```text
//! home/room1/temperature   {"value": 23.5, "timestamp": "...", "unit": "°C"}
//! home/room1/humidity      {"value": 60.2, "timestamp": "...", "unit": "%"}
//! home/room1/status        online | offline
//! ```

pub mod config;
pub mod parser;
pub mod poller;
pub mod serial;
