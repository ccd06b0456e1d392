//! MQTT bridge for a UART-attached temperature/humidity sensor.
//!
//! Polls the sensor over a serial port and publishes its readings to an
//! MQTT broker until Ctrl+C.

use anyhow::{Context, Result};
use roomsense_bridge_framework::{BridgeArgs, BridgeConfig, BridgeRunner, MqttPublisher};

use mqtt_bridge_uart::config::UartBridgeConfig;
use mqtt_bridge_uart::poller::UartPoller;
use mqtt_bridge_uart::serial::SerialChannel;

#[tokio::main]
async fn main() -> Result<()> {
    let args = BridgeArgs::parse_with_default("uart.json5");

    let config = UartBridgeConfig::load(&args.config)
        .with_context(|| format!("Failed to load config from {:?}", args.config))?;

    let runner = BridgeRunner::new_with_args("uart", config, Some(&args))
        .map_err(|e| anyhow::anyhow!("{}", e))?;

    tracing::info!("Loaded configuration from {:?}", args.config);

    runner
        .run(|config, shutdown| async move {
            let poller =
                UartPoller::start(&config, SerialChannel::open, MqttPublisher::connect).await?;
            poller.run(shutdown).await;
            Ok::<(), mqtt_bridge_uart::poller::PollerError>(())
        })
        .await
        .map_err(|e| anyhow::anyhow!("{}", e))
}
