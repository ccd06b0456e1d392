//! MQTT message publisher.
//!
//! [`MqttPublisher`] owns the broker connection. Connecting spawns two
//! background tasks:
//!
//! - the **driver**, the only task that polls the rumqttc `EventLoop`. It turns
//!   CONNACKs, errors and the outgoing DISCONNECT into [`BusState`]
//!   transitions and stops for good once the connection is gone;
//! - the [`StatusObserver`], which publishes `online` when the state becomes
//!   `Connected` and warns about unexpected disconnections.
//!
//! Publishing is fire-and-forget: payloads are queued on the client with
//! QoS 0 and the caller never waits for the broker.

use std::time::Duration;

use rumqttc::{AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS};
use serde::Serialize;
use tokio::task::JoinHandle;

use roomsense_common::MqttConfig;

use crate::connection::{BusState, ConnectionState};
use crate::error::PublishError;
use crate::status::{BridgeStatus, StatusObserver, StatusSink};

/// Capacity of the client request queue.
const REQUEST_CAPACITY: usize = 10;

/// Upper bound for the DISCONNECT handshake and background task shutdown.
const DISCONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// Message bus as seen by a polling bridge.
#[allow(async_fn_in_trait)]
pub trait MessageBus {
    /// Queue `payload` for `topic` without waiting for delivery.
    fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), PublishError>;

    /// Serialize `value` as JSON and [`publish`](Self::publish) it.
    fn publish_json<T: Serialize>(&self, topic: &str, value: &T) -> Result<(), PublishError> {
        let payload =
            serde_json::to_vec(value).map_err(|e| PublishError::send(topic, e.to_string()))?;
        self.publish(topic, payload)
    }

    /// Wait up to `timeout` for the connection attempt to finish.
    ///
    /// Returns `true` if the bus is connected.
    async fn wait_connected(&self, timeout: Duration) -> bool;

    /// Announce `offline` and close the connection. Idempotent.
    async fn disconnect(&mut self);
}

/// Publishes status payloads through the MQTT client.
#[derive(Clone)]
struct MqttStatusSink {
    client: AsyncClient,
    topic: String,
}

impl StatusSink for MqttStatusSink {
    fn publish_status(&self, status: BridgeStatus) -> Result<(), PublishError> {
        self.client
            .try_publish(&self.topic, QoS::AtMostOnce, false, status.as_str())
            .map_err(|e| PublishError::send(&self.topic, e.to_string()))
    }
}

/// MQTT publisher backed by rumqttc.
pub struct MqttPublisher {
    broker: String,
    client: AsyncClient,
    status_topic: String,
    state: ConnectionState,
    driver: Option<JoinHandle<()>>,
    observer: Option<JoinHandle<()>>,
}

impl MqttPublisher {
    /// Start connecting to the broker described by `config`.
    ///
    /// Returns as soon as the connection request is dispatched; whether the
    /// broker accepts it is reported through [`state`](Self::state).
    ///
    /// # Errors
    ///
    /// [`PublishError::ConnectDispatchFailed`] if the configuration is
    /// rejected or no Tokio runtime is available to run the event loop.
    pub fn connect(config: &MqttConfig) -> Result<Self, PublishError> {
        let broker = format!("{}:{}", config.host, config.port);

        config
            .validate()
            .map_err(|e| PublishError::dispatch(&broker, e.to_string()))?;

        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| PublishError::dispatch(&broker, e.to_string()))?;

        let mut options = MqttOptions::new(&config.client_id, &config.host, config.port);
        options.set_keep_alive(config.keepalive());

        let (client, event_loop) = AsyncClient::new(options, REQUEST_CAPACITY);

        let state = ConnectionState::new();
        state.transition(BusState::Connecting);

        let sink = MqttStatusSink {
            client: client.clone(),
            topic: config.status_topic.clone(),
        };
        let observer = runtime.spawn(StatusObserver::new(sink, state.clone()).run());
        let driver = runtime.spawn(drive(event_loop, state.clone(), broker.clone()));

        tracing::info!(broker = %broker, keepalive_secs = config.keepalive_secs, "Connecting to MQTT broker");

        Ok(Self {
            broker,
            client,
            status_topic: config.status_topic.clone(),
            state,
            driver: Some(driver),
            observer: Some(observer),
        })
    }

    /// Broker address as `host:port`.
    pub fn broker(&self) -> &str {
        &self.broker
    }

    /// Shared connection state.
    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    /// Await a background task, aborting it if it outlives the timeout.
    async fn join(name: &str, handle: Option<JoinHandle<()>>) {
        let Some(mut handle) = handle else {
            return;
        };

        if tokio::time::timeout(DISCONNECT_TIMEOUT, &mut handle)
            .await
            .is_err()
        {
            tracing::debug!(task = name, "Background task did not stop in time, aborting");
            handle.abort();
        }
    }
}

impl MessageBus for MqttPublisher {
    fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), PublishError> {
        if self.state.current() == BusState::Disconnected {
            return Err(PublishError::send(topic, "not connected"));
        }

        self.client
            .try_publish(topic, QoS::AtMostOnce, false, payload)
            .map_err(|e| PublishError::send(topic, e.to_string()))
    }

    async fn wait_connected(&self, timeout: Duration) -> bool {
        self.state.wait_until_settled(timeout).await == BusState::Connected
    }

    async fn disconnect(&mut self) {
        if !self.state.request_disconnect() {
            return;
        }

        if self.state.current() == BusState::Connected {
            // Queued ahead of DISCONNECT, so it leaves before the socket closes
            match self
                .client
                .publish(
                    &self.status_topic,
                    QoS::AtMostOnce,
                    false,
                    BridgeStatus::Offline.as_str(),
                )
                .await
            {
                Ok(()) => tracing::debug!(status = %BridgeStatus::Offline, "Published status"),
                Err(e) => tracing::warn!(error = %e, "Failed to publish offline status"),
            }
        } else {
            tracing::warn!(
                state = %self.state.current(),
                "Not connected, skipping offline status"
            );
        }

        if let Err(e) = self.client.try_disconnect() {
            tracing::debug!(error = %e, "MQTT disconnect request failed");
        }

        Self::join("driver", self.driver.take()).await;
        self.state.transition(BusState::Disconnected);
        Self::join("observer", self.observer.take()).await;

        tracing::info!(broker = %self.broker, "Disconnected from MQTT broker");
    }
}

/// Poll the event loop until the connection ends.
///
/// Polling again after an error would make rumqttc reconnect, which this
/// publisher never does.
async fn drive(mut event_loop: EventLoop, state: ConnectionState, broker: String) {
    loop {
        match event_loop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(connack))) => {
                if connack.code == ConnectReturnCode::Success {
                    state.transition(BusState::Connected);
                } else {
                    tracing::error!(broker = %broker, code = ?connack.code, "MQTT: Connection refused");
                    state.transition(BusState::Disconnected);
                    break;
                }
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                tracing::debug!(broker = %broker, "MQTT disconnect sent");
                state.transition(BusState::Disconnected);
                break;
            }
            Ok(event) => {
                tracing::trace!(?event, "MQTT event");
            }
            Err(e) => {
                if state.disconnect_requested() {
                    tracing::debug!(broker = %broker, error = %e, "MQTT connection closed");
                } else {
                    tracing::error!(broker = %broker, error = %e, "MQTT connection error");
                }
                state.transition(BusState::Disconnected);
                break;
            }
        }
    }
}
