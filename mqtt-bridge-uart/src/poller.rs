//! Sensor polling and measurement publishing.

use roomsense_bridge_framework::{
    CancellationToken, Measurement, MessageBus, MqttConfig, PublishError,
};
use roomsense_common::current_timestamp;
use tracing::{debug, error, info, warn};

use crate::config::{SerialConfig, TimingConfig, TopicsConfig, UartBridgeConfig};
use crate::parser::{self, ParseRejected, Reading};
use crate::serial::{ChannelError, SensorChannel};

/// Error type for poller setup.
#[derive(Debug, thiserror::Error)]
pub enum PollerError {
    #[error(transparent)]
    Channel(#[from] ChannelError),
    #[error(transparent)]
    Bus(#[from] PublishError),
    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// What a single poll cycle ended with.
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// Both measurements were handed to the bus.
    Published(Reading),
    /// The reading was valid but at least one publish was refused.
    PublishFailed(Reading),
    /// Nothing was received by the end of the settle delay.
    NoData,
    /// A line arrived but was not a valid reading.
    Rejected(ParseRejected),
}

/// Polls the sensor over its serial channel and publishes each reading.
///
/// Owns both the channel and the bus for its whole lifetime; every cycle runs
/// to completion before the next one starts.
pub struct UartPoller<C, B> {
    channel: C,
    bus: B,
    command: u8,
    topics: TopicsConfig,
    timing: TimingConfig,
}

impl<C, B> UartPoller<C, B>
where
    C: SensorChannel,
    B: MessageBus,
{
    /// Open the serial channel, then connect the bus.
    ///
    /// The bus is only contacted once the channel is open. If the bus
    /// connection cannot be dispatched the channel is closed again before
    /// returning the error.
    pub async fn start<O, K>(
        config: &UartBridgeConfig,
        open_channel: O,
        connect_bus: K,
    ) -> Result<Self, PollerError>
    where
        O: FnOnce(&SerialConfig) -> Result<C, ChannelError>,
        K: FnOnce(&MqttConfig) -> Result<B, PublishError>,
    {
        let command = config.serial.command_byte().ok_or_else(|| {
            PollerError::Config(format!(
                "serial.command must be a single ASCII character, got '{}'",
                config.serial.command
            ))
        })?;

        let mut channel = open_channel(&config.serial).inspect_err(|e| {
            error!(error = %e, "Serial setup failed");
        })?;

        let bus = match connect_bus(&config.mqtt) {
            Ok(bus) => bus,
            Err(e) => {
                error!(error = %e, "MQTT setup failed");
                channel.close();
                return Err(e.into());
            }
        };

        let grace = config.mqtt.connect_timeout();
        if !bus.wait_connected(grace).await {
            warn!(
                host = %config.mqtt.host,
                port = config.mqtt.port,
                waited_secs = grace.as_secs_f64(),
                "MQTT not connected yet, polling anyway"
            );
        }

        Ok(Self {
            channel,
            bus,
            command,
            topics: config.topics.clone(),
            timing: config.timing.clone(),
        })
    }

    /// Run cycles until `shutdown` is cancelled, then shut down.
    ///
    /// Cancellation is only observed between cycles.
    pub async fn run(mut self, shutdown: CancellationToken) {
        info!(
            settle_ms = self.timing.settle_ms,
            interval_ms = self.timing.interval_ms,
            period_ms = self.timing.cycle_period().as_millis() as u64,
            "Starting sensor poller"
        );

        while !shutdown.is_cancelled() {
            match self.poll_once().await {
                CycleOutcome::Published(_) => {}
                CycleOutcome::PublishFailed(reading) => {
                    debug!(?reading, "Reading not fully published");
                }
                CycleOutcome::NoData => debug!("No response from sensor"),
                CycleOutcome::Rejected(reason) => {
                    debug!(reason = %reason, "Sensor response rejected");
                }
            }

            tokio::time::sleep(self.timing.interval()).await;
        }

        info!("Stopping sensor poller");
        self.shutdown().await;
    }

    /// Perform a single request/response cycle.
    pub async fn poll_once(&mut self) -> CycleOutcome {
        match self.channel.send_command(self.command).await {
            Ok(()) => debug!(command = %char::from(self.command), "Requested reading"),
            // The sensor may still answer a previous request
            Err(e) => warn!(error = %e, "Failed to send request"),
        }

        tokio::time::sleep(self.timing.settle()).await;

        let Some(line) = self.channel.read_line().await else {
            return CycleOutcome::NoData;
        };

        match parser::parse(&line) {
            Ok(reading) => self.publish_reading(reading),
            Err(reason) => {
                warn!(line = %line, reason = %reason, "Invalid sensor data");
                CycleOutcome::Rejected(reason)
            }
        }
    }

    /// Publish both values of `reading` under one timestamp.
    fn publish_reading(&self, reading: Reading) -> CycleOutcome {
        let timestamp = current_timestamp();

        let temperature = Measurement::celsius(reading.temperature, timestamp.clone());
        let humidity = Measurement::percent(reading.humidity, timestamp);

        let mut ok = true;
        for (topic, measurement) in [
            (&self.topics.temperature, &temperature),
            (&self.topics.humidity, &humidity),
        ] {
            if let Err(e) = self.bus.publish_json(topic, measurement) {
                warn!(topic = %topic, error = %e, "Publish failed");
                ok = false;
            }
        }

        if ok {
            info!(
                temperature = reading.temperature,
                humidity = reading.humidity,
                "Published"
            );
            CycleOutcome::Published(reading)
        } else {
            CycleOutcome::PublishFailed(reading)
        }
    }

    /// Disconnect the bus, then close the channel.
    pub async fn shutdown(mut self) {
        self.bus.disconnect().await;
        self.channel.close();
    }

    pub fn channel(&self) -> &C {
        &self.channel
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::rc::Rc;
    use std::time::Duration;

    /// Everything the fakes observed, in call order.
    #[derive(Debug, Clone, PartialEq)]
    enum Event {
        Command(u8),
        Read,
        ChannelClosed,
        Publish(String, serde_json::Value),
        WaitConnected(Duration),
        Disconnect,
    }

    type Log = Rc<RefCell<Vec<Event>>>;

    struct FakeChannel {
        log: Log,
        lines: VecDeque<Option<String>>,
        fail_writes: bool,
    }

    impl SensorChannel for FakeChannel {
        async fn send_command(&mut self, command: u8) -> Result<(), ChannelError> {
            self.log.borrow_mut().push(Event::Command(command));
            if self.fail_writes {
                return Err(ChannelError::WriteFailed {
                    port: "fake".to_string(),
                    source: std::io::Error::other("unplugged"),
                });
            }
            Ok(())
        }

        async fn read_line(&mut self) -> Option<String> {
            self.log.borrow_mut().push(Event::Read);
            self.lines.pop_front().flatten()
        }

        fn close(&mut self) {
            self.log.borrow_mut().push(Event::ChannelClosed);
        }
    }

    struct FakeBus {
        log: Log,
        connected: bool,
        refuse_topic: Option<String>,
    }

    impl MessageBus for FakeBus {
        fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), PublishError> {
            if self.refuse_topic.as_deref() == Some(topic) {
                return Err(PublishError::send(topic, "refused"));
            }
            let value = serde_json::from_slice(&payload).unwrap();
            self.log
                .borrow_mut()
                .push(Event::Publish(topic.to_string(), value));
            Ok(())
        }

        async fn wait_connected(&self, timeout: Duration) -> bool {
            self.log.borrow_mut().push(Event::WaitConnected(timeout));
            self.connected
        }

        async fn disconnect(&mut self) {
            self.log.borrow_mut().push(Event::Disconnect);
        }
    }

    fn fake_channel(log: &Log, lines: &[Option<&str>]) -> FakeChannel {
        FakeChannel {
            log: log.clone(),
            lines: lines.iter().map(|l| l.map(str::to_string)).collect(),
            fail_writes: false,
        }
    }

    fn fake_bus(log: &Log) -> FakeBus {
        FakeBus {
            log: log.clone(),
            connected: true,
            refuse_topic: None,
        }
    }

    async fn start(
        channel: FakeChannel,
        bus: FakeBus,
    ) -> UartPoller<FakeChannel, FakeBus> {
        UartPoller::start(
            &UartBridgeConfig::default(),
            move |_| Ok(channel),
            move |_| Ok(bus),
        )
        .await
        .unwrap()
    }

    fn publishes(log: &Log) -> Vec<(String, serde_json::Value)> {
        log.borrow()
            .iter()
            .filter_map(|event| match event {
                Event::Publish(topic, value) => Some((topic.clone(), value.clone())),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_serial_failure_skips_bus() {
        let bus_attempted = Rc::new(RefCell::new(false));
        let attempted = bus_attempted.clone();

        let result = UartPoller::<FakeChannel, FakeBus>::start(
            &UartBridgeConfig::default(),
            |serial| {
                Err(ChannelError::OpenFailed {
                    port: serial.port.clone(),
                    message: "No such file or directory".to_string(),
                })
            },
            move |_| {
                *attempted.borrow_mut() = true;
                Err(PublishError::dispatch("localhost:1883", "unreachable"))
            },
        )
        .await;

        assert!(matches!(
            result,
            Err(PollerError::Channel(ChannelError::OpenFailed { .. }))
        ));
        assert!(!*bus_attempted.borrow());
    }

    #[tokio::test]
    async fn test_bus_failure_closes_channel() {
        let log = Log::default();
        let channel = fake_channel(&log, &[]);

        let result = UartPoller::<FakeChannel, FakeBus>::start(
            &UartBridgeConfig::default(),
            move |_| Ok(channel),
            |mqtt| Err(PublishError::dispatch(&mqtt.host, "no runtime")),
        )
        .await;

        assert!(matches!(result, Err(PollerError::Bus(_))));
        assert_eq!(*log.borrow(), vec![Event::ChannelClosed]);
    }

    #[tokio::test]
    async fn test_start_waits_for_connection() {
        let log = Log::default();
        let mut bus = fake_bus(&log);
        bus.connected = false;

        // Not being connected yet is not fatal
        let _poller = start(fake_channel(&log, &[]), bus).await;

        assert_eq!(
            *log.borrow(),
            vec![Event::WaitConnected(Duration::from_secs(2))]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_cycle_publishes_both_values() {
        let log = Log::default();
        let mut poller = start(
            fake_channel(&log, &[Some("TEMP:23.5 HUM:60.2 STATUS:1")]),
            fake_bus(&log),
        )
        .await;

        let before = tokio::time::Instant::now();
        let outcome = poller.poll_once().await;
        assert_eq!(before.elapsed(), Duration::from_secs(1));

        assert_eq!(
            outcome,
            CycleOutcome::Published(Reading {
                temperature: 23.5,
                humidity: 60.2,
                status: Some(1),
            })
        );

        let sent = publishes(&log);
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].0, "home/room1/temperature");
        assert_eq!(sent[0].1["value"], 23.5);
        assert_eq!(sent[0].1["unit"], "°C");
        assert_eq!(sent[1].0, "home/room1/humidity");
        assert_eq!(sent[1].1["value"], 60.2);
        assert_eq!(sent[1].1["unit"], "%");
        assert_eq!(sent[0].1["timestamp"], sent[1].1["timestamp"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cycle_order() {
        let log = Log::default();
        let mut poller = start(fake_channel(&log, &[None]), fake_bus(&log)).await;
        log.borrow_mut().clear();

        assert_eq!(poller.poll_once().await, CycleOutcome::NoData);
        assert_eq!(*log.borrow(), vec![Event::Command(b'R'), Event::Read]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_line_publishes_nothing() {
        let log = Log::default();
        let mut poller = start(
            fake_channel(&log, &[Some("HUM:60.2"), Some("TEMP:abc HUM:60.2")]),
            fake_bus(&log),
        )
        .await;

        assert_eq!(
            poller.poll_once().await,
            CycleOutcome::Rejected(ParseRejected::MissingField("TEMP"))
        );
        assert!(matches!(
            poller.poll_once().await,
            CycleOutcome::Rejected(ParseRejected::InvalidValue { key: "TEMP", .. })
        ));
        assert!(publishes(&log).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_failure_still_reads() {
        let log = Log::default();
        let mut channel = fake_channel(&log, &[Some("TEMP:20 HUM:40")]);
        channel.fail_writes = true;
        let mut poller = start(channel, fake_bus(&log)).await;

        assert!(matches!(
            poller.poll_once().await,
            CycleOutcome::Published(_)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_humidity_published_after_temperature_refused() {
        let log = Log::default();
        let mut bus = fake_bus(&log);
        bus.refuse_topic = Some("home/room1/temperature".to_string());
        let mut poller = start(fake_channel(&log, &[Some("TEMP:20 HUM:40")]), bus).await;

        assert!(matches!(
            poller.poll_once().await,
            CycleOutcome::PublishFailed(_)
        ));

        let sent = publishes(&log);
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "home/room1/humidity");
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_stops_at_cycle_boundary() {
        let log = Log::default();
        let poller = start(
            fake_channel(&log, &[Some("TEMP:21 HUM:50"), Some("TEMP:22 HUM:51")]),
            fake_bus(&log),
        )
        .await;

        let shutdown = CancellationToken::new();
        let canceller = shutdown.clone();

        // Cancel during the first cycle's settle delay
        tokio::join!(poller.run(shutdown), async move {
            tokio::time::sleep(Duration::from_millis(500)).await;
            canceller.cancel();
        });

        let log = log.borrow();
        let commands = log
            .iter()
            .filter(|e| matches!(e, Event::Command(_)))
            .count();
        assert_eq!(commands, 1);
        assert_eq!(publishes_in(&log), 2);

        // Shutdown order: bus first, then channel, each exactly once
        let tail: Vec<_> = log
            .iter()
            .filter(|e| matches!(e, Event::Disconnect | Event::ChannelClosed))
            .cloned()
            .collect();
        assert_eq!(tail, vec![Event::Disconnect, Event::ChannelClosed]);
        assert_eq!(log.last(), Some(&Event::ChannelClosed));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_returns_promptly_when_already_cancelled() {
        let log = Log::default();
        let poller = start(fake_channel(&log, &[]), fake_bus(&log)).await;
        log.borrow_mut().clear();

        let shutdown = CancellationToken::new();
        shutdown.cancel();
        poller.run(shutdown).await;

        assert_eq!(*log.borrow(), vec![Event::Disconnect, Event::ChannelClosed]);
    }

    fn publishes_in(log: &[Event]) -> usize {
        log.iter()
            .filter(|e| matches!(e, Event::Publish(..)))
            .count()
    }
}
