//! Bridge status reporting.
//!
//! The bridge announces its liveness on a status topic with the plain-text
//! payloads `online` and `offline`. `online` is published by a
//! [`StatusObserver`] reacting to the bus entering `Connected`; `offline` is
//! published by the publisher itself right before it disconnects.

use std::fmt;

use tokio::sync::watch;

use crate::connection::{BusState, ConnectionState};
use crate::error::PublishError;

/// Liveness of the bridge as seen by subscribers of the status topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BridgeStatus {
    Online,
    Offline,
}

impl BridgeStatus {
    /// Payload published on the status topic.
    pub fn as_str(&self) -> &'static str {
        match self {
            BridgeStatus::Online => "online",
            BridgeStatus::Offline => "offline",
        }
    }
}

impl fmt::Display for BridgeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Destination for status announcements.
pub trait StatusSink {
    /// Publish `status` on the status topic.
    fn publish_status(&self, status: BridgeStatus) -> Result<(), PublishError>;
}

/// Reacts to bus state transitions.
///
/// - `Connected`: publish [`BridgeStatus::Online`].
/// - `Disconnected` without a prior disconnect request: log a warning.
///
/// The observer stops after the first `Disconnected`, since the connection is
/// never re-established by this component.
pub struct StatusObserver<S> {
    sink: S,
    state: ConnectionState,
    rx: watch::Receiver<BusState>,
}

impl<S: StatusSink> StatusObserver<S> {
    /// Create an observer. Transitions that happened before this call are
    /// not replayed.
    pub fn new(sink: S, state: ConnectionState) -> Self {
        let rx = state.subscribe();
        Self { sink, state, rx }
    }

    /// Run until the bus is disconnected or the state cell is dropped.
    pub async fn run(mut self) {
        while self.rx.changed().await.is_ok() {
            let current = *self.rx.borrow_and_update();

            match current {
                BusState::Connected => {
                    tracing::info!("MQTT: Connected successfully");
                    match self.sink.publish_status(BridgeStatus::Online) {
                        Ok(()) => tracing::debug!(status = %BridgeStatus::Online, "Published status"),
                        Err(e) => tracing::warn!(error = %e, "Failed to publish online status"),
                    }
                }
                BusState::Disconnected => {
                    if !self.state.disconnect_requested() {
                        tracing::warn!("MQTT: Unexpected disconnection from broker");
                    }
                    break;
                }
                BusState::Connecting => {}
            }
        }
    }
}
