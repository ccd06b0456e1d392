//! Bus connection state machine.
//!
//! The MQTT event loop runs on a background task, so connection changes arrive
//! concurrently with the poll loop. [`ConnectionState`] is the shared cell both
//! sides use: the event loop driver applies transitions, while the status
//! observer and the publisher read or wait on them.
//!
//! ```text
//! Disconnected --connect()--> Connecting --CONNACK--> Connected
//!       ^                         |                       |
//!       +------ refused/error ----+---- drop/disconnect --+
//! ```

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::watch;

/// Connection state of the message bus client.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum BusState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl BusState {
    /// Whether `self -> next` is an edge of the state machine.
    ///
    /// There is no edge back to `Connecting` once connected.
    pub fn can_transition_to(self, next: BusState) -> bool {
        matches!(
            (self, next),
            (BusState::Disconnected, BusState::Connecting)
                | (BusState::Connecting, BusState::Connected)
                | (BusState::Connecting, BusState::Disconnected)
                | (BusState::Connected, BusState::Disconnected)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BusState::Disconnected => "disconnected",
            BusState::Connecting => "connecting",
            BusState::Connected => "connected",
        }
    }
}

impl fmt::Display for BusState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Thread-safe connection state cell.
///
/// Cloning shares the same underlying state.
#[derive(Debug, Clone)]
pub struct ConnectionState {
    tx: Arc<watch::Sender<BusState>>,
    disconnect_requested: Arc<AtomicBool>,
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionState {
    /// Create a new cell in the `Disconnected` state.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(BusState::Disconnected);
        Self {
            tx: Arc::new(tx),
            disconnect_requested: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Current state.
    pub fn current(&self) -> BusState {
        *self.tx.borrow()
    }

    /// Subscribe to state changes.
    pub fn subscribe(&self) -> watch::Receiver<BusState> {
        self.tx.subscribe()
    }

    /// Apply a transition if it is a valid edge from the current state.
    ///
    /// Returns `true` if the state changed.
    pub fn transition(&self, next: BusState) -> bool {
        let mut from = None;
        let changed = self.tx.send_if_modified(|state| {
            if state.can_transition_to(next) {
                from = Some(*state);
                *state = next;
                true
            } else {
                false
            }
        });

        match from {
            Some(from) => {
                tracing::debug!(from = %from, to = %next, "Bus state transition");
            }
            None => {
                tracing::trace!(current = %self.current(), to = %next, "Ignored bus state transition");
            }
        }

        changed
    }

    /// Mark the next disconnect as requested by the owner.
    ///
    /// Returns `true` if this call set the flag, `false` if a disconnect was
    /// already requested.
    pub fn request_disconnect(&self) -> bool {
        !self.disconnect_requested.swap(true, Ordering::SeqCst)
    }

    /// Whether the owner asked for the connection to be closed.
    pub fn disconnect_requested(&self) -> bool {
        self.disconnect_requested.load(Ordering::SeqCst)
    }

    /// Wait until the state leaves `Connecting`, up to `timeout`.
    ///
    /// Returns the state observed when the wait ended.
    pub async fn wait_until_settled(&self, timeout: Duration) -> BusState {
        let mut rx = self.subscribe();
        let result =
            tokio::time::timeout(timeout, rx.wait_for(|state| *state != BusState::Connecting))
                .await;

        match result {
            Ok(Ok(state)) => *state,
            _ => self.current(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_edges() {
        use BusState::*;

        assert!(Disconnected.can_transition_to(Connecting));
        assert!(Connecting.can_transition_to(Connected));
        assert!(Connecting.can_transition_to(Disconnected));
        assert!(Connected.can_transition_to(Disconnected));

        assert!(!Connected.can_transition_to(Connecting));
        assert!(!Disconnected.can_transition_to(Connected));
        assert!(!Connected.can_transition_to(Connected));
    }

    #[test]
    fn test_transition_rejects_invalid_edge() {
        let state = ConnectionState::new();
        assert!(!state.transition(BusState::Connected));
        assert_eq!(state.current(), BusState::Disconnected);

        assert!(state.transition(BusState::Connecting));
        assert!(state.transition(BusState::Connected));
        assert!(!state.transition(BusState::Connecting));
        assert_eq!(state.current(), BusState::Connected);
    }

    #[test]
    fn test_clone_shares_state() {
        let state = ConnectionState::new();
        let other = state.clone();

        state.transition(BusState::Connecting);
        assert_eq!(other.current(), BusState::Connecting);

        assert!(other.request_disconnect());
        assert!(!state.request_disconnect());
        assert!(state.disconnect_requested());
    }

    #[tokio::test]
    async fn test_wait_until_settled() {
        let state = ConnectionState::new();
        state.transition(BusState::Connecting);

        let driver = state.clone();
        tokio::spawn(async move {
            driver.transition(BusState::Connected);
        });

        let settled = state.wait_until_settled(Duration::from_secs(1)).await;
        assert_eq!(settled, BusState::Connected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_until_settled_times_out() {
        let state = ConnectionState::new();
        state.transition(BusState::Connecting);

        let settled = state.wait_until_settled(Duration::from_secs(2)).await;
        assert_eq!(settled, BusState::Connecting);
    }
}
