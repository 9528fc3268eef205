//! Transport capability interface and the built-in MQTT backends.
//!
//! A backend opens the broker connection, runs its own background I/O task and
//! reports connect acknowledgements and disconnects through the `LinkEvents`
//! handle it receives from the supervisor. Inbound publishes go to the
//! registered `MessageHandler`.

mod rumqtt;
#[cfg(feature = "mqtt-v5")]
mod rumqtt_v5;
mod session;

pub use rumqtt::RumqttBackend;
#[cfg(feature = "mqtt-v5")]
pub use rumqtt_v5::RumqttV5Backend;

use crate::error::Result;
use crate::models::{BrokerEndpoint, ConnectionState};
use async_trait::async_trait;
use rumqttc::QoS;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::debug;

/// Callback for inbound messages: `(topic, payload)`
pub type MessageHandler = Arc<dyn Fn(&str, &[u8]) + Send + Sync>;

/// Keep-alive used by the rumqttc backends.
pub(crate) const KEEP_ALIVE: Duration = Duration::from_secs(60);
/// Capacity of the rumqttc request channel.
pub(crate) const REQUEST_CAPACITY: usize = 10;
/// How long `disconnect` lets the I/O task flush the DISCONNECT packet.
pub(crate) const DISCONNECT_GRACE: Duration = Duration::from_millis(500);

#[async_trait]
pub trait ClientBackend: Send + Sync + 'static {
    /// Registry name of the backend.
    fn name(&self) -> &'static str;

    /// Starts an asynchronous connect. Any previous connection of this backend
    /// is torn down first. The outcome arrives later through `events`.
    async fn connect(
        &mut self,
        endpoint: &BrokerEndpoint,
        client_id: &str,
        events: LinkEvents,
    ) -> Result<()>;

    async fn disconnect(&mut self) -> Result<()>;

    /// Local enqueue result, not a broker acknowledgement.
    async fn publish(&self, topic: &str, payload: Vec<u8>, qos: QoS) -> Result<()>;

    async fn subscribe(&self, topic: &str, qos: QoS) -> Result<()>;

    /// Must be set before `connect` to see messages of that connection.
    fn set_message_handler(&mut self, handler: MessageHandler);

    /// Transport-level view of the link.
    fn is_connected(&self) -> bool;
}

/// Connection notifications from a backend I/O task to its supervisor.
///
/// Each handle is bound to one connection attempt; once the supervisor starts
/// another attempt, older handles are ignored. Transitions outside the
/// connection state machine are dropped as well.
#[derive(Clone)]
pub struct LinkEvents {
    state: Arc<watch::Sender<ConnectionState>>,
    attempt: u64,
    current_attempt: Arc<AtomicU64>,
}

impl LinkEvents {
    pub(crate) fn new(
        state: Arc<watch::Sender<ConnectionState>>,
        current_attempt: Arc<AtomicU64>,
    ) -> Self {
        let attempt = current_attempt.load(Ordering::SeqCst);
        Self {
            state,
            attempt,
            current_attempt,
        }
    }

    /// CONNACK with a success code.
    pub fn connected(&self) -> bool {
        self.transition(ConnectionState::Connected)
    }

    /// Refused CONNACK, connection error, or broker DISCONNECT.
    pub fn disconnected(&self) -> bool {
        self.transition(ConnectionState::Disconnected)
    }

    pub fn is_current(&self) -> bool {
        self.current_attempt.load(Ordering::SeqCst) == self.attempt
    }

    fn transition(&self, next: ConnectionState) -> bool {
        if !self.is_current() {
            debug!("ignoring '{next}' from superseded connection attempt {}", self.attempt);
            return false;
        }
        self.state.send_if_modified(|state| {
            if state.can_transition_to(next) {
                *state = next;
                true
            } else {
                false
            }
        })
    }
}

/// Closed set of backends built into this binary.
pub enum Backend {
    Rumqtt(RumqttBackend),
    #[cfg(feature = "mqtt-v5")]
    RumqttV5(RumqttV5Backend),
}

#[async_trait]
impl ClientBackend for Backend {
    fn name(&self) -> &'static str {
        match self {
            Backend::Rumqtt(b) => b.name(),
            #[cfg(feature = "mqtt-v5")]
            Backend::RumqttV5(b) => b.name(),
        }
    }

    async fn connect(
        &mut self,
        endpoint: &BrokerEndpoint,
        client_id: &str,
        events: LinkEvents,
    ) -> Result<()> {
        match self {
            Backend::Rumqtt(b) => b.connect(endpoint, client_id, events).await,
            #[cfg(feature = "mqtt-v5")]
            Backend::RumqttV5(b) => b.connect(endpoint, client_id, events).await,
        }
    }

    async fn disconnect(&mut self) -> Result<()> {
        match self {
            Backend::Rumqtt(b) => b.disconnect().await,
            #[cfg(feature = "mqtt-v5")]
            Backend::RumqttV5(b) => b.disconnect().await,
        }
    }

    async fn publish(&self, topic: &str, payload: Vec<u8>, qos: QoS) -> Result<()> {
        match self {
            Backend::Rumqtt(b) => b.publish(topic, payload, qos).await,
            #[cfg(feature = "mqtt-v5")]
            Backend::RumqttV5(b) => b.publish(topic, payload, qos).await,
        }
    }

    async fn subscribe(&self, topic: &str, qos: QoS) -> Result<()> {
        match self {
            Backend::Rumqtt(b) => b.subscribe(topic, qos).await,
            #[cfg(feature = "mqtt-v5")]
            Backend::RumqttV5(b) => b.subscribe(topic, qos).await,
        }
    }

    fn set_message_handler(&mut self, handler: MessageHandler) {
        match self {
            Backend::Rumqtt(b) => b.set_message_handler(handler),
            #[cfg(feature = "mqtt-v5")]
            Backend::RumqttV5(b) => b.set_message_handler(handler),
        }
    }

    fn is_connected(&self) -> bool {
        match self {
            Backend::Rumqtt(b) => b.is_connected(),
            #[cfg(feature = "mqtt-v5")]
            Backend::RumqttV5(b) => b.is_connected(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn link() -> (watch::Receiver<ConnectionState>, Arc<AtomicU64>, LinkEvents) {
        let (tx, rx) = watch::channel(ConnectionState::Connecting);
        let attempt = Arc::new(AtomicU64::new(1));
        let events = LinkEvents::new(Arc::new(tx), attempt.clone());
        (rx, attempt, events)
    }

    #[test]
    fn test_connect_ack_then_drop() {
        let (rx, _attempt, events) = link();
        assert!(events.connected());
        assert_eq!(*rx.borrow(), ConnectionState::Connected);
        assert!(events.disconnected());
        assert_eq!(*rx.borrow(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_invalid_transition_ignored() {
        let (rx, _attempt, events) = link();
        assert!(events.disconnected());
        // Disconnected -> Connected skips Connecting
        assert!(!events.connected());
        assert_eq!(*rx.borrow(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_superseded_attempt_ignored() {
        let (rx, attempt, events) = link();
        attempt.fetch_add(1, Ordering::SeqCst);
        assert!(!events.is_current());
        assert!(!events.connected());
        assert_eq!(*rx.borrow(), ConnectionState::Connecting);
    }
}
