//! Connection plumbing shared by the rumqttc backends.
//!
//! A protocol version only supplies an `MqttDriver` (how to open a client,
//! send requests and classify event-loop output). Teardown, subscription
//! restore after CONNACK and the I/O loop live here once.

use super::{ClientBackend, LinkEvents, MessageHandler, DISCONNECT_GRACE};
use crate::error::{RelayError, Result};
use crate::models::BrokerEndpoint;
use crate::state::{new_state, Shared};
use async_trait::async_trait;
use rumqttc::QoS;
use std::fmt::Display;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// One event-loop poll, reduced to what the session reacts to.
pub enum Step {
    /// CONNACK with a success code
    Accepted,
    /// CONNACK with any other code
    Refused(String),
    Message { topic: String, payload: Vec<u8> },
    /// Broker DISCONNECT
    Closed,
    Failed(String),
    Other,
}

#[async_trait]
pub trait MqttDriver: Send + Sync + 'static {
    type Client: Clone + Send + Sync + 'static;
    type EventLoop: Send + 'static;
    type QoS: Copy + Send + Sync + 'static;

    const NAME: &'static str;

    /// Client plus event loop with keep-alive, clean session and request
    /// capacity applied.
    fn open(endpoint: &BrokerEndpoint, client_id: &str) -> (Self::Client, Self::EventLoop);

    fn qos(qos: QoS) -> Self::QoS;

    fn try_disconnect(client: &Self::Client) -> Result<()>;

    fn try_subscribe(client: &Self::Client, topic: &str, qos: Self::QoS) -> Result<()>;

    async fn publish(
        client: &Self::Client,
        topic: &str,
        qos: Self::QoS,
        payload: Vec<u8>,
    ) -> Result<()>;

    async fn subscribe(client: &Self::Client, topic: &str, qos: Self::QoS) -> Result<()>;

    async fn poll(eventloop: &mut Self::EventLoop) -> Step;
}

pub(crate) fn client_error(e: impl Display) -> RelayError {
    RelayError::Client(e.to_string())
}

/// A `ClientBackend` over one rumqttc protocol version.
pub struct Session<D: MqttDriver> {
    client: Option<D::Client>,
    io_task: Option<JoinHandle<()>>,
    connected: Arc<AtomicBool>,
    handler: Option<MessageHandler>,
    /// Topics restored after every CONNACK
    subscriptions: Shared<Vec<(String, D::QoS)>>,
}

impl<D: MqttDriver> Session<D> {
    pub const NAME: &'static str = D::NAME;

    pub fn new() -> Self {
        Self {
            client: None,
            io_task: None,
            connected: Arc::new(AtomicBool::new(false)),
            handler: None,
            subscriptions: new_state(Vec::new()),
        }
    }

    async fn teardown(&mut self) -> Result<()> {
        self.connected.store(false, Ordering::SeqCst);
        let sent = match self.client.take() {
            Some(client) => D::try_disconnect(&client),
            None => Ok(()),
        };
        if let Some(mut task) = self.io_task.take() {
            if tokio::time::timeout(DISCONNECT_GRACE, &mut task).await.is_err() {
                task.abort();
            }
        }
        sent
    }
}

impl<D: MqttDriver> Default for Session<D> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<D: MqttDriver> ClientBackend for Session<D> {
    fn name(&self) -> &'static str {
        D::NAME
    }

    async fn connect(
        &mut self,
        endpoint: &BrokerEndpoint,
        client_id: &str,
        events: LinkEvents,
    ) -> Result<()> {
        if let Err(e) = self.teardown().await {
            debug!("error during cleanup of previous connection: {e}");
        }

        let (client, eventloop) = D::open(endpoint, client_id);
        let task = tokio::spawn(drive_event_loop::<D>(
            eventloop,
            client.clone(),
            events,
            self.connected.clone(),
            self.handler.clone(),
            self.subscriptions.clone(),
        ));

        self.client = Some(client);
        self.io_task = Some(task);
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        self.teardown().await
    }

    async fn publish(&self, topic: &str, payload: Vec<u8>, qos: QoS) -> Result<()> {
        let client = match &self.client {
            Some(client) if self.is_connected() => client,
            _ => return Err(RelayError::NotConnected),
        };
        D::publish(client, topic, D::qos(qos), payload).await
    }

    async fn subscribe(&self, topic: &str, qos: QoS) -> Result<()> {
        let qos = D::qos(qos);
        let already_recorded = {
            let mut subs = self.subscriptions.lock();
            let known = subs.iter().any(|(t, _)| t == topic);
            if !known {
                subs.push((topic.to_string(), qos));
            }
            known
        };
        // restored by the CONNACK handler already
        if already_recorded && self.is_connected() {
            return Ok(());
        }
        let client = self.client.as_ref().ok_or(RelayError::NotConnected)?;
        D::subscribe(client, topic, qos).await
    }

    fn set_message_handler(&mut self, handler: MessageHandler) {
        self.handler = Some(handler);
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

/// Background I/O loop of one connection; ends on the first connection error.
async fn drive_event_loop<D: MqttDriver>(
    mut eventloop: D::EventLoop,
    client: D::Client,
    events: LinkEvents,
    connected: Arc<AtomicBool>,
    handler: Option<MessageHandler>,
    subscriptions: Shared<Vec<(String, D::QoS)>>,
) {
    loop {
        match D::poll(&mut eventloop).await {
            Step::Accepted => {
                connected.store(true, Ordering::SeqCst);
                let subs = subscriptions.lock().clone();
                for (topic, qos) in subs {
                    if let Err(e) = D::try_subscribe(&client, &topic, qos) {
                        warn!("failed to restore subscription to {topic}: {e}");
                    }
                }
                events.connected();
            }
            Step::Message { topic, payload } => {
                if let Some(handler) = &handler {
                    handler(topic.as_str(), payload.as_slice());
                }
            }
            Step::Refused(code) => {
                warn!("broker refused connection: {code}");
                connected.store(false, Ordering::SeqCst);
                events.disconnected();
                break;
            }
            Step::Closed => {
                info!("broker closed the connection");
                connected.store(false, Ordering::SeqCst);
                events.disconnected();
                break;
            }
            Step::Failed(e) => {
                warn!("{} connection error: {e}", D::NAME);
                connected.store(false, Ordering::SeqCst);
                events.disconnected();
                break;
            }
            Step::Other => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::RumqttBackend;

    #[tokio::test]
    async fn test_publish_before_connect_fails() {
        let backend = RumqttBackend::new();
        assert!(!backend.is_connected());
        let err = backend
            .publish("synergy", b"{}".to_vec(), QoS::AtLeastOnce)
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::NotConnected));
    }

    #[tokio::test]
    async fn test_disconnect_is_idempotent() {
        let mut backend = RumqttBackend::new();
        backend.disconnect().await.unwrap();
        backend.disconnect().await.unwrap();
        assert_eq!(backend.name(), "rumqttc");
    }

    #[tokio::test]
    async fn test_subscribe_recorded_for_restore() {
        let backend = RumqttBackend::new();
        assert!(backend.subscribe("synergy", QoS::AtLeastOnce).await.is_err());
        assert!(backend.subscribe("synergy", QoS::AtLeastOnce).await.is_err());
        assert_eq!(backend.subscriptions.lock().len(), 1);
    }

    #[test]
    fn test_client_error_keeps_message() {
        let err = client_error("request channel closed");
        assert_eq!(err.to_string(), "MQTT client error: request channel closed");
    }
}
