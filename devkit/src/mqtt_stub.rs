/*!
In-memory MQTT backend for tests without a broker.

`MockBackend` implements `ClientBackend`, records everything the relay sends
and lets tests script how each connect and publish turns out. Clones share
state, so a test keeps one handle while the publisher/subscriber owns another.
*/

use async_trait::async_trait;
use rumqttc::QoS;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use synergy_relay::{BrokerEndpoint, ClientBackend, LinkEvents, MessageHandler, RelayError, Result};
use tracing::info;

#[derive(Debug, Clone)]
pub struct MockMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    pub qos: QoS,
}

/// How the next `connect` behaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectScript {
    /// CONNACK success
    Accept,
    /// CONNACK with a refusal code
    Refuse,
    /// No answer at all; the supervisor times out
    Silent,
    /// `connect` itself returns an error
    Fail,
}

#[derive(Default)]
struct Inner {
    transport_up: bool,
    handler: Option<MessageHandler>,
    links: Vec<LinkEvents>,
    client_ids: Vec<String>,
    connect_script: VecDeque<ConnectScript>,
    publish_script: VecDeque<bool>,
    published: Vec<MockMessage>,
    publish_attempts: usize,
    subscriptions: Vec<String>,
    disconnects: usize,
}

#[derive(Clone, Default)]
pub struct MockBackend {
    inner: Arc<Mutex<Inner>>,
}

impl MockBackend {
    pub const NAME: &'static str = "mock";

    pub fn new() -> Self {
        Self::default()
    }

    /// Outcomes for the next connects, in order; `Accept` once exhausted.
    pub fn script_connects(&self, outcomes: impl IntoIterator<Item = ConnectScript>) {
        self.inner.lock().unwrap().connect_script.extend(outcomes);
    }

    /// Outcomes for the next publishes, in order; success once exhausted.
    pub fn script_publishes(&self, outcomes: impl IntoIterator<Item = bool>) {
        self.inner.lock().unwrap().publish_script.extend(outcomes);
    }

    /// Delivers an inbound message to the registered handler. False when no
    /// handler is set or the transport is down.
    pub fn simulate_incoming(&self, topic: &str, payload: impl AsRef<[u8]>) -> bool {
        let handler = {
            let inner = self.inner.lock().unwrap();
            if !inner.transport_up {
                return false;
            }
            inner.handler.clone()
        };
        match handler {
            Some(handler) => {
                info!("[MOCK] Simulated incoming on {topic}");
                handler(topic, payload.as_ref());
                true
            }
            None => false,
        }
    }

    /// Broker drops the link: transport goes down and the supervisor hears it.
    pub fn drop_connection(&self) -> bool {
        let link = {
            let mut inner = self.inner.lock().unwrap();
            inner.transport_up = false;
            inner.links.last().cloned()
        };
        link.map(|events| events.disconnected()).unwrap_or(false)
    }

    /// Flips the transport view without notifying anyone (half-open link).
    pub fn set_transport_up(&self, up: bool) {
        self.inner.lock().unwrap().transport_up = up;
    }

    /// Handle given to the n-th connect (0-based).
    pub fn link(&self, n: usize) -> Option<LinkEvents> {
        self.inner.lock().unwrap().links.get(n).cloned()
    }

    pub fn connect_count(&self) -> usize {
        self.inner.lock().unwrap().client_ids.len()
    }

    pub fn client_ids(&self) -> Vec<String> {
        self.inner.lock().unwrap().client_ids.clone()
    }

    pub fn disconnect_count(&self) -> usize {
        self.inner.lock().unwrap().disconnects
    }

    pub fn publish_attempts(&self) -> usize {
        self.inner.lock().unwrap().publish_attempts
    }

    pub fn published(&self) -> Vec<MockMessage> {
        self.inner.lock().unwrap().published.clone()
    }

    pub fn subscriptions(&self) -> Vec<String> {
        self.inner.lock().unwrap().subscriptions.clone()
    }

    /// Last payload published on `topic`, decoded as JSON.
    pub fn last_json(&self, topic: &str) -> Option<Value> {
        self.inner
            .lock()
            .unwrap()
            .published
            .iter()
            .rev()
            .find(|msg| msg.topic == topic)
            .and_then(|msg| serde_json::from_slice(&msg.payload).ok())
    }

    pub fn has_handler(&self) -> bool {
        self.inner.lock().unwrap().handler.is_some()
    }
}

#[async_trait]
impl ClientBackend for MockBackend {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn connect(
        &mut self,
        endpoint: &BrokerEndpoint,
        client_id: &str,
        events: LinkEvents,
    ) -> Result<()> {
        let script = {
            let mut inner = self.inner.lock().unwrap();
            inner.transport_up = false;
            inner.client_ids.push(client_id.to_string());
            inner.links.push(events.clone());
            inner
                .connect_script
                .pop_front()
                .unwrap_or(ConnectScript::Accept)
        };
        info!("[MOCK] connect {client_id} to {endpoint}: {script:?}");

        match script {
            ConnectScript::Accept => {
                self.inner.lock().unwrap().transport_up = true;
                events.connected();
            }
            ConnectScript::Refuse => {
                events.disconnected();
            }
            ConnectScript::Silent => {}
            ConnectScript::Fail => {
                return Err(RelayError::Client(format!("cannot reach {endpoint}")));
            }
        }
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.transport_up = false;
        inner.disconnects += 1;
        Ok(())
    }

    async fn publish(&self, topic: &str, payload: Vec<u8>, qos: QoS) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.publish_attempts += 1;
        if !inner.transport_up {
            return Err(RelayError::NotConnected);
        }
        if !inner.publish_script.pop_front().unwrap_or(true) {
            return Err(RelayError::Client("request channel closed".to_string()));
        }
        info!("[MOCK] Published to {topic}: {} bytes", payload.len());
        inner.published.push(MockMessage {
            topic: topic.to_string(),
            payload,
            qos,
        });
        Ok(())
    }

    async fn subscribe(&self, topic: &str, _qos: QoS) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.transport_up {
            return Err(RelayError::NotConnected);
        }
        info!("[MOCK] Subscribed to {topic}");
        inner.subscriptions.push(topic.to_string());
        Ok(())
    }

    fn set_message_handler(&mut self, handler: MessageHandler) {
        self.inner.lock().unwrap().handler = Some(handler);
    }

    fn is_connected(&self) -> bool {
        self.inner.lock().unwrap().transport_up
    }
}

/// JSON payloads in the relay's wire format.
pub struct PayloadBuilder {
    fields: serde_json::Map<String, Value>,
}

impl PayloadBuilder {
    /// `{"current_desktop": desktop, "timestamp": now}`
    pub fn switch(desktop: impl Into<String>) -> Self {
        let mut fields = serde_json::Map::new();
        fields.insert("current_desktop".into(), Value::String(desktop.into()));
        fields.insert(
            "timestamp".into(),
            Value::String(chrono::Local::now().to_rfc3339()),
        );
        Self { fields }
    }

    pub fn empty() -> Self {
        Self {
            fields: serde_json::Map::new(),
        }
    }

    pub fn field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn without(mut self, key: &str) -> Self {
        self.fields.remove(key);
        self
    }

    pub fn value(self) -> Value {
        Value::Object(self.fields)
    }

    pub fn build(self) -> Vec<u8> {
        serde_json::to_vec(&self.value()).unwrap_or_default()
    }
}
