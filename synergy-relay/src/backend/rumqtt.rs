use super::session::{client_error, MqttDriver, Session, Step};
use super::{KEEP_ALIVE, REQUEST_CAPACITY};
use crate::error::Result;
use crate::models::BrokerEndpoint;
use async_trait::async_trait;
use rumqttc::{AsyncClient, ConnectReturnCode, Event, EventLoop, Incoming, MqttOptions, QoS};

/// MQTT 3.1.1 backend over `rumqttc::AsyncClient`.
pub type RumqttBackend = Session<Mqtt311>;

pub struct Mqtt311;

#[async_trait]
impl MqttDriver for Mqtt311 {
    type Client = AsyncClient;
    type EventLoop = EventLoop;
    type QoS = QoS;

    const NAME: &'static str = "rumqttc";

    fn open(endpoint: &BrokerEndpoint, client_id: &str) -> (AsyncClient, EventLoop) {
        let mut opts = MqttOptions::new(client_id, endpoint.host.as_str(), endpoint.port);
        opts.set_keep_alive(KEEP_ALIVE);
        opts.set_clean_session(true);
        AsyncClient::new(opts, REQUEST_CAPACITY)
    }

    fn qos(qos: QoS) -> QoS {
        qos
    }

    fn try_disconnect(client: &AsyncClient) -> Result<()> {
        client.try_disconnect().map_err(client_error)
    }

    fn try_subscribe(client: &AsyncClient, topic: &str, qos: QoS) -> Result<()> {
        client.try_subscribe(topic, qos).map_err(client_error)
    }

    async fn publish(client: &AsyncClient, topic: &str, qos: QoS, payload: Vec<u8>) -> Result<()> {
        client
            .publish(topic, qos, false, payload)
            .await
            .map_err(client_error)
    }

    async fn subscribe(client: &AsyncClient, topic: &str, qos: QoS) -> Result<()> {
        client.subscribe(topic, qos).await.map_err(client_error)
    }

    async fn poll(eventloop: &mut EventLoop) -> Step {
        match eventloop.poll().await {
            Ok(Event::Incoming(Incoming::ConnAck(ack))) => {
                if matches!(ack.code, ConnectReturnCode::Success) {
                    Step::Accepted
                } else {
                    Step::Refused(format!("{:?}", ack.code))
                }
            }
            Ok(Event::Incoming(Incoming::Publish(publish))) => Step::Message {
                topic: publish.topic,
                payload: publish.payload.to_vec(),
            },
            Ok(Event::Incoming(Incoming::Disconnect)) => Step::Closed,
            Ok(_) => Step::Other,
            Err(e) => Step::Failed(e.to_string()),
        }
    }
}
