use super::session::{client_error, MqttDriver, Session, Step};
use super::{KEEP_ALIVE, REQUEST_CAPACITY};
use crate::error::Result;
use crate::models::BrokerEndpoint;
use async_trait::async_trait;
use rumqttc::v5::mqttbytes::v5::{ConnectReturnCode, Packet};
use rumqttc::v5::mqttbytes::QoS as QoSV5;
use rumqttc::v5::{AsyncClient, Event, EventLoop, MqttOptions};
use rumqttc::QoS;

/// MQTT 5 backend over `rumqttc::v5::AsyncClient`.
pub type RumqttV5Backend = Session<Mqtt5>;

pub struct Mqtt5;

#[async_trait]
impl MqttDriver for Mqtt5 {
    type Client = AsyncClient;
    type EventLoop = EventLoop;
    type QoS = QoSV5;

    const NAME: &'static str = "rumqttc-v5";

    fn open(endpoint: &BrokerEndpoint, client_id: &str) -> (AsyncClient, EventLoop) {
        let mut opts = MqttOptions::new(client_id, endpoint.host.as_str(), endpoint.port);
        opts.set_keep_alive(KEEP_ALIVE);
        opts.set_clean_start(true);
        AsyncClient::new(opts, REQUEST_CAPACITY)
    }

    fn qos(qos: QoS) -> QoSV5 {
        match qos {
            QoS::AtMostOnce => QoSV5::AtMostOnce,
            QoS::AtLeastOnce => QoSV5::AtLeastOnce,
            QoS::ExactlyOnce => QoSV5::ExactlyOnce,
        }
    }

    fn try_disconnect(client: &AsyncClient) -> Result<()> {
        client.try_disconnect().map_err(client_error)
    }

    fn try_subscribe(client: &AsyncClient, topic: &str, qos: QoSV5) -> Result<()> {
        client.try_subscribe(topic, qos).map_err(client_error)
    }

    async fn publish(client: &AsyncClient, topic: &str, qos: QoSV5, payload: Vec<u8>) -> Result<()> {
        client
            .publish(topic, qos, false, payload)
            .await
            .map_err(client_error)
    }

    async fn subscribe(client: &AsyncClient, topic: &str, qos: QoSV5) -> Result<()> {
        client.subscribe(topic, qos).await.map_err(client_error)
    }

    async fn poll(eventloop: &mut EventLoop) -> Step {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                if matches!(ack.code, ConnectReturnCode::Success) {
                    Step::Accepted
                } else {
                    Step::Refused(format!("{:?}", ack.code))
                }
            }
            // v5 topics travel as raw bytes
            Ok(Event::Incoming(Packet::Publish(publish))) => Step::Message {
                topic: String::from_utf8_lossy(&publish.topic).into_owned(),
                payload: publish.payload.to_vec(),
            },
            Ok(Event::Incoming(Packet::Disconnect(_))) => Step::Closed,
            Ok(_) => Step::Other,
            Err(e) => Step::Failed(e.to_string()),
        }
    }
}
