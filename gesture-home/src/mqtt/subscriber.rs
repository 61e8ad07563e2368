//! Dashboard-side command subscriber.

use std::sync::Arc;
use std::time::Duration;

use rumqttc::{AsyncClient, ConnectReturnCode, Event, Packet, QoS};
use tracing::{debug, info, warn};

use super::MqttConfig;
use crate::command::CommandPayload;
use crate::source::now_ms;
use crate::web::Hub;

const REQUEST_CAPACITY: usize = 10;
const RECONNECT_DELAY: Duration = Duration::from_secs(2);

/// Receive commands forever, applying each to the hub.  Connection errors
/// are retried; malformed payloads are logged and skipped.
pub async fn run(config: MqttConfig, hub: Arc<Hub>) -> anyhow::Result<()> {
    let (client, mut eventloop) = AsyncClient::new(config.options("dashboard"), REQUEST_CAPACITY);
    info!(broker = %config.address(), topic = %config.topic, "MQTT subscriber started");

    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                if ack.code != ConnectReturnCode::Success {
                    warn!(code = ?ack.code, "broker refused connection");
                    continue;
                }
                info!(broker = %config.address(), "connected to MQTT broker");
                hub.set_broker_connected(true);
                // Clean sessions forget subscriptions, so subscribe on every connect.
                if let Err(e) = client.try_subscribe(config.topic.as_str(), QoS::AtLeastOnce) {
                    warn!(topic = %config.topic, "failed to subscribe: {}", e);
                }
            }
            Ok(Event::Incoming(Packet::SubAck(_))) => {
                info!(topic = %config.topic, "subscribed");
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                let topic: &[u8] = publish.topic.as_ref();
                handle_publish(&hub, &String::from_utf8_lossy(topic), &publish.payload);
            }
            Ok(Event::Incoming(Packet::Disconnect)) => {
                warn!("broker closed the connection");
                hub.set_broker_connected(false);
            }
            Ok(event) => debug!(?event, "mqtt event"),
            Err(e) => {
                if hub.is_broker_connected() {
                    warn!("lost MQTT connection: {}", e);
                } else {
                    debug!("MQTT connection failed: {}", e);
                }
                hub.set_broker_connected(false);
                tokio::time::sleep(RECONNECT_DELAY).await;
            }
        }
    }
}

fn handle_publish(hub: &Hub, topic: &str, payload: &[u8]) {
    match CommandPayload::decode(payload) {
        Ok(command) => {
            hub.apply_payload(&command, now_ms());
        }
        Err(e) => warn!(
            %topic,
            raw = %String::from_utf8_lossy(payload),
            "skipping message: {:#}",
            e
        ),
    }
}
