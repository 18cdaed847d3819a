//! MQTT command transport.
//!
//! Commands arrive on `<prefix>/<family>/set`; each applied command is
//! acknowledged with a retained state snapshot on `<prefix>/<family>/state`.
//! A retained `online` marker is published on `<prefix>/status` whenever the
//! session comes up.
//!
//! The client's event connection is polled from a dedicated task. That task
//! parses and dispatches command payloads inline (the payload never crosses
//! the event queue, which only carries discriminants) and reports session
//! transitions as [`Event::MqttUp`] / [`Event::MqttDown`].

use crate::reconcile::Family;

/// Route an incoming topic against `<prefix>/<family>/set`.
pub fn route_command(prefix: &str, topic: &str) -> Option<Family> {
    let rest = topic.strip_prefix(prefix)?.strip_prefix('/')?;
    let family = rest.strip_suffix("/set")?;
    match family {
        "ws" => Some(Family::Ws),
        "rgb" => Some(Family::Rgb),
        "white" => Some(Family::White),
        "relay" => Some(Family::Relay),
        _ => None,
    }
}

/// `<prefix>/<family>/set`
pub fn set_topic(prefix: &str, family: Family) -> heapless::String<48> {
    build_topic(prefix, family.as_str(), "set")
}

/// `<prefix>/<family>/state`
pub fn state_topic(prefix: &str, family: Family) -> heapless::String<48> {
    build_topic(prefix, family.as_str(), "state")
}

/// `<prefix>/status`
pub fn status_topic(prefix: &str) -> heapless::String<48> {
    let mut s = heapless::String::new();
    let _ = s.push_str(prefix);
    let _ = s.push_str("/status");
    s
}

fn build_topic(prefix: &str, family: &str, leaf: &str) -> heapless::String<48> {
    let mut s = heapless::String::new();
    let _ = s.push_str(prefix);
    let _ = s.push('/');
    let _ = s.push_str(family);
    let _ = s.push('/');
    let _ = s.push_str(leaf);
    s
}

#[cfg(target_os = "espidf")]
pub mod device {
    use std::sync::{Arc, Mutex};

    use esp_idf_svc::mqtt::client::{
        EspMqttClient, EventPayload, MqttClientConfiguration, QoS,
    };
    use log::{info, warn};

    use super::{route_command, set_topic, state_topic, status_topic};
    use crate::config::NodeConfig;
    use crate::drivers::task_pin::{spawn_on_core, Core};
    use crate::error::CommsError;
    use crate::events::{push_event, Event};
    use crate::reconcile::Family;

    const POLL_TASK_STACK_KB: usize = 8;
    const POLL_TASK_PRIORITY: u8 = 5;

    /// A command handler: applies the payload for one channel family and
    /// returns the acknowledgment snapshot to publish, or `None` if the
    /// command was rejected.
    pub type CommandHandler =
        dyn Fn(Family, &str) -> Option<serde_json::Value> + Send + Sync + 'static;

    /// Owns the MQTT client for one session. Dropping the service tears the
    /// session down; the supervisory loop recreates it on `RestartMqtt`.
    pub struct MqttService {
        client: Arc<Mutex<EspMqttClient<'static>>>,
        prefix: heapless::String<32>,
    }

    impl MqttService {
        pub fn start(
            cfg: &NodeConfig,
            handler: Arc<CommandHandler>,
        ) -> Result<Self, CommsError> {
            let conf = MqttClientConfiguration {
                client_id: Some(cfg.mqtt_client_id.as_str()),
                ..Default::default()
            };

            let (client, mut connection) =
                EspMqttClient::new(cfg.mqtt_broker_uri.as_str(), &conf)
                    .map_err(|e| {
                        warn!("mqtt: client start failed: {:?}", e);
                        CommsError::MqttStartFailed
                    })?;

            let client = Arc::new(Mutex::new(client));
            let prefix = cfg.mqtt_topic_prefix.clone();

            let poll_client = client.clone();
            let poll_prefix = prefix.clone();
            spawn_on_core(
                Core::Pro,
                POLL_TASK_PRIORITY,
                POLL_TASK_STACK_KB,
                "mqtt-poll\0",
                move || {
                    // Blocks until the client is dropped, then the
                    // connection closes and the task exits.
                    while let Ok(event) = connection.next() {
                        match event.payload() {
                            EventPayload::Connected(_) => {
                                info!("mqtt: session up");
                                on_connected(&poll_client, &poll_prefix);
                                push_event(Event::MqttUp);
                            }
                            EventPayload::Disconnected => {
                                warn!("mqtt: session lost");
                                push_event(Event::MqttDown);
                            }
                            EventPayload::Received {
                                topic: Some(topic),
                                data,
                                ..
                            } => {
                                on_message(
                                    &poll_client,
                                    &poll_prefix,
                                    handler.as_ref(),
                                    topic,
                                    data,
                                );
                            }
                            _ => {}
                        }
                    }
                    info!("mqtt: poll task exiting");
                },
            )
            .map_err(|e| {
                warn!("mqtt: poll task spawn failed: {}", e);
                CommsError::MqttStartFailed
            })?;

            Ok(Self { client, prefix })
        }

        /// Publish a retained state snapshot for one family, outside the
        /// command path (used when replaying persisted state at boot).
        pub fn publish_state(&self, family: Family, snapshot: &serde_json::Value) {
            let topic = state_topic(self.prefix.as_str(), family);
            publish_json(&self.client, topic.as_str(), snapshot);
        }
    }

    fn on_connected(client: &Arc<Mutex<EspMqttClient<'static>>>, prefix: &str) {
        let mut c = match client.lock() {
            Ok(c) => c,
            Err(_) => return,
        };
        for family in [Family::Ws, Family::Rgb, Family::White, Family::Relay] {
            let topic = set_topic(prefix, family);
            if let Err(e) = c.subscribe(topic.as_str(), QoS::AtLeastOnce) {
                warn!("mqtt: subscribe {} failed: {:?}", topic, e);
            }
        }
        let status = status_topic(prefix);
        if let Err(e) = c.publish(status.as_str(), QoS::AtLeastOnce, true, b"online") {
            warn!("mqtt: status publish failed: {:?}", e);
        }
    }

    fn on_message(
        client: &Arc<Mutex<EspMqttClient<'static>>>,
        prefix: &str,
        handler: &CommandHandler,
        topic: &str,
        data: &[u8],
    ) {
        let Some(family) = route_command(prefix, topic) else {
            return;
        };
        let Ok(payload) = core::str::from_utf8(data) else {
            warn!("mqtt: non-utf8 payload on {}", topic);
            return;
        };
        if let Some(ack) = handler(family, payload) {
            let topic = state_topic(prefix, family);
            publish_json(client, topic.as_str(), &ack);
            push_event(Event::StateDirty);
        }
    }

    fn publish_json(
        client: &Arc<Mutex<EspMqttClient<'static>>>,
        topic: &str,
        value: &serde_json::Value,
    ) {
        let body = match serde_json::to_vec(value) {
            Ok(b) => b,
            Err(e) => {
                warn!("mqtt: ack serialize failed: {}", e);
                return;
            }
        };
        let Ok(mut c) = client.lock() else { return };
        if let Err(e) = c.publish(topic, QoS::AtLeastOnce, true, &body) {
            warn!("mqtt: publish {} failed: {:?}", topic, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn routes_known_families() {
        assert_eq!(route_command("ultranode", "ultranode/ws/set"), Some(Family::Ws));
        assert_eq!(route_command("ultranode", "ultranode/rgb/set"), Some(Family::Rgb));
        assert_eq!(
            route_command("ultranode", "ultranode/white/set"),
            Some(Family::White)
        );
        assert_eq!(
            route_command("ultranode", "ultranode/relay/set"),
            Some(Family::Relay)
        );
    }

    #[test]
    fn rejects_foreign_topics() {
        assert_eq!(route_command("ultranode", "ultranode/ws/state"), None);
        assert_eq!(route_command("ultranode", "other/ws/set"), None);
        assert_eq!(route_command("ultranode", "ultranode/pump/set"), None);
        assert_eq!(route_command("ultranode", "ultranode"), None);
        assert_eq!(route_command("ultranode", ""), None);
    }

    #[test]
    fn prefix_match_is_exact() {
        // "ultranode2/ws/set" must not match prefix "ultranode".
        assert_eq!(route_command("ultranode", "ultranode2/ws/set"), None);
    }

    #[test]
    fn topic_builders() {
        assert_eq!(set_topic("node", Family::Ws).as_str(), "node/ws/set");
        assert_eq!(state_topic("node", Family::Relay).as_str(), "node/relay/state");
        assert_eq!(status_topic("node").as_str(), "node/status");
    }
}
