//! Device Command Relay
//!
//! Command messages arrive either on the broker's command topic or from
//! a live-view client over the WebSocket; both paths land here. Each
//! known command becomes one outbound publish of
//! `{"command": ..., "timestamp": <epoch ms>, ...}` on the device's
//! command topic. Unknown command types are logged and ignored.

use async_trait::async_trait;
use rhincodon_core::Clock;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use crate::live::LiveHub;

/// Failure reported by the outbound publisher
#[derive(Debug, Error)]
#[error("{0}")]
pub struct PublishError(String);

impl PublishError {
    /// Wrap an underlying transport failure
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Outbound side of the broker link
#[async_trait]
pub trait CommandPublisher: Send + Sync {
    /// Publish one payload on a topic
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), PublishError>;
}

/// Inbound command message shapes
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum CommandMessage {
    EmergencyRelease,
    PumpControl {
        #[serde(default)]
        state: bool,
    },
    Calibrate {
        sensor: String,
        value: f64,
    },
}

/// Turns inbound command messages into outbound device publishes
pub struct CommandRelay {
    publisher: Arc<dyn CommandPublisher>,
    topic: String,
    hub: LiveHub,
    clock: Arc<dyn Clock + Send + Sync>,
}

impl CommandRelay {
    pub fn new(
        publisher: Arc<dyn CommandPublisher>,
        topic: String,
        hub: LiveHub,
        clock: Arc<dyn Clock + Send + Sync>,
    ) -> Self {
        Self {
            publisher,
            topic,
            hub,
            clock,
        }
    }

    /// Handle one raw command payload. Unknown or malformed commands
    /// are logged and dropped; nothing is published for them.
    pub async fn handle(&self, payload: &[u8]) {
        let command: CommandMessage = match serde_json::from_slice(payload) {
            Ok(command) => command,
            Err(e) => {
                warn!("ignoring unrecognized command: {e}");
                return;
            }
        };

        match command {
            CommandMessage::EmergencyRelease => {
                self.publish_command(json!({
                    "command": "emergency_release",
                    "timestamp": self.epoch_millis(),
                }))
                .await;
                self.hub.announce_emergency();
                warn!("emergency release activated");
            }
            CommandMessage::PumpControl { state } => {
                let command = if state { "pump_on" } else { "pump_off" };
                self.publish_command(json!({
                    "command": command,
                    "timestamp": self.epoch_millis(),
                }))
                .await;
                info!("pump {} command sent", if state { "on" } else { "off" });
            }
            CommandMessage::Calibrate { sensor, value } => {
                self.publish_command(json!({
                    "command": "calibrate",
                    "sensor": sensor,
                    "value": value,
                    "timestamp": self.epoch_millis(),
                }))
                .await;
                info!("calibration command sent for {sensor}");
            }
        }
    }

    async fn publish_command(&self, body: Value) {
        let payload = body.to_string().into_bytes();
        if let Err(e) = self.publisher.publish(&self.topic, payload).await {
            warn!("command publish failed: {e}");
        }
    }

    fn epoch_millis(&self) -> i64 {
        (self.clock.epoch_seconds() * 1000.0) as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rhincodon_core::{protocol::PushEvent, FixedClock};
    use std::sync::Mutex;

    #[derive(Default)]
    struct MockPublisher {
        published: Mutex<Vec<(String, Value)>>,
    }

    #[async_trait]
    impl CommandPublisher for MockPublisher {
        async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), PublishError> {
            let body: Value = serde_json::from_slice(&payload)
                .map_err(|e| PublishError::new(e.to_string()))?;
            self.published.lock().unwrap().push((topic.to_owned(), body));
            Ok(())
        }
    }

    fn relay(publisher: Arc<MockPublisher>) -> (CommandRelay, LiveHub) {
        let hub = LiveHub::new(8);
        let clock = Arc::new(FixedClock::new(1_700_000_000.0));
        (
            CommandRelay::new(publisher, "monitor/hiu-paus/command".into(), hub.clone(), clock),
            hub,
        )
    }

    #[tokio::test]
    async fn emergency_release_publishes_and_announces() {
        let publisher = Arc::new(MockPublisher::default());
        let (relay, hub) = relay(Arc::clone(&publisher));
        let mut events = hub.subscribe();

        relay.handle(br#"{"type": "emergency_release"}"#).await;

        let published = publisher.published.lock().unwrap();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].0, "monitor/hiu-paus/command");
        assert_eq!(published[0].1["command"], "emergency_release");
        assert_eq!(published[0].1["timestamp"], 1_700_000_000_000i64);

        assert!(matches!(
            events.try_recv().unwrap(),
            PushEvent::EmergencyActivated(true)
        ));
    }

    #[tokio::test]
    async fn pump_control_maps_state_to_command_name() {
        let publisher = Arc::new(MockPublisher::default());
        let (relay, _hub) = relay(Arc::clone(&publisher));

        relay.handle(br#"{"type": "pump_control", "state": true}"#).await;
        relay.handle(br#"{"type": "pump_control", "state": false}"#).await;

        let published = publisher.published.lock().unwrap();
        assert_eq!(published[0].1["command"], "pump_on");
        assert_eq!(published[1].1["command"], "pump_off");
    }

    #[tokio::test]
    async fn calibrate_carries_sensor_and_value() {
        let publisher = Arc::new(MockPublisher::default());
        let (relay, _hub) = relay(Arc::clone(&publisher));

        relay
            .handle(br#"{"type": "calibrate", "sensor": "dissolved_oxygen", "value": 4.2}"#)
            .await;

        let published = publisher.published.lock().unwrap();
        assert_eq!(published[0].1["command"], "calibrate");
        assert_eq!(published[0].1["sensor"], "dissolved_oxygen");
        assert_eq!(published[0].1["value"], 4.2);
    }

    #[tokio::test]
    async fn unknown_command_type_publishes_nothing() {
        let publisher = Arc::new(MockPublisher::default());
        let (relay, _hub) = relay(Arc::clone(&publisher));

        relay.handle(br#"{"type": "self_destruct"}"#).await;
        relay.handle(b"not json at all").await;

        assert!(publisher.published.lock().unwrap().is_empty());
    }
}
