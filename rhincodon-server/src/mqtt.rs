//! Broker Link
//!
//! Subscribes to the telemetry topic and its sibling command topic,
//! hands inbound publishes to the ingestion pipeline or the command
//! relay, and carries outbound command publishes. Connection loss is
//! handled by the fixed-delay supervisor: log, wait, dial again,
//! forever. Subscriptions are re-issued on every CONNACK so a reconnect
//! restores them.

use crate::{
    commands::{CommandPublisher, CommandRelay, PublishError},
    config::MqttConfig,
    context::LinkStatus,
    ingest::{IngestPipeline, TelemetrySink},
};
use async_trait::async_trait;
use rhincodon_core::LinkSupervisor;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use std::{sync::Arc, time::Duration};
use tracing::{error, info};

/// Fixed reconnect delay for the broker link
const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Requests queued between the client handle and the event loop
const REQUEST_CHANNEL_CAPACITY: usize = 64;

/// Build broker options from configuration
pub fn mqtt_options(config: &MqttConfig) -> MqttOptions {
    let mut options = MqttOptions::new(&config.client_id, &config.host, config.port);
    options.set_keep_alive(Duration::from_secs(30));

    if let (Some(username), Some(password)) = (&config.username, &config.password) {
        options.set_credentials(username, password);
    }

    options
}

/// Create the client handle and its event loop
pub fn broker_client(config: &MqttConfig) -> (AsyncClient, EventLoop) {
    AsyncClient::new(mqtt_options(config), REQUEST_CHANNEL_CAPACITY)
}

/// Outbound publisher backed by the shared broker client.
///
/// Publishes issued while the link is down sit in the request queue
/// and flush once the event loop reconnects.
pub struct MqttPublisher {
    client: AsyncClient,
}

impl MqttPublisher {
    pub fn new(client: AsyncClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl CommandPublisher for MqttPublisher {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), PublishError> {
        self.client
            .publish(topic, QoS::AtLeastOnce, false, payload)
            .await
            .map_err(|e| PublishError::new(e.to_string()))
    }
}

/// Drive the broker link until the process exits.
///
/// Messages are dispatched in transport order, one at a time; the next
/// poll happens only after the current message has run the pipeline.
pub async fn run_broker_link<S: TelemetrySink>(
    config: MqttConfig,
    client: AsyncClient,
    mut eventloop: EventLoop,
    pipeline: Arc<IngestPipeline<S>>,
    relay: Arc<CommandRelay>,
    link: LinkStatus,
) {
    let mut supervisor = LinkSupervisor::new(RECONNECT_DELAY);
    let command_topic = config.command_subscribe_topic();

    loop {
        let delay = supervisor.next_attempt();
        tokio::time::sleep(delay).await;
        info!(
            "dialing broker {}:{} (attempt {})",
            config.host,
            config.port,
            supervisor.attempts()
        );

        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    supervisor.established();
                    link.set_mqtt(true);
                    info!("connected to MQTT broker");

                    subscribe(&client, &config.data_topic).await;
                    subscribe(&client, &command_topic).await;
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    if publish.topic == command_topic {
                        relay.handle(&publish.payload).await;
                    } else {
                        pipeline.ingest(&publish.payload).await;
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    error!("MQTT connection error: {e}");
                    link.set_mqtt(false);
                    supervisor.connection_lost();
                    break;
                }
            }
        }
    }
}

async fn subscribe(client: &AsyncClient, topic: &str) {
    match client.subscribe(topic, QoS::AtMostOnce).await {
        Ok(()) => info!("subscribed to {topic}"),
        Err(e) => error!("subscription to {topic} failed: {e}"),
    }
}
