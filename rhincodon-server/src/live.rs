//! Live-View Fan-Out
//!
//! One broadcast channel carries every push event; each connected
//! WebSocket client holds a receiver and forwards frames to its socket.
//! Fan-out happens in one pass per inbound message, with no per-client
//! queueing beyond the channel itself. A slow client that lags behind
//! the channel capacity loses the oldest frames, never blocks ingest.

use crate::context::AppContext;
use axum::{
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    extract::State,
    response::Response,
};
use futures::{
    stream::{SplitSink, StreamExt},
    SinkExt,
};
use rhincodon_core::{protocol::PushEvent, AlertEvent, CanonicalReading};
use serde_json::Value;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// Shared fan-out hub for live-view clients
#[derive(Clone)]
pub struct LiveHub {
    tx: broadcast::Sender<PushEvent>,
    clients: Arc<AtomicUsize>,
}

impl LiveHub {
    /// Create a hub whose channel buffers `capacity` events per client
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self {
            tx,
            clients: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Subscribe to the push stream
    pub fn subscribe(&self) -> broadcast::Receiver<PushEvent> {
        self.tx.subscribe()
    }

    /// Push one reading to every connected client.
    ///
    /// Sending into an empty room is not an error; the reading simply
    /// has no audience.
    pub fn broadcast_reading(&self, reading: &CanonicalReading) {
        let _ = self.tx.send(PushEvent::Data(reading.clone()));
    }

    /// Push the alerts raised by the current reading, in check order
    pub fn broadcast_alerts(&self, alerts: &[AlertEvent]) {
        let _ = self.tx.send(PushEvent::Alerts(alerts.to_vec()));
    }

    /// Announce a triggered emergency release
    pub fn announce_emergency(&self) {
        let _ = self.tx.send(PushEvent::EmergencyActivated(true));
    }

    /// Number of currently connected live-view clients
    pub fn client_count(&self) -> usize {
        self.clients.load(Ordering::Relaxed)
    }

    /// Register a client for the status counter; the guard deregisters
    /// on drop
    pub fn track_client(&self) -> ClientGuard {
        self.clients.fetch_add(1, Ordering::Relaxed);
        ClientGuard {
            clients: Arc::clone(&self.clients),
        }
    }
}

/// Decrements the client counter when a session ends
pub struct ClientGuard {
    clients: Arc<AtomicUsize>,
}

impl Drop for ClientGuard {
    fn drop(&mut self) {
        self.clients.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Upgrade handler for the `/ws` route
pub async fn ws_handler(ws: WebSocketUpgrade, State(ctx): State<AppContext>) -> Response {
    ws.on_upgrade(move |socket| client_session(socket, ctx))
}

async fn client_session(socket: WebSocket, ctx: AppContext) {
    let _guard = ctx.hub.track_client();
    info!("live-view client connected ({} online)", ctx.hub.client_count());

    let mut events = ctx.hub.subscribe();
    let (mut sender, mut receiver) = socket.split();

    let welcome = PushEvent::Welcome {
        message: "Connected to hiu paus telemetry relay".into(),
        timestamp: ctx.epoch_millis(),
    };
    if send_frame(&mut sender, &welcome).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => {
                    if send_frame(&mut sender, &event).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("live-view client lagging, {skipped} frames dropped");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            message = receiver.next() => match message {
                Some(Ok(Message::Text(text))) => {
                    if let Some(reply) = handle_client_message(&ctx, &text).await {
                        if send_frame(&mut sender, &reply).await.is_err() {
                            break;
                        }
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!("live-view socket error: {e}");
                    break;
                }
            },
        }
    }

    info!("live-view client disconnected");
}

async fn send_frame(
    sender: &mut SplitSink<WebSocket, Message>,
    event: &PushEvent,
) -> Result<(), axum::Error> {
    match serde_json::to_string(event) {
        Ok(text) => sender.send(Message::Text(text)).await,
        Err(e) => {
            error!("failed to encode push frame: {e}");
            Ok(())
        }
    }
}

/// Dispatch one inbound client message.
///
/// `get_history` requests get a direct `history` reply; anything else
/// is treated as a command object and handed to the command relay, the
/// same path broker-side commands take.
async fn handle_client_message(ctx: &AppContext, text: &str) -> Option<PushEvent> {
    let value: Value = match serde_json::from_str(text) {
        Ok(value) => value,
        Err(e) => {
            debug!("ignoring unparsable client message: {e}");
            return None;
        }
    };

    match value.get("type").and_then(Value::as_str) {
        Some("get_history") => {
            let limit = value.get("limit").and_then(Value::as_i64).unwrap_or(50);
            let device_id = value
                .get("device_id")
                .and_then(Value::as_str)
                .map(str::to_owned);

            let rows = match ctx.store.recent_history(limit, device_id.as_deref()).await {
                Ok(rows) => rows
                    .into_iter()
                    .filter_map(|row| serde_json::to_value(row).ok())
                    .collect(),
                Err(e) => {
                    warn!("history fetch failed: {e}");
                    Vec::new()
                }
            };
            Some(PushEvent::History(rows))
        }
        _ => {
            ctx.relay.handle(text.as_bytes()).await;
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rhincodon_core::normalize;
    use serde_json::json;

    #[tokio::test]
    async fn hub_fans_out_to_all_subscribers() {
        let hub = LiveHub::new(8);
        let mut first = hub.subscribe();
        let mut second = hub.subscribe();

        let reading = normalize(&json!({ "temperature": 25.0 }), 0.0);
        hub.broadcast_reading(&reading);

        assert!(matches!(first.recv().await.unwrap(), PushEvent::Data(_)));
        assert!(matches!(second.recv().await.unwrap(), PushEvent::Data(_)));
    }

    #[tokio::test]
    async fn broadcast_without_clients_is_not_an_error() {
        let hub = LiveHub::new(8);
        let reading = normalize(&json!({}), 0.0);

        // No subscribers; must not panic or fail
        hub.broadcast_reading(&reading);
        hub.broadcast_alerts(&[]);
        hub.announce_emergency();
    }

    #[test]
    fn client_counter_tracks_guards() {
        let hub = LiveHub::new(8);
        assert_eq!(hub.client_count(), 0);

        let first = hub.track_client();
        let second = hub.track_client();
        assert_eq!(hub.client_count(), 2);

        drop(first);
        assert_eq!(hub.client_count(), 1);
        drop(second);
        assert_eq!(hub.client_count(), 0);
    }
}
