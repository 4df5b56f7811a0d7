//! Live-View Wire Protocol
//!
//! Events pushed from the relay to connected live-view clients, shared
//! here so the server and any client binary agree on the shape. Each
//! frame is one JSON object: `{"event": <name>, "payload": <body>}`.
//!
//! `welcome` is sent once per new connection; `data` and `alerts` fan
//! out to every connected client in one pass per inbound message;
//! `history` answers a client's explicit request; `emergency_activated`
//! announces that an emergency release command went out.

use crate::alerts::AlertEvent;
use crate::reading::CanonicalReading;
use serde::{Deserialize, Serialize};

/// One frame pushed to live-view clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload", rename_all = "snake_case")]
pub enum PushEvent {
    /// Greeting sent once per new connection
    Welcome {
        /// Human-readable greeting
        message: String,
        /// Server time in epoch milliseconds
        timestamp: i64,
    },
    /// One canonical reading, nested-object shape
    Data(CanonicalReading),
    /// Alerts raised by the reading that was just pushed, in check order
    Alerts(Vec<AlertEvent>),
    /// Response to a history request: stored rows, oldest first
    History(Vec<serde_json::Value>),
    /// An emergency release was triggered
    EmergencyActivated(bool),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::{AlertKind, Severity};
    use crate::reading::normalize;
    use serde_json::json;

    #[test]
    fn data_frame_shape() {
        let reading = normalize(&json!({ "temperature": 25.0 }), 1_700_000_000.0);
        let frame = serde_json::to_value(PushEvent::Data(reading)).unwrap();

        assert_eq!(frame["event"], "data");
        assert_eq!(frame["payload"]["temperature"], 25.0);
        assert_eq!(frame["payload"]["location"]["lat"], 0.0);
    }

    #[test]
    fn alerts_frame_shape() {
        let alert = AlertEvent {
            kind: AlertKind::Depth,
            severity: Severity::Warning,
            message: "Deep dive: 30 m".into(),
            value: 30.0,
        };
        let frame = serde_json::to_value(PushEvent::Alerts(vec![alert])).unwrap();

        assert_eq!(frame["event"], "alerts");
        assert_eq!(frame["payload"][0]["type"], "depth");
        assert_eq!(frame["payload"][0]["level"], "warning");
    }

    #[test]
    fn frames_round_trip() {
        let reading = normalize(&json!({ "depth": 3.0 }), 0.0);
        let events = [
            PushEvent::Welcome {
                message: "hello".into(),
                timestamp: 1_700_000_000_000,
            },
            PushEvent::Data(reading),
            PushEvent::Alerts(vec![]),
            PushEvent::History(vec![json!({ "id": 1 })]),
            PushEvent::EmergencyActivated(true),
        ];

        for event in events {
            let text = serde_json::to_string(&event).unwrap();
            let back: PushEvent = serde_json::from_str(&text).unwrap();
            assert_eq!(back, event);
        }
    }
}
