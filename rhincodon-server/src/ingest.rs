//! Telemetry Ingestion Pipeline
//!
//! ## Overview
//!
//! One inbound broker message flows through four stages:
//!
//! ```text
//! raw payload → normalize → persist → broadcast → alert / broadcast alerts
//! ```
//!
//! The pipeline never propagates a failure to the transport loop, and
//! failure in one stage does not starve the others. The ordering encodes
//! a priority: live-view freshness outranks durability, so a reading
//! whose insert failed is still broadcast and still alerted on. Only a
//! payload that does not parse as JSON at all aborts the message; in
//! that case nothing is persisted and nothing is broadcast.
//!
//! The persistence sink sits behind [`TelemetrySink`] so the pipeline
//! can be exercised without a database.

use crate::live::LiveHub;
use async_trait::async_trait;
use rhincodon_core::{normalize, AlertEvent, CanonicalReading, Clock, ThresholdAlerter};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// Failure reported by a persistence sink
#[derive(Debug, Error)]
#[error("{0}")]
pub struct SinkError(String);

impl SinkError {
    /// Wrap an underlying store failure
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Durable destination for readings and alerts
#[async_trait]
pub trait TelemetrySink: Send + Sync {
    /// Append one reading
    async fn store_reading(&self, reading: &CanonicalReading) -> Result<(), SinkError>;

    /// Append the alerts one reading raised
    async fn store_alerts(&self, device_id: &str, alerts: &[AlertEvent]) -> Result<(), SinkError>;
}

/// Orchestrates normalize → persist → broadcast → alert for each
/// inbound message
pub struct IngestPipeline<S> {
    sink: Arc<S>,
    hub: LiveHub,
    alerter: ThresholdAlerter,
    clock: Arc<dyn Clock + Send + Sync>,
}

impl<S: TelemetrySink> IngestPipeline<S> {
    pub fn new(sink: Arc<S>, hub: LiveHub, clock: Arc<dyn Clock + Send + Sync>) -> Self {
        Self {
            sink,
            hub,
            alerter: ThresholdAlerter::default(),
            clock,
        }
    }

    /// Process one inbound telemetry payload.
    ///
    /// Infallible from the caller's point of view; every failure mode
    /// is logged and contained here.
    pub async fn ingest(&self, payload: &[u8]) {
        let raw: serde_json::Value = match serde_json::from_slice(payload) {
            Ok(value) => value,
            Err(e) => {
                warn!("discarding malformed telemetry payload: {e}");
                return;
            }
        };

        let reading = normalize(&raw, self.clock.epoch_seconds());
        debug!(device = %reading.device_id, "telemetry received");

        // Best effort: a failed insert must not hold up the live view
        if let Err(e) = self.sink.store_reading(&reading).await {
            warn!("failed to persist reading: {e}");
        }

        self.hub.broadcast_reading(&reading);

        let alerts = self.alerter.evaluate(&reading);
        if !alerts.is_empty() {
            self.hub.broadcast_alerts(&alerts);
            if let Err(e) = self.sink.store_alerts(&reading.device_id, &alerts).await {
                warn!("failed to persist alerts: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rhincodon_core::{protocol::PushEvent, FixedClock};
    use std::sync::Mutex;
    use tokio::sync::broadcast::error::TryRecvError;

    /// Records sink calls; optionally fails them all
    #[derive(Default)]
    struct MockSink {
        readings: Mutex<Vec<CanonicalReading>>,
        alerts: Mutex<Vec<(String, Vec<AlertEvent>)>>,
        fail: bool,
    }

    impl MockSink {
        fn failing() -> Self {
            Self {
                fail: true,
                ..Self::default()
            }
        }
    }

    #[async_trait]
    impl TelemetrySink for MockSink {
        async fn store_reading(&self, reading: &CanonicalReading) -> Result<(), SinkError> {
            if self.fail {
                return Err(SinkError::new("connection refused"));
            }
            self.readings.lock().unwrap().push(reading.clone());
            Ok(())
        }

        async fn store_alerts(
            &self,
            device_id: &str,
            alerts: &[AlertEvent],
        ) -> Result<(), SinkError> {
            if self.fail {
                return Err(SinkError::new("connection refused"));
            }
            self.alerts
                .lock()
                .unwrap()
                .push((device_id.to_owned(), alerts.to_vec()));
            Ok(())
        }
    }

    fn pipeline(sink: Arc<MockSink>) -> (IngestPipeline<MockSink>, LiveHub) {
        let hub = LiveHub::new(16);
        let clock = Arc::new(FixedClock::new(1_700_000_000.0));
        (IngestPipeline::new(sink, hub.clone(), clock), hub)
    }

    #[tokio::test]
    async fn nominal_reading_is_persisted_and_broadcast() {
        let sink = Arc::new(MockSink::default());
        let (pipeline, hub) = pipeline(Arc::clone(&sink));
        let mut events = hub.subscribe();

        pipeline
            .ingest(br#"{"device_id": "HIU_PAUS_002", "temperature": 25.0, "dissolved_oxygen": 6.0, "pressure": -20.0, "depth": 3.0}"#)
            .await;

        let stored = sink.readings.lock().unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].device_id, "HIU_PAUS_002");

        match events.try_recv().unwrap() {
            PushEvent::Data(reading) => assert_eq!(reading.temperature, 25.0),
            other => panic!("expected data frame, got {other:?}"),
        }
        // Nominal values: no alerts frame
        assert!(matches!(events.try_recv(), Err(TryRecvError::Empty)));
        assert!(sink.alerts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn alerts_follow_the_data_frame() {
        let sink = Arc::new(MockSink::default());
        let (pipeline, hub) = pipeline(Arc::clone(&sink));
        let mut events = hub.subscribe();

        pipeline
            .ingest(br#"{"temperature": 35.0, "dissolved_oxygen": 2.0, "pressure": -20.0, "depth": 3.0}"#)
            .await;

        assert!(matches!(events.try_recv().unwrap(), PushEvent::Data(_)));
        match events.try_recv().unwrap() {
            PushEvent::Alerts(alerts) => assert_eq!(alerts.len(), 2),
            other => panic!("expected alerts frame, got {other:?}"),
        }

        let persisted = sink.alerts.lock().unwrap();
        assert_eq!(persisted.len(), 1);
        assert_eq!(persisted[0].1.len(), 2);
    }

    #[tokio::test]
    async fn persistence_failure_does_not_block_broadcast_or_alerting() {
        let sink = Arc::new(MockSink::failing());
        let (pipeline, hub) = pipeline(Arc::clone(&sink));
        let mut events = hub.subscribe();

        pipeline
            .ingest(br#"{"temperature": 35.0, "dissolved_oxygen": 6.0, "pressure": -20.0, "depth": 3.0}"#)
            .await;

        assert!(matches!(events.try_recv().unwrap(), PushEvent::Data(_)));
        assert!(matches!(events.try_recv().unwrap(), PushEvent::Alerts(_)));
    }

    #[tokio::test]
    async fn malformed_payload_leaves_all_state_untouched() {
        let sink = Arc::new(MockSink::default());
        let (pipeline, hub) = pipeline(Arc::clone(&sink));
        let mut events = hub.subscribe();

        pipeline.ingest(b"this is not json {").await;

        assert!(sink.readings.lock().unwrap().is_empty());
        assert!(sink.alerts.lock().unwrap().is_empty());
        assert!(matches!(events.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn receipt_time_backfills_missing_timestamp() {
        let sink = Arc::new(MockSink::default());
        let (pipeline, _hub) = pipeline(Arc::clone(&sink));

        pipeline.ingest(b"{}").await;

        let stored = sink.readings.lock().unwrap();
        assert_eq!(stored[0].timestamp, 1_700_000_000.0);
    }
}
