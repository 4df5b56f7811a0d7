//! Process-Wide Context
//!
//! The original system kept its connection handles and counters in
//! module-level globals. Here everything single-instance-per-process is
//! gathered into one [`AppContext`] owned by the composition root and
//! cloned into whichever handler needs it.

use crate::{commands::CommandRelay, live::LiveHub, store::Store};
use rhincodon_core::Clock;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Instant;

/// Connectivity flags surfaced by the status endpoint
#[derive(Clone, Default)]
pub struct LinkStatus {
    mqtt: Arc<AtomicBool>,
    database: Arc<AtomicBool>,
}

impl LinkStatus {
    /// Record broker connectivity
    pub fn set_mqtt(&self, up: bool) {
        self.mqtt.store(up, Ordering::Relaxed);
    }

    /// Whether the broker link is up
    pub fn mqtt_up(&self) -> bool {
        self.mqtt.load(Ordering::Relaxed)
    }

    /// Record database connectivity
    pub fn set_database(&self, up: bool) {
        self.database.store(up, Ordering::Relaxed);
    }

    /// Whether the database is reachable
    pub fn database_up(&self) -> bool {
        self.database.load(Ordering::Relaxed)
    }
}

/// Shared state handed to HTTP and WebSocket handlers
#[derive(Clone)]
pub struct AppContext {
    pub store: Arc<Store>,
    pub hub: LiveHub,
    pub relay: Arc<CommandRelay>,
    pub link: LinkStatus,
    pub clock: Arc<dyn Clock + Send + Sync>,
    pub started_at: Instant,
}

impl AppContext {
    /// Seconds this process has been up
    pub fn uptime_seconds(&self) -> f64 {
        self.started_at.elapsed().as_secs_f64()
    }

    /// Current wall clock in epoch milliseconds
    pub fn epoch_millis(&self) -> i64 {
        (self.clock.epoch_seconds() * 1000.0) as i64
    }
}
