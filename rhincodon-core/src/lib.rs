//! Domain model for the "hiu paus" aquatic telemetry relay
//!
//! Everything that can be expressed without I/O lives here: turning the
//! heterogeneous payloads the device firmware emits into one canonical
//! reading, evaluating that reading against fixed alert thresholds,
//! keeping the bounded per-metric history that feeds live views, and the
//! small state machine that supervises a flaky network link.
//!
//! Key constraints:
//! - Normalization is total: a reading is never rejected because one
//!   sensor glitched; bad fields collapse to defaults instead.
//! - Alerting is stateless: a persisting violation re-alerts on every
//!   message, by contract.
//! - Series channels stay aligned: every push and every eviction touches
//!   all channels together.
//!
//! ```
//! use rhincodon_core::{normalize, ThresholdAlerter, TelemetrySeries};
//!
//! let raw = serde_json::json!({
//!     "temperature": 35.0,
//!     "dissolved_oxygen": 6.0,
//!     "pressure": -20.0,
//!     "depth": 4.2,
//! });
//! let reading = normalize(&raw, 1_700_000_000.0);
//!
//! let alerts = ThresholdAlerter::default().evaluate(&reading);
//! assert_eq!(alerts.len(), 1); // temperature out of band
//!
//! let mut series = TelemetrySeries::new();
//! series.push(&reading, "10:15:00".into());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod alerts;
pub mod export;
pub mod protocol;
pub mod reading;
pub mod series;
pub mod supervisor;
pub mod time;

// Public API
pub use alerts::{AlertEvent, AlertKind, Severity, ThresholdAlerter};
pub use reading::{normalize, AxisTriple, CanonicalReading, GeoFix, DEFAULT_DEVICE_ID};
pub use series::{RingBuffer, TelemetrySeries, SERIES_CAPACITY};
pub use supervisor::{LinkState, LinkSupervisor};
pub use time::{Clock, FixedClock, SystemClock};

/// Crate version string
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
