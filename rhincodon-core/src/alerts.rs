//! Threshold Alerting for Canonical Readings
//!
//! ## Overview
//!
//! Four fixed rules, evaluated independently in a fixed order:
//! temperature band, dissolved oxygen floor, pressure anomaly against the
//! deployment baseline, and depth ceiling. Several rules may fire for one
//! reading, and none of them suppresses another.
//!
//! Alerting is deliberately stateless. There is no hysteresis and no
//! deduplication across messages: a reading that keeps violating a bound
//! re-emits the same alert on every evaluation. Live-view clients decide
//! how to present repeats; the relay does not.

use crate::reading::CanonicalReading;
use serde::{Deserialize, Serialize};

/// Which rule fired
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertKind {
    Temperature,
    Oxygen,
    Pressure,
    Depth,
}

impl AlertKind {
    /// Wire/database name for the rule
    pub const fn name(&self) -> &'static str {
        match self {
            AlertKind::Temperature => "temperature",
            AlertKind::Oxygen => "oxygen",
            AlertKind::Pressure => "pressure",
            AlertKind::Depth => "depth",
        }
    }
}

/// How urgent the violation is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Danger,
}

impl Severity {
    /// Wire/database name for the level
    pub const fn name(&self) -> &'static str {
        match self {
            Severity::Warning => "warning",
            Severity::Danger => "danger",
        }
    }
}

/// One threshold violation
///
/// Wire shape matches what live-view clients historically received:
/// `{"type": ..., "level": ..., "message": ..., "value": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertEvent {
    /// Rule that fired
    #[serde(rename = "type")]
    pub kind: AlertKind,
    /// Urgency level
    #[serde(rename = "level")]
    pub severity: Severity,
    /// Human-readable description including the offending value
    pub message: String,
    /// The value that crossed the bound
    pub value: f64,
}

/// Evaluates a reading against the fixed deployment thresholds
#[derive(Debug, Clone)]
pub struct ThresholdAlerter {
    /// Lower bound of the healthy temperature band in °C
    temp_min_c: f64,
    /// Upper bound of the healthy temperature band in °C
    temp_max_c: f64,
    /// Dissolved oxygen floor in mg/L
    oxygen_min_mg_l: f64,
    /// Gauge baseline for the deployed pressure sensor in kPa
    pressure_baseline_kpa: f64,
    /// Allowed deviation from the baseline in kPa
    pressure_tolerance_kpa: f64,
    /// Depth ceiling in metres
    depth_max_m: f64,
}

impl Default for ThresholdAlerter {
    fn default() -> Self {
        Self {
            // Healthy band for tropical surface water
            temp_min_c: 20.0,
            temp_max_c: 32.0,

            // Below this fish are in acute distress
            oxygen_min_mg_l: 4.0,

            // Baseline the deployed sensor reports at nominal depth
            pressure_baseline_kpa: -20.0,
            pressure_tolerance_kpa: 5.0,

            depth_max_m: 25.0,
        }
    }
}

impl ThresholdAlerter {
    /// Evaluate one reading.
    ///
    /// Returns alerts in fixed check order: temperature, oxygen,
    /// pressure, depth. Rules are independent; any subset may fire.
    pub fn evaluate(&self, reading: &CanonicalReading) -> Vec<AlertEvent> {
        let mut alerts = Vec::new();

        if reading.temperature < self.temp_min_c || reading.temperature > self.temp_max_c {
            alerts.push(AlertEvent {
                kind: AlertKind::Temperature,
                severity: Severity::Warning,
                message: format!("Temperature alert: {}°C", reading.temperature),
                value: reading.temperature,
            });
        }

        if reading.dissolved_oxygen < self.oxygen_min_mg_l {
            alerts.push(AlertEvent {
                kind: AlertKind::Oxygen,
                severity: Severity::Danger,
                message: format!("Low oxygen: {} mg/L", reading.dissolved_oxygen),
                value: reading.dissolved_oxygen,
            });
        }

        if (reading.pressure - self.pressure_baseline_kpa).abs() > self.pressure_tolerance_kpa {
            alerts.push(AlertEvent {
                kind: AlertKind::Pressure,
                severity: Severity::Warning,
                message: format!("Pressure anomaly: {} kPa", reading.pressure),
                value: reading.pressure,
            });
        }

        if reading.depth > self.depth_max_m {
            alerts.push(AlertEvent {
                kind: AlertKind::Depth,
                severity: Severity::Warning,
                message: format!("Deep dive: {} m", reading.depth),
                value: reading.depth,
            });
        }

        alerts
    }
}
