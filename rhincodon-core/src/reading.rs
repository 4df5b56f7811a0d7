//! Canonical Reading Model and Payload Normalization
//!
//! ## Overview
//!
//! The monitoring device has shipped several firmware revisions with two
//! payload conventions: a flattened one (`latitude`, `accel_x`, ...) and a
//! nested one (`location.lat`, `acceleration.x`, ...), sometimes mixed in
//! a single message. This module folds every inbound shape into one
//! [`CanonicalReading`] that the rest of the system can rely on.
//!
//! ## Resolution Policy
//!
//! Each field is described by an ordered list of path candidates. The
//! nested path is always listed before its flattened alternate, so the
//! nested value wins when a payload carries both. The first candidate
//! that parses is taken; when none does, the field falls back to its
//! default (0, the placeholder device id, or `false`).
//!
//! Normalization is a total function. A reading is never dropped because
//! one sensor produced garbage: the glitched field becomes its default
//! and the rest of the record survives. Downstream code can therefore
//! assume every numeric field is present and finite, always.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Device id used when a payload does not identify itself
pub const DEFAULT_DEVICE_ID: &str = "HIU_PAUS_001";

/// GPS fix bundled with a reading
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoFix {
    /// Latitude in decimal degrees
    pub lat: f64,
    /// Longitude in decimal degrees
    pub lon: f64,
    /// Number of satellites used for the fix
    pub satellites: i64,
}

/// Three-axis sample from the IMU
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AxisTriple {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// The normalized, always-complete sensor sample flowing through the
/// relay
///
/// Constructed fresh per inbound message and never mutated afterwards.
/// Field names follow the device firmware's snake_case convention so the
/// serialized form matches what live-view clients and the database
/// expect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalReading {
    /// Device identifier, [`DEFAULT_DEVICE_ID`] when absent
    pub device_id: String,
    /// Seconds since epoch; receipt time when the payload carries none
    pub timestamp: f64,
    /// Swimming speed in cm/s
    pub speed_cms: f64,
    /// Water temperature in °C
    pub temperature: f64,
    /// Dissolved oxygen in mg/L
    pub dissolved_oxygen: f64,
    /// Gauge pressure in kPa
    pub pressure: f64,
    /// Depth in metres
    pub depth: f64,
    /// GPS fix
    pub location: GeoFix,
    /// Accelerometer sample in g
    pub acceleration: AxisTriple,
    /// Gyroscope sample in °/s
    pub gyroscope: AxisTriple,
    /// Data quality as an integer percentage
    pub quality: i64,
    /// Whether the ballast pump reports itself on
    pub pump_state: bool,
}

/// Ordered path candidates for one field, nested form first.
///
/// Adding a firmware convention means adding a path here, not adding a
/// branch to the normalizer.
type Paths = &'static [&'static [&'static str]];

const DEVICE_ID: Paths = &[&["device_id"]];
const TIMESTAMP: Paths = &[&["timestamp"]];
const SPEED_CMS: Paths = &[&["speed_cms"]];
const TEMPERATURE: Paths = &[&["temperature"]];
const DISSOLVED_OXYGEN: Paths = &[&["dissolved_oxygen"]];
const PRESSURE: Paths = &[&["pressure"]];
const DEPTH: Paths = &[&["depth"]];
const LAT: Paths = &[&["location", "lat"], &["latitude"]];
const LON: Paths = &[&["location", "lon"], &["longitude"]];
const SATELLITES: Paths = &[&["location", "satellites"], &["gps_satellites"]];
const ACCEL_X: Paths = &[&["acceleration", "x"], &["accel_x"]];
const ACCEL_Y: Paths = &[&["acceleration", "y"], &["accel_y"]];
const ACCEL_Z: Paths = &[&["acceleration", "z"], &["accel_z"]];
const GYRO_X: Paths = &[&["gyroscope", "x"], &["gyro_x"]];
const GYRO_Y: Paths = &[&["gyroscope", "y"], &["gyro_y"]];
const GYRO_Z: Paths = &[&["gyroscope", "z"], &["gyro_z"]];
const QUALITY: Paths = &[&["quality"], &["data_quality"]];
const PUMP_STATE: Paths = &[&["pump_state"]];

/// Normalize an untyped inbound payload into a [`CanonicalReading`].
///
/// `receipt_epoch_seconds` supplies the timestamp default; pass the
/// current wall clock at the point the message arrived.
///
/// Total over any JSON value. A payload that is not even an object
/// normalizes to an all-defaults reading rather than an error.
pub fn normalize(raw: &Value, receipt_epoch_seconds: f64) -> CanonicalReading {
    CanonicalReading {
        device_id: string_field(raw, DEVICE_ID, DEFAULT_DEVICE_ID),
        timestamp: float_field_or(raw, TIMESTAMP, receipt_epoch_seconds),
        speed_cms: float_field(raw, SPEED_CMS),
        temperature: float_field(raw, TEMPERATURE),
        dissolved_oxygen: float_field(raw, DISSOLVED_OXYGEN),
        pressure: float_field(raw, PRESSURE),
        depth: float_field(raw, DEPTH),
        location: GeoFix {
            lat: float_field(raw, LAT),
            lon: float_field(raw, LON),
            satellites: int_field(raw, SATELLITES),
        },
        acceleration: AxisTriple {
            x: float_field(raw, ACCEL_X),
            y: float_field(raw, ACCEL_Y),
            z: float_field(raw, ACCEL_Z),
        },
        gyroscope: AxisTriple {
            x: float_field(raw, GYRO_X),
            y: float_field(raw, GYRO_Y),
            z: float_field(raw, GYRO_Z),
        },
        quality: int_field(raw, QUALITY),
        pump_state: resolve(raw, PUMP_STATE).map(truthy).unwrap_or(false),
    }
}

/// Walk one dotted path into the payload
fn lookup<'a>(raw: &'a Value, path: &[&str]) -> Option<&'a Value> {
    let mut current = raw;
    for segment in path {
        current = current.get(segment)?;
    }
    Some(current)
}

/// First candidate path that exists in the payload, in table order
fn resolve<'a>(raw: &'a Value, paths: Paths) -> Option<&'a Value> {
    paths.iter().find_map(|path| lookup(raw, path))
}

fn float_field(raw: &Value, paths: Paths) -> f64 {
    float_field_or(raw, paths, 0.0)
}

fn float_field_or(raw: &Value, paths: Paths, default: f64) -> f64 {
    for path in paths {
        if let Some(value) = lookup(raw, path) {
            if let Some(parsed) = parse_f64(value) {
                return parsed;
            }
            log::trace!("unparsable value at {:?}, trying next candidate", path.join("."));
        }
    }
    default
}

fn int_field(raw: &Value, paths: Paths) -> i64 {
    for path in paths {
        if let Some(value) = lookup(raw, path) {
            if let Some(parsed) = parse_i64(value) {
                return parsed;
            }
            log::trace!("unparsable value at {:?}, trying next candidate", path.join("."));
        }
    }
    0
}

fn string_field(raw: &Value, paths: Paths, default: &str) -> String {
    resolve(raw, paths)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .unwrap_or_else(|| default.to_owned())
}

/// Lossy numeric parse: numbers pass through, numeric strings parse,
/// everything else is "not provided". Non-finite values are rejected so
/// the finiteness invariant holds even for payloads smuggling in huge
/// exponents.
fn parse_f64(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|f| f.is_finite())
}

/// Integer parse with the same tolerance; fractional input truncates
/// the way the firmware's older integer fields did.
fn parse_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().filter(|f| f.is_finite()).map(|f| f as i64))
        }
        _ => None,
    }
}

/// JS-style truthiness, preserved for `pump_state` compatibility: null,
/// `false`, ±0, NaN and the empty string are false; every other value
/// (including the string `"false"`) is true.
fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const RECEIPT: f64 = 1_700_000_000.0;

    #[test]
    fn empty_payload_is_all_defaults() {
        let reading = normalize(&json!({}), RECEIPT);

        assert_eq!(reading.device_id, DEFAULT_DEVICE_ID);
        assert_eq!(reading.timestamp, RECEIPT);
        assert_eq!(reading.speed_cms, 0.0);
        assert_eq!(reading.temperature, 0.0);
        assert_eq!(reading.dissolved_oxygen, 0.0);
        assert_eq!(reading.pressure, 0.0);
        assert_eq!(reading.depth, 0.0);
        assert_eq!(reading.location.lat, 0.0);
        assert_eq!(reading.location.satellites, 0);
        assert_eq!(reading.acceleration.x, 0.0);
        assert_eq!(reading.gyroscope.z, 0.0);
        assert_eq!(reading.quality, 0);
        assert!(!reading.pump_state);
    }

    #[test]
    fn non_object_payload_still_normalizes() {
        for raw in [json!(null), json!(42), json!("telemetry"), json!([1, 2, 3])] {
            let reading = normalize(&raw, RECEIPT);
            assert_eq!(reading.device_id, DEFAULT_DEVICE_ID);
            assert_eq!(reading.timestamp, RECEIPT);
        }
    }

    #[test]
    fn flattened_convention_accepted() {
        let raw = json!({
            "device_id": "HIU_PAUS_007",
            "latitude": -7.79,
            "longitude": 110.37,
            "gps_satellites": 8,
            "accel_x": 0.1,
            "accel_y": -0.2,
            "accel_z": 0.98,
            "gyro_x": 1.5,
            "data_quality": 87,
        });
        let reading = normalize(&raw, RECEIPT);

        assert_eq!(reading.device_id, "HIU_PAUS_007");
        assert_eq!(reading.location.lat, -7.79);
        assert_eq!(reading.location.satellites, 8);
        assert_eq!(reading.acceleration.z, 0.98);
        assert_eq!(reading.gyroscope.x, 1.5);
        assert_eq!(reading.quality, 87);
    }

    #[test]
    fn nested_value_wins_over_flattened() {
        let raw = json!({
            "location": { "lat": -7.0, "lon": 110.0, "satellites": 9 },
            "latitude": 99.0,
            "longitude": 99.0,
            "gps_satellites": 1,
            "acceleration": { "x": 0.5 },
            "accel_x": 42.0,
        });
        let reading = normalize(&raw, RECEIPT);

        assert_eq!(reading.location.lat, -7.0);
        assert_eq!(reading.location.lon, 110.0);
        assert_eq!(reading.location.satellites, 9);
        assert_eq!(reading.acceleration.x, 0.5);
    }

    #[test]
    fn unparsable_nested_falls_through_to_flattened() {
        let raw = json!({
            "location": { "lat": "garbage" },
            "latitude": -7.5,
        });
        assert_eq!(normalize(&raw, RECEIPT).location.lat, -7.5);
    }

    #[test]
    fn numeric_strings_parse() {
        let raw = json!({
            "temperature": "26.4",
            "depth": " 12.5 ",
            "quality": "93",
        });
        let reading = normalize(&raw, RECEIPT);

        assert_eq!(reading.temperature, 26.4);
        assert_eq!(reading.depth, 12.5);
        assert_eq!(reading.quality, 93);
    }

    #[test]
    fn garbage_fields_become_defaults_without_failing_the_record() {
        let raw = json!({
            "temperature": "not a number",
            "pressure": { "unexpected": "object" },
            "depth": [4.0],
            "dissolved_oxygen": 6.2,
        });
        let reading = normalize(&raw, RECEIPT);

        assert_eq!(reading.temperature, 0.0);
        assert_eq!(reading.pressure, 0.0);
        assert_eq!(reading.depth, 0.0);
        // The healthy field survives
        assert_eq!(reading.dissolved_oxygen, 6.2);
    }

    #[test]
    fn payload_timestamp_is_kept() {
        let raw = json!({ "timestamp": 1_650_000_000.5 });
        assert_eq!(normalize(&raw, RECEIPT).timestamp, 1_650_000_000.5);
    }

    #[test]
    fn pump_state_truthiness() {
        let cases = [
            (json!({ "pump_state": true }), true),
            (json!({ "pump_state": false }), false),
            (json!({ "pump_state": 1 }), true),
            (json!({ "pump_state": 0 }), false),
            (json!({ "pump_state": "on" }), true),
            (json!({ "pump_state": "false" }), true), // JS Boolean("false")
            (json!({ "pump_state": "" }), false),
            (json!({ "pump_state": null }), false),
            (json!({}), false),
        ];
        for (raw, expected) in cases {
            assert_eq!(normalize(&raw, RECEIPT).pump_state, expected, "payload {raw}");
        }
    }

    #[test]
    fn every_numeric_field_is_finite() {
        let raw = json!({
            "temperature": "NaN",
            "pressure": "inf",
            "depth": 1e308,
            "speed_cms": "1e999",
        });
        let reading = normalize(&raw, RECEIPT);

        for value in [
            reading.speed_cms,
            reading.temperature,
            reading.dissolved_oxygen,
            reading.pressure,
            reading.depth,
            reading.location.lat,
            reading.location.lon,
            reading.acceleration.x,
            reading.acceleration.y,
            reading.acceleration.z,
            reading.gyroscope.x,
            reading.gyroscope.y,
            reading.gyroscope.z,
            reading.timestamp,
        ] {
            assert!(value.is_finite());
        }
    }
}
