//! CSV Export of a Telemetry Series
//!
//! One header row naming each metric with its unit, then one row per
//! buffered sample in insertion order. The column order matches the
//! live-view charts so an exported file reads like the table on screen.

use crate::series::TelemetrySeries;
use std::io::{self, Write};

/// Header row of an exported file
pub const CSV_HEADER: &str =
    "Timestamp,Speed(cm/s),Temperature(°C),DO(mg/L),Pressure(kPa),Depth(m),AccelX(g),AccelY(g),AccelZ(g)";

/// Write the series as CSV to any sink.
///
/// An empty series produces only the header row.
pub fn write_csv<W: Write>(series: &TelemetrySeries, out: &mut W) -> io::Result<()> {
    writeln!(out, "{CSV_HEADER}")?;

    for row in series.rows() {
        writeln!(
            out,
            "{},{},{},{},{},{},{},{},{}",
            row.label,
            row.speed_cms,
            row.temperature,
            row.dissolved_oxygen,
            row.pressure,
            row.depth,
            row.accel_x,
            row.accel_y,
            row.accel_z,
        )?;
    }

    Ok(())
}

/// Render the series as an in-memory CSV string
pub fn to_csv_string(series: &TelemetrySeries) -> String {
    let mut buffer = Vec::new();
    // Writing into a Vec cannot fail
    write_csv(series, &mut buffer).expect("in-memory write");
    String::from_utf8(buffer).expect("CSV output is UTF-8")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reading::normalize;
    use serde_json::json;

    #[test]
    fn empty_series_exports_header_only() {
        let series = TelemetrySeries::new();
        let csv = to_csv_string(&series);

        assert_eq!(csv, format!("{CSV_HEADER}\n"));
    }

    #[test]
    fn rows_follow_insertion_order() {
        let mut series = TelemetrySeries::new();
        for (i, speed) in [12.5, 14.0].iter().enumerate() {
            let reading = normalize(
                &json!({
                    "speed_cms": speed,
                    "temperature": 25.5,
                    "dissolved_oxygen": 6.1,
                    "pressure": -20.0,
                    "depth": 3.0,
                }),
                0.0,
            );
            series.push(&reading, format!("10:00:0{i}"));
        }

        let csv = to_csv_string(&series);
        let lines: Vec<&str> = csv.lines().collect();

        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], CSV_HEADER);
        assert_eq!(lines[1], "10:00:00,12.5,25.5,6.1,-20,3,0,0,0");
        assert_eq!(lines[2], "10:00:01,14,25.5,6.1,-20,3,0,0,0");
    }
}
