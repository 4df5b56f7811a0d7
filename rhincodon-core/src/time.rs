//! Clock abstraction
//!
//! The relay needs wall-clock time in two places: defaulting the
//! timestamp of a payload that carries none, and formatting the label a
//! sample gets in the live-view series. Both go through [`Clock`] so
//! tests can pin time.

use chrono::{DateTime, Local, TimeZone, Utc};

/// Source of wall-clock time
pub trait Clock {
    /// Current time as fractional seconds since epoch
    fn epoch_seconds(&self) -> f64;

    /// Current time formatted as an `HH:MM:SS` series label
    fn time_label(&self) -> String {
        label_for(self.epoch_seconds())
    }
}

/// Format an epoch-seconds value as an `HH:MM:SS` label in local time
pub fn label_for(epoch_seconds: f64) -> String {
    let millis = (epoch_seconds * 1000.0) as i64;
    match Utc.timestamp_millis_opt(millis) {
        chrono::LocalResult::Single(dt) => {
            let local: DateTime<Local> = dt.with_timezone(&Local);
            local.format("%H:%M:%S").to_string()
        }
        // Out-of-range input gets a visibly-wrong label instead of a panic
        _ => "--:--:--".to_owned(),
    }
}

/// System wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn epoch_seconds(&self) -> f64 {
        use std::time::{SystemTime, UNIX_EPOCH};

        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs_f64()
    }
}

/// Fixed clock for tests
#[derive(Debug, Clone, Copy)]
pub struct FixedClock {
    seconds: f64,
}

impl FixedClock {
    /// Create a clock pinned at the given epoch seconds
    pub fn new(seconds: f64) -> Self {
        Self { seconds }
    }

    /// Move the clock forward
    pub fn advance(&mut self, seconds: f64) {
        self.seconds += seconds;
    }
}

impl Clock for FixedClock {
    fn epoch_seconds(&self) -> f64 {
        self.seconds
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_clock_advances() {
        let mut clock = FixedClock::new(1_000.0);
        assert_eq!(clock.epoch_seconds(), 1_000.0);

        clock.advance(0.5);
        assert_eq!(clock.epoch_seconds(), 1_000.5);
    }

    #[test]
    fn label_has_clock_shape() {
        let label = FixedClock::new(1_700_000_000.0).time_label();
        assert_eq!(label.len(), 8);
        assert_eq!(label.matches(':').count(), 2);
    }

    #[test]
    fn out_of_range_label_does_not_panic() {
        assert_eq!(label_for(f64::MAX), "--:--:--");
    }
}
