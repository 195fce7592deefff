use std::fmt;
use std::time::Duration;

use serde::Serialize;

const MICROS_PER_SEC: i64 = 1_000_000;

/// A (seconds, microseconds) instant or interval, as reported by the OS.
///
/// Field order matters: the derived ordering compares seconds first and
/// microseconds second. Constructors keep `micros` within `0..1_000_000`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct TimeVal {
    secs: i64,
    micros: i64,
}

impl TimeVal {
    pub const ZERO: TimeVal = TimeVal { secs: 0, micros: 0 };

    /// Builds a normalized value; surplus or negative microseconds are
    /// carried into the seconds field, which saturates at the `i64` bounds.
    pub fn new(secs: i64, micros: i64) -> Self {
        Self {
            secs: secs.saturating_add(micros.div_euclid(MICROS_PER_SEC)),
            micros: micros.rem_euclid(MICROS_PER_SEC),
        }
    }

    pub fn from_duration(d: Duration) -> Self {
        // Saturate rather than wrap for durations past i64 seconds.
        let secs = i64::try_from(d.as_secs()).unwrap_or(i64::MAX);
        Self::new(secs, i64::from(d.subsec_micros()))
    }

    pub fn secs(&self) -> i64 {
        self.secs
    }

    pub fn micros(&self) -> i64 {
        self.micros
    }
}

impl fmt::Display for TimeVal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:06}sec.", self.secs, self.micros)
    }
}

/// Accumulated resource usage of one scope (the process or its children).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Usage {
    pub user_time: TimeVal,
    pub system_time: TimeVal,
    pub in_blocks: i64,
    pub out_blocks: i64,
}

/// Everything captured at one lifecycle event.
///
/// Immutable once built; a begin snapshot is attached to the chain root and
/// compared against a fresh end snapshot at stop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Snapshot {
    pub wall_clock: TimeVal,
    pub own: Usage,
    pub children: Usage,
}
