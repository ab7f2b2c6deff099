//! Decoded telemetry model for one Pluggit reading cycle.

use serde::{Deserialize, Serialize};

/// One fully decoded reading cycle from one unit.
///
/// `timestamp` uses the compact `YYYYMMDDhhmmss` integer form (see
/// `crate::utils`); it is both the in-memory and the persisted representation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySample {
    /// Device identity, composed from the two 32-bit serial words.
    pub serial: i64,
    pub name: String,
    /// Firmware version as "major.minor".
    pub version: String,
    pub t1: f64,
    pub t2: f64,
    pub t3: f64,
    pub t4: f64,
    pub t5: f64,
    pub fan1: f64,
    pub fan2: f64,
    /// Relative humidity in percent.
    pub humidity: i64,
    pub bypass: i64,
    /// Label derived from `bypass`; "unknown" for unmapped codes.
    pub bypass_state: String,
    pub speed: i32,
    pub state: i32,
    /// Label derived from `state`; "unknown" for unmapped codes.
    pub state_text: String,
    pub alarm: i32,
    /// Label derived from `alarm`; "unknown" for unmapped codes.
    pub alarm_text: String,
    /// Remaining filter lifetime in days.
    pub filter_reset: i32,
    /// Total work time of the unit in hours.
    pub work_time: i64,
    pub timestamp: i64,
}
