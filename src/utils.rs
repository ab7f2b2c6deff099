//! Compact timestamp codec.
//!
//! Samples and persisted rows carry wall time as a single 14-digit integer of
//! the form `YYYYMMDDhhmmss`. The digit grouping is a compatibility contract
//! with previously stored rows and must not change.

use chrono::{Datelike, Local, NaiveDate, NaiveDateTime, Timelike};

/// Current local wall time in compact form.
pub fn timestamp_now() -> i64 {
    to_compact(Local::now().naive_local())
}

/// Format a calendar time as a compact `YYYYMMDDhhmmss` integer.
pub fn to_compact(dt: NaiveDateTime) -> i64 {
    dt.year() as i64 * 10_000_000_000
        + dt.month() as i64 * 100_000_000
        + dt.day() as i64 * 1_000_000
        + dt.hour() as i64 * 10_000
        + dt.minute() as i64 * 100
        + dt.second() as i64
}

/// Parse a compact timestamp back into calendar fields by extracting two
/// decimal places at a time: seconds, minutes, hours, day, month, then year.
///
/// Returns `None` for values that do not form a valid date or time.
pub fn from_compact(t: i64) -> Option<NaiveDateTime> {
    let mut t = t;
    let seconds = (t % 100) as u32;
    t /= 100;
    let minutes = (t % 100) as u32;
    t /= 100;
    let hours = (t % 100) as u32;
    t /= 100;
    let day = (t % 100) as u32;
    t /= 100;
    let month = (t % 100) as u32;
    t /= 100;
    let year = i32::try_from(t).ok()?;

    NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(hours, minutes, seconds)
}

/// Epoch seconds for a compact timestamp, for delta arithmetic between two
/// samples. `None` if the value does not parse.
pub fn compact_seconds(t: i64) -> Option<i64> {
    Some(from_compact(t)?.and_utc().timestamp())
}
