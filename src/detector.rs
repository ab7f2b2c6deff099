//! Change detection between a fresh sample and the cached last one.
//!
//! Continuous analog fields get tolerance bands (sensor noise), fan rpm gets
//! a coarse band, and categorical fields compare exactly since any change is
//! semantically significant. A time bound forces a periodic refresh even when
//! all values are similar.

use log::{debug, info};

use crate::cache::SampleCache;
use crate::models::sample::TelemetrySample;
use crate::utils;

/// Maximum age of a cache entry before a refresh is forced.
pub const REFRESH_SECONDS: i64 = 300;
/// Temperature deltas up to and including this value are noise.
pub const TEMP_TOLERANCE: f64 = 0.1;
/// Fan rpm deltas up to and including this value are noise.
pub const FAN_TOLERANCE: f64 = 100.0;

pub struct ChangeDetector {
    cache: SampleCache,
}

impl ChangeDetector {
    pub fn new(cache: SampleCache) -> Self {
        ChangeDetector { cache }
    }

    /// Decide whether `sample` differs enough from the cached entry to be
    /// persisted. On true the entry is replaced with `sample`; on false the
    /// cache is left untouched.
    pub fn is_modified(&mut self, sample: &TelemetrySample) -> bool {
        let modified = match self.cache.get(sample.serial) {
            None => {
                debug!("no last value for {}", sample.serial);
                true
            }
            Some(last) => {
                let m = differs(sample, last);
                if !m {
                    info!(
                        "state not modified since last check {}",
                        utils::from_compact(last.timestamp)
                            .map(|dt| dt.to_string())
                            .unwrap_or_else(|| last.timestamp.to_string())
                    );
                }
                m
            }
        };

        if modified {
            self.cache.put(sample.clone());
        }
        modified
    }
}

fn differs(new: &TelemetrySample, last: &TelemetrySample) -> bool {
    // Forced refresh bounds staleness regardless of value similarity. An
    // unparseable timestamp on either side also forces one.
    match (utils::compact_seconds(new.timestamp), utils::compact_seconds(last.timestamp)) {
        (Some(a), Some(b)) => {
            if (a - b).abs() > REFRESH_SECONDS {
                info!("timeout, renew entry after {} seconds", REFRESH_SECONDS);
                return true;
            }
        }
        _ => return true,
    }

    let temps = [
        ("t1", new.t1, last.t1),
        ("t2", new.t2, last.t2),
        ("t3", new.t3, last.t3),
        ("t4", new.t4, last.t4),
        ("t5", new.t5, last.t5),
    ];
    for (name, a, b) in temps {
        if (a - b).abs() > TEMP_TOLERANCE {
            info!("{}: delta({}, {}) > {}", name, a, b, TEMP_TOLERANCE);
            return true;
        }
    }

    let fans = [("fan1", new.fan1, last.fan1), ("fan2", new.fan2, last.fan2)];
    for (name, a, b) in fans {
        if (a - b).abs() > FAN_TOLERANCE {
            info!("{}: delta({}, {}) > {}", name, a, b, FAN_TOLERANCE);
            return true;
        }
    }

    let exact = [
        ("humidity", new.humidity, last.humidity),
        ("bypass", new.bypass, last.bypass),
        ("speed", i64::from(new.speed), i64::from(last.speed)),
        ("state", i64::from(new.state), i64::from(last.state)),
        ("alarm", i64::from(new.alarm), i64::from(last.alarm)),
    ];
    for (name, a, b) in exact {
        if a != b {
            info!("{}: {} != {}", name, a, b);
            return true;
        }
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_sample() -> TelemetrySample {
        TelemetrySample {
            serial: 811_216,
            name: "Pluggit AP310".into(),
            version: "2.74".into(),
            t1: 20.05,
            t2: 20.2,
            t3: 20.05,
            t4: 19.98,
            t5: 20.0,
            fan1: 1000.0,
            fan2: 1200.0,
            humidity: 45,
            bypass: 0,
            bypass_state: "closed".into(),
            speed: 2,
            state: 3,
            state_text: "Week program".into(),
            alarm: 0,
            alarm_text: "None".into(),
            filter_reset: 121,
            work_time: 30123,
            timestamp: 20260823120000,
        }
    }

    fn detector() -> (ChangeDetector, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let cache = SampleCache::open(dir.path().join("cache"));
        (ChangeDetector::new(cache), dir)
    }

    #[test]
    fn first_observation_is_modified() {
        let (mut det, _dir) = detector();
        assert!(det.is_modified(&base_sample()));
    }

    #[test]
    fn identical_sample_is_not_modified() {
        let (mut det, _dir) = detector();
        assert!(det.is_modified(&base_sample()));
        assert!(!det.is_modified(&base_sample()));
    }

    #[test]
    fn refresh_is_forced_after_300_seconds() {
        let (mut det, _dir) = detector();
        assert!(det.is_modified(&base_sample()));

        let mut aged = base_sample();
        aged.timestamp = 20260823120500; // +300 s: within bound
        assert!(!det.is_modified(&aged));

        aged.timestamp = 20260823120501; // +301 s: forced refresh
        assert!(det.is_modified(&aged));
    }

    #[test]
    fn temperature_tolerance_boundary() {
        let (mut det, _dir) = detector();
        assert!(det.is_modified(&base_sample()));

        let mut s = base_sample();
        s.t1 = 20.15; // delta of 0.1 is within tolerance
        assert!(!det.is_modified(&s));

        s.t1 = 20.1500001;
        assert!(det.is_modified(&s));
    }

    #[test]
    fn fan_tolerance_boundary() {
        let (mut det, _dir) = detector();
        assert!(det.is_modified(&base_sample()));

        let mut s = base_sample();
        s.fan1 = 1100.0; // delta of 100 is within tolerance
        assert!(!det.is_modified(&s));

        s.fan1 = 1100.01;
        assert!(det.is_modified(&s));
    }

    #[test]
    fn categorical_fields_compare_exactly() {
        let (mut det, _dir) = detector();
        assert!(det.is_modified(&base_sample()));

        let mut s = base_sample();
        s.humidity = 46;
        assert!(det.is_modified(&s));

        let mut s = base_sample();
        s.humidity = 46; // now cached
        s.alarm = 12;
        s.alarm_text = "Fire Alarm".into();
        assert!(det.is_modified(&s));
    }

    #[test]
    fn unmodified_sample_leaves_cache_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SampleCache::open(dir.path().join("cache"));
        let mut det = ChangeDetector::new(cache);

        assert!(det.is_modified(&base_sample()));

        let mut below = base_sample();
        below.t1 = 20.1; // below tolerance
        below.timestamp = 20260823120010;
        assert!(!det.is_modified(&below));

        // the cached entry still carries the original timestamp
        let mut cache = SampleCache::open(dir.path().join("cache"));
        assert_eq!(cache.get(811_216).unwrap().timestamp, 20260823120000);
    }

    #[test]
    fn cache_survives_detector_restart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache");

        let mut det = ChangeDetector::new(SampleCache::open(&path));
        assert!(det.is_modified(&base_sample()));

        let mut restarted = ChangeDetector::new(SampleCache::open(&path));
        assert!(!restarted.is_modified(&base_sample()));
    }
}
