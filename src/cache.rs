//! File-backed store of the last accepted sample per unit.
//!
//! The cache is an explicit service object owned by the change detector. It
//! is loaded once at start, flushed on every mutation so restarts keep the
//! last-known sample, and hot-reloaded when the backing file was changed
//! externally (detected via mtime on access).

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use log::{debug, error};

use crate::models::sample::TelemetrySample;

pub struct SampleCache {
    path: PathBuf,
    entries: BTreeMap<i64, TelemetrySample>,
    last_modified: Option<SystemTime>,
}

impl SampleCache {
    /// Default location: `.pluggit` in the user's home directory.
    pub fn default_path() -> PathBuf {
        std::env::var_os("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".pluggit")
    }

    /// Open the cache at `path`. A missing or unreadable file yields an
    /// empty cache; it is recreated on the next flush.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let (entries, last_modified) = Self::load(&path);
        SampleCache {
            path,
            entries,
            last_modified,
        }
    }

    fn load(path: &Path) -> (BTreeMap<i64, TelemetrySample>, Option<SystemTime>) {
        let modified = fs::metadata(path).and_then(|m| m.modified()).ok();
        match fs::read_to_string(path) {
            Ok(data) => match serde_json::from_str(&data) {
                Ok(entries) => (entries, modified),
                Err(e) => {
                    error!("cache file {} is not valid JSON: {}", path.display(), e);
                    (BTreeMap::new(), modified)
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => (BTreeMap::new(), None),
            Err(e) => {
                error!("could not read cache file {}: {}", path.display(), e);
                (BTreeMap::new(), modified)
            }
        }
    }

    /// Pick up external changes to the backing file.
    fn reload_if_changed(&mut self) {
        let modified = fs::metadata(&self.path).and_then(|m| m.modified()).ok();
        if modified != self.last_modified {
            debug!("cache file {} changed, reloading", self.path.display());
            let (entries, last_modified) = Self::load(&self.path);
            self.entries = entries;
            self.last_modified = last_modified;
        }
    }

    /// Last accepted sample for a unit, if any.
    pub fn get(&mut self, serial: i64) -> Option<&TelemetrySample> {
        self.reload_if_changed();
        self.entries.get(&serial)
    }

    /// Replace a unit's entry wholesale and flush immediately.
    pub fn put(&mut self, sample: TelemetrySample) {
        self.entries.insert(sample.serial, sample);
        self.flush();
    }

    /// Write the cache out. Failures are logged, never fatal.
    fn flush(&mut self) {
        match serde_json::to_string(&self.entries) {
            Ok(data) => {
                if let Err(e) = fs::write(&self.path, data) {
                    error!("could not write cache file {}: {}", self.path.display(), e);
                }
                self.last_modified = fs::metadata(&self.path).and_then(|m| m.modified()).ok();
            }
            Err(e) => error!("could not serialize cache: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    fn sample(serial: i64, t1: f64) -> TelemetrySample {
        TelemetrySample {
            serial,
            t1,
            timestamp: 20260823120000,
            ..TelemetrySample::default()
        }
    }

    #[test]
    fn missing_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = SampleCache::open(dir.path().join("cache"));
        assert!(cache.get(1).is_none());
    }

    #[test]
    fn entries_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache");

        let mut cache = SampleCache::open(&path);
        cache.put(sample(811_216, 20.11));

        let mut reopened = SampleCache::open(&path);
        assert_eq!(reopened.get(811_216).unwrap().t1, 20.11);
    }

    #[test]
    fn put_replaces_whole_entry() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = SampleCache::open(dir.path().join("cache"));
        cache.put(sample(7, 20.0));
        cache.put(sample(7, 21.5));
        assert_eq!(cache.get(7).unwrap().t1, 21.5);
    }

    #[test]
    fn external_file_change_is_observed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache");

        let mut cache = SampleCache::open(&path);
        cache.put(sample(7, 20.0));

        // mtime granularity on some filesystems is coarse
        thread::sleep(Duration::from_millis(50));
        let mut other = SampleCache::open(&path);
        other.put(sample(7, 25.0));

        assert_eq!(cache.get(7).unwrap().t1, 25.0);
    }

    #[test]
    fn corrupt_file_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache");
        fs::write(&path, "not json").unwrap();

        let mut cache = SampleCache::open(&path);
        assert!(cache.get(1).is_none());
    }
}
