//! Minimal runtime configuration helpers.
//! Everything comes from the environment (optionally via a `.env` file).

use std::path::PathBuf;
use std::time::Duration;

use crate::cache::SampleCache;

pub const DEFAULT_HOST: &str = "192.168.178.50";
pub const DEFAULT_PORT: u16 = 502;
pub const DEFAULT_READ_TIMEOUT_SECS: u64 = 10;
/// Poll intervals at or below this run as a single one-shot cycle instead of
/// a repeating timer.
pub const MIN_TIMER_INTERVAL_MS: u64 = 1000;

#[derive(Debug, Clone)]
pub struct Config {
    /// Pluggit unit address (Modbus TCP, default port 502).
    pub device_host: String,
    pub device_port: u16,
    /// Polling cadence; 0 (or anything at or below the timer threshold)
    /// means one-shot.
    pub poll_interval: Duration,
    /// Bound on each register read.
    pub read_timeout: Duration,
    /// Absent means persistence is disabled; polling still runs.
    pub database_url: Option<String>,
    /// Location of the last-sample cache file.
    pub cache_path: PathBuf,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        let device_host = std::env::var("PLUGGIT_HOST").unwrap_or_else(|_| DEFAULT_HOST.to_string());

        let device_port = std::env::var("PLUGGIT_PORT")
            .ok()
            .and_then(|s| s.parse::<u16>().ok())
            .unwrap_or(DEFAULT_PORT);

        let interval_ms = std::env::var("POLL_INTERVAL_MS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(0);

        let timeout_secs = std::env::var("READ_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_READ_TIMEOUT_SECS);

        let database_url = match std::env::var("DATABASE_URL") {
            Ok(s) if !s.trim().is_empty() => Some(s),
            _ => None,
        };

        let cache_path = std::env::var("CACHE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| SampleCache::default_path());

        Ok(Config {
            device_host,
            device_port,
            poll_interval: Duration::from_millis(interval_ms),
            read_timeout: Duration::from_secs(timeout_secs),
            database_url,
            cache_path,
        })
    }

    /// One-shot unless the interval exceeds the timer threshold.
    pub fn one_shot(&self) -> bool {
        self.poll_interval.as_millis() <= u128::from(MIN_TIMER_INTERVAL_MS)
    }
}
