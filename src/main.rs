pub mod models {
    pub mod sample;
}

pub mod cache;
pub mod config;
pub mod db {
    pub mod models;
}
pub mod detector;
pub mod registers;
pub mod schema;
pub mod transport;
pub mod utils;
pub mod services {
    pub mod poll;
    pub mod store;
}

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use diesel::PgConnection;
use diesel::prelude::*;
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};
use log::{error, info};

use crate::cache::SampleCache;
use crate::config::Config;
use crate::detector::ChangeDetector;
use crate::services::poll;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

/// Grace period before process exit so in-flight log output can flush.
const EXIT_GRACE: Duration = Duration::from_millis(250);

fn apply_database_migrations(conn: &mut PgConnection) -> Result<(), String> {
    match conn.run_pending_migrations(MIGRATIONS) {
        Ok(applied) => {
            if applied.is_empty() {
                info!("Database schema is up to date; no migrations were applied");
            } else {
                let names = applied.iter().map(|v| v.to_string()).collect::<Vec<_>>().join(", ");
                info!("Applied {} database migration(s): {}", applied.len(), names);
            }
            Ok(())
        }
        Err(e) => Err(format!("Applying database migrations failed: {}", e)),
    }
}

pub fn run(stop: Arc<AtomicBool>) -> Result<(), String> {
    // 1) Load config
    let cfg = Config::from_env()?;
    info!(
        "Config loaded (host={}:{}, poll_interval={}ms, read_timeout={}s, persistence={}, cache={})",
        cfg.device_host,
        cfg.device_port,
        cfg.poll_interval.as_millis(),
        cfg.read_timeout.as_secs(),
        if cfg.database_url.is_some() { "enabled" } else { "disabled" },
        cfg.cache_path.display(),
    );

    // 2) Apply pending database migrations (only when persistence is on)
    if let Some(url) = cfg.database_url.as_deref() {
        let mut conn =
            PgConnection::establish(url).map_err(|e| format!("DB connection failed: {}", e))?;
        info!("Connected to database");
        apply_database_migrations(&mut conn)?;
    } else {
        info!("No DATABASE_URL configured; samples will not be persisted");
    }

    // 3) Last-sample cache and change detector
    let mut detector = ChangeDetector::new(SampleCache::open(&cfg.cache_path));

    // 4) Poll until stopped
    if cfg.one_shot() {
        info!("Starting one-shot poll");
    } else {
        info!("Starting poll loop: interval={}ms", cfg.poll_interval.as_millis());
    }
    poll::run_loop(&cfg, &mut detector, &stop)
}

fn main() {
    // Load .env before logging so RUST_LOG and DEBUG from it are respected.
    let loaded_env = dotenvy::dotenv().ok();

    // DEBUG=1 mirrors the adapter's debug flag: raise the default filter.
    let debug = std::env::var("DEBUG")
        .map(|s| matches!(s.as_str(), "1" | "true" | "TRUE"))
        .unwrap_or(false);
    let default_filter =
        env_logger::Env::default().default_filter_or(if debug { "debug" } else { "info" });
    env_logger::Builder::from_env(default_filter)
        .format_timestamp_secs()
        .init();

    if let Some(path) = loaded_env.as_ref() {
        info!("Environment loaded from .env file: {}", path.display());
    }

    info!(
        "pluggit-postgres {} (git {}) starting",
        env!("CARGO_PKG_VERSION"),
        env!("BUILD_TIME_GIT_HASH")
    );

    let stop = Arc::new(AtomicBool::new(false));
    let handler_flag = Arc::clone(&stop);
    if let Err(e) = ctrlc::set_handler(move || {
        handler_flag.store(true, Ordering::SeqCst);
    }) {
        error!("fatal: could not install signal handler: {}", e);
        std::process::exit(1);
    }

    if let Err(e) = run(stop) {
        error!("fatal: {}", e);
        thread::sleep(EXIT_GRACE);
        std::process::exit(1);
    }
    info!("terminating");
    thread::sleep(EXIT_GRACE);
}
