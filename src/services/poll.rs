//! Poll orchestration: read → detect → persist, plus the scheduling loop.
//!
//! One cycle is always fully sequential; the timer loop never starts a cycle
//! while the previous one is still running because the sleep only begins
//! after the cycle (including persistence) has finished.

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use diesel::PgConnection;
use diesel::prelude::*;
use log::{debug, error, info};

use crate::config::Config;
use crate::detector::ChangeDetector;
use crate::registers;
use crate::transport::{ModbusTransport, ProtocolError, RegisterTransport};
use crate::services::store;

/// Outcome of one completed poll cycle. A protocol failure is not an
/// outcome; it aborts the cycle as an error and stops the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Sample did not differ enough from the cached one; nothing written.
    Unchanged,
    /// Sample was modified and persisted.
    Stored,
    /// Sample was modified but no relational store is configured.
    PersistenceSkipped,
    /// Sample was modified but the persistence attempt failed; polling
    /// continues regardless.
    PersistenceFailed,
}

/// Execute one poll cycle against an already connected transport.
pub fn run_cycle(
    transport: &mut dyn RegisterTransport,
    detector: &mut ChangeDetector,
    database_url: Option<&str>,
) -> Result<CycleOutcome, ProtocolError> {
    let sample = registers::read_sample(transport)?;

    if !detector.is_modified(&sample) {
        return Ok(CycleOutcome::Unchanged);
    }

    let Some(url) = database_url else {
        debug!("no database configured, skipping persistence");
        return Ok(CycleOutcome::PersistenceSkipped);
    };

    // Session scoped to this attempt; dropped on every exit path.
    let mut conn = match PgConnection::establish(url) {
        Ok(conn) => conn,
        Err(e) => {
            error!("database connection failed: {}", e);
            return Ok(CycleOutcome::PersistenceFailed);
        }
    };
    match store::store_sample(&mut conn, &sample) {
        Ok(device_id) => {
            info!("stored sample for serial {} (device id {})", sample.serial, device_id);
            Ok(CycleOutcome::Stored)
        }
        Err(e) => {
            error!("unable to resolve device id for serial {}: {}", sample.serial, e);
            Ok(CycleOutcome::PersistenceFailed)
        }
    }
}

/// Drive poll cycles until a stop is requested or a protocol error occurs.
///
/// Intervals above the timer threshold repeat on a steady cadence (the
/// cycle's own duration is subtracted from the sleep); anything else runs a
/// single one-shot cycle.
pub fn run_loop(cfg: &Config, detector: &mut ChangeDetector, stop: &AtomicBool) -> Result<(), String> {
    loop {
        if stop.load(Ordering::SeqCst) {
            info!("stop requested, leaving poll loop");
            return Ok(());
        }

        let tick_start = Instant::now();
        let outcome = poll_once(cfg, detector).map_err(|e| format!("poll cycle failed: {}", e))?;
        debug!("cycle finished: {:?}", outcome);

        if cfg.one_shot() {
            return Ok(());
        }

        let elapsed = tick_start.elapsed();
        if elapsed < cfg.poll_interval {
            sleep_interruptible(cfg.poll_interval - elapsed, stop);
        }
    }
}

fn poll_once(cfg: &Config, detector: &mut ChangeDetector) -> Result<CycleOutcome, ProtocolError> {
    let mut transport = ModbusTransport::connect(&cfg.device_host, cfg.device_port, cfg.read_timeout)?;
    run_cycle(&mut transport, detector, cfg.database_url.as_deref())
}

/// Sleep in small chunks so a stop signal is observed within a bounded time.
fn sleep_interruptible(total: Duration, stop: &AtomicBool) {
    let deadline = Instant::now() + total;
    loop {
        if stop.load(Ordering::SeqCst) {
            return;
        }
        let now = Instant::now();
        if now >= deadline {
            return;
        }
        thread::sleep((deadline - now).min(Duration::from_millis(200)));
    }
}
