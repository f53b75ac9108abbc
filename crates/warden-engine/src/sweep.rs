//! Expiration sweep: converts lapsed temporary punishments into
//! deactivated ones.
//!
//! A lapsed punishment already stops binding at read time (the wall-clock
//! filter in the punishment engine), but its row would stay active in
//! storage forever without this task. The sweep scans the full persisted
//! dataset, not just connected identities, so offline targets expire
//! too, and routes every deactivation through the punishment engine so
//! the read cache stays coherent.
//!
//! The periodic task runs on its own thread for the process lifetime;
//! stopping it through the [`SweepHandle`] is the only cancellation
//! point.

use std::sync::{Arc, mpsc};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use chrono::{DateTime, Utc};
use warden_storage::Store;

use crate::error::Result;
use crate::punishment::PunishmentEngine;

/// Default cadence between scans.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Outcome of one scan, for logs and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    /// Rows the scan found lapsed.
    pub examined: usize,
    /// Rows actually deactivated (another caller may have raced us).
    pub reversed: usize,
}

/// Periodic reconciliation task for expired temporary punishments.
pub struct ExpirySweeper {
    store: Arc<Store>,
    punishments: Arc<PunishmentEngine>,
}

impl ExpirySweeper {
    pub fn new(store: Arc<Store>, punishments: Arc<PunishmentEngine>) -> Self {
        Self { store, punishments }
    }

    /// One scan cycle: find lapsed rows, deactivate each through the
    /// punishment engine.
    pub fn sweep_once(&self, now: DateTime<Utc>) -> Result<SweepReport> {
        let expired = self.store.expired_punishments(now)?;
        let examined = expired.len();
        let mut reversed = 0;

        for punishment in &expired {
            if self.punishments.expire(punishment)? {
                reversed += 1;
            }
        }

        if reversed > 0 {
            tracing::info!(examined, reversed, "expired punishments deactivated");
        }
        Ok(SweepReport { examined, reversed })
    }

    /// Spawns the periodic task. The first scan runs immediately; later
    /// scans follow every `interval`. Dropping or stopping the returned
    /// handle ends the task and joins its thread.
    pub fn start(self, interval: Duration) -> Result<SweepHandle> {
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let thread = thread::Builder::new()
            .name("warden-sweep".to_string())
            .spawn(move || {
                loop {
                    if let Err(error) = self.sweep_once(Utc::now()) {
                        tracing::warn!(%error, "expiration sweep failed; retrying next cycle");
                    }
                    match stop_rx.recv_timeout(interval) {
                        Err(mpsc::RecvTimeoutError::Timeout) => {}
                        Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected) => break,
                    }
                }
            })
            .map_err(warden_storage::StorageError::from)?;

        Ok(SweepHandle {
            stop_tx: Some(stop_tx),
            thread: Some(thread),
        })
    }
}

/// Cancellable handle to the running sweep task.
pub struct SweepHandle {
    stop_tx: Option<mpsc::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl SweepHandle {
    /// Stops the task and joins its thread.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            // A send reaches a sleeping task immediately; a dropped
            // channel covers the case where the task is mid-scan.
            let _ = tx.send(());
        }
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for SweepHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}
