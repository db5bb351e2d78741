//! Resilient telemetry store.
//!
//! ```text
//!   write(reading)
//!       │
//!       ├─ primary reachable? ── insert ok ──▶ archive (best effort) ──▶ true
//!       │                            │
//!       │                         failed
//!       ▼                            ▼
//!   enqueue locally ──▶ archive (best effort) ──▶ true if enqueued
//!
//!   sync_offline(limit)
//!       pending (oldest first) ──▶ insert ──▶ remove … stop at first failure
//! ```
//!
//! Every reading reaches the permanent local copy whatever the primary
//! outcome.  A pending entry is removed only after the primary confirmed
//! the insert; a crash in between resends it on the next drain.
//!
//! The local queue has its own locking inside the [`LocalStore`]; nothing
//! here holds a lock across a primary round-trip except the drain guard,
//! which only keeps two drains from replaying the same batch.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, TryLockError};

use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use serde::Serialize;
use serde_json::Value;

use super::device_ids::DeviceIdResolver;
use super::reading::Reading;
use crate::app::ports::{LocalStore, TelemetrySink};
use crate::error::ValidationError;

/// Default drain batch size.
pub const DEFAULT_SYNC_LIMIT: usize = 100;

#[derive(Default)]
struct StoreCounters {
    primary_writes: AtomicU64,
    queued: AtomicU64,
    drained: AtomicU64,
    dropped: AtomicU64,
}

/// Counter snapshot plus local queue sizes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    /// Written straight to the primary.
    pub primary_writes: u64,
    /// Fell back to the local queue.
    pub queued: u64,
    /// Replayed from the queue into the primary.
    pub drained: u64,
    /// Neither primary nor queue accepted the reading.
    pub dropped: u64,
    pub pending: usize,
    pub archived: usize,
}

pub struct ResilientStore {
    primary: Arc<dyn TelemetrySink>,
    local: Arc<dyn LocalStore>,
    resolver: DeviceIdResolver,
    drain_guard: Mutex<()>,
    counters: StoreCounters,
}

impl ResilientStore {
    pub fn new(
        primary: Arc<dyn TelemetrySink>,
        local: Arc<dyn LocalStore>,
        resolver: DeviceIdResolver,
    ) -> Self {
        Self {
            primary,
            local,
            resolver,
            drain_guard: Mutex::new(()),
            counters: StoreCounters::default(),
        }
    }

    // ── Write path ────────────────────────────────────────────

    /// Persist one reading.  Never fails; returns whether the reading is
    /// now durable in the primary or the local queue.
    pub fn write(&self, reading: &Reading) -> bool {
        if self.primary.is_reachable() {
            match self.primary.insert(reading) {
                Ok(()) => {
                    self.counters.primary_writes.fetch_add(1, Ordering::Relaxed);
                    self.archive(reading);
                    debug!("Stored {}/{} in primary", reading.sensor_name, reading.identifier);
                    return true;
                }
                Err(e) => warn!("Primary insert failed ({e}), queueing locally"),
            }
        } else {
            debug!("Primary unreachable, queueing {}", reading.identifier);
        }

        let queued = match self.local.enqueue(reading) {
            Ok(position) => {
                self.counters.queued.fetch_add(1, Ordering::Relaxed);
                debug!("Queued {} at position {position}", reading.identifier);
                true
            }
            Err(e) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                error!("Could not queue reading from {}: {e}", reading.identifier);
                false
            }
        };
        self.archive(reading);
        queued
    }

    /// Validate an untyped document, then [`write`](Self::write) it.
    ///
    /// A document missing any required field is rejected before any write.
    pub fn write_document(&self, doc: &Value) -> Result<bool, ValidationError> {
        let reading = Reading::from_document(doc)?;
        Ok(self.write(&reading))
    }

    /// Build a reading for a sensor, resolving its device id, and write it.
    pub fn record(
        &self,
        sensor_name: &str,
        identifier: &str,
        value: f64,
        timestamp: DateTime<Utc>,
    ) -> bool {
        let device_id = self.resolver.resolve(identifier);
        self.write(&Reading::new(sensor_name, identifier, value, timestamp, device_id))
    }

    // ── Drain path ────────────────────────────────────────────

    /// Replay up to `limit` pending readings, oldest first.  Stops at the
    /// first primary failure.  Returns how many were confirmed.
    pub fn sync_offline(&self, limit: usize) -> usize {
        let _guard = match self.drain_guard.try_lock() {
            Ok(g) => g,
            Err(TryLockError::Poisoned(p)) => p.into_inner(),
            Err(TryLockError::WouldBlock) => {
                debug!("Drain already running, skipping");
                return 0;
            }
        };

        if !self.primary.is_reachable() {
            debug!("Primary unreachable, drain skipped");
            return 0;
        }

        let batch = match self.local.pending(limit) {
            Ok(batch) => batch,
            Err(e) => {
                warn!("Cannot read pending queue: {e}");
                return 0;
            }
        };
        if batch.is_empty() {
            return 0;
        }

        let total = batch.len();
        let mut synced = 0;
        for entry in batch {
            if let Err(e) = self.primary.insert(&entry.reading) {
                warn!("Drain stopped at position {}: {e}", entry.position);
                break;
            }
            if let Err(e) = self.local.remove(entry.position) {
                // Stays queued and is resent next time.
                warn!("Synced position {} but could not remove it: {e}", entry.position);
            }
            synced += 1;
        }

        self.counters.drained.fetch_add(synced as u64, Ordering::Relaxed);
        info!("Drained {synced}/{total} pending readings");
        synced
    }

    // ── Queries ───────────────────────────────────────────────

    pub fn pending_count(&self) -> usize {
        self.local.pending_count().unwrap_or_else(|e| {
            warn!("Cannot count pending readings: {e}");
            0
        })
    }

    pub fn stats(&self) -> StoreStats {
        StoreStats {
            primary_writes: self.counters.primary_writes.load(Ordering::Relaxed),
            queued: self.counters.queued.load(Ordering::Relaxed),
            drained: self.counters.drained.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
            pending: self.pending_count(),
            archived: self.local.archived_count().unwrap_or(0),
        }
    }

    pub fn resolver(&self) -> &DeviceIdResolver {
        &self.resolver
    }

    // ── Internal ──────────────────────────────────────────────

    fn archive(&self, reading: &Reading) {
        if let Err(e) = self.local.archive(reading) {
            warn!("Permanent copy failed for {}: {e}", reading.identifier);
        }
    }
}
