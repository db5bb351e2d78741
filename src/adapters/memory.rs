//! In-memory [`LocalStore`].
//!
//! Simulation backend for tests and dry runs: same ordering and
//! idempotency contract as the file store, none of the durability.

use std::collections::BTreeMap;
use std::io;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::app::ports::LocalStore;
use crate::error::StorageError;
use crate::telemetry::reading::{PendingReading, Reading};

#[derive(Default)]
struct Inner {
    next_position: u64,
    pending: BTreeMap<u64, Reading>,
    archive: Vec<Reading>,
    fail_writes: bool,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent enqueue/archive fail (disk full simulation).
    pub fn set_fail_writes(&self, fail: bool) {
        self.lock().fail_writes = fail;
    }

    /// Copy of the permanent archive, in write order.
    pub fn archived(&self) -> Vec<Reading> {
        self.lock().archive.clone()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn simulated_failure() -> StorageError {
    StorageError::Io(io::Error::new(io::ErrorKind::StorageFull, "simulated write failure"))
}

impl LocalStore for MemoryStore {
    fn enqueue(&self, reading: &Reading) -> Result<u64, StorageError> {
        let mut inner = self.lock();
        if inner.fail_writes {
            return Err(simulated_failure());
        }
        inner.next_position += 1;
        let position = inner.next_position;
        inner.pending.insert(position, reading.clone());
        Ok(position)
    }

    fn pending(&self, limit: usize) -> Result<Vec<PendingReading>, StorageError> {
        let inner = self.lock();
        let mut entries: Vec<PendingReading> = inner
            .pending
            .iter()
            .map(|(&position, reading)| PendingReading {
                position,
                reading: reading.clone(),
            })
            .collect();
        entries.sort_by_key(|e| (e.reading.timestamp, e.position));
        entries.truncate(limit);
        Ok(entries)
    }

    fn remove(&self, position: u64) -> Result<(), StorageError> {
        self.lock().pending.remove(&position);
        Ok(())
    }

    fn pending_count(&self) -> Result<usize, StorageError> {
        Ok(self.lock().pending.len())
    }

    fn archive(&self, reading: &Reading) -> Result<(), StorageError> {
        let mut inner = self.lock();
        if inner.fail_writes {
            return Err(simulated_failure());
        }
        inner.archive.push(reading.clone());
        Ok(())
    }

    fn archived_count(&self) -> Result<usize, StorageError> {
        Ok(self.lock().archive.len())
    }
}
