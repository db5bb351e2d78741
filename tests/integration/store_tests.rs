//! Integration tests for ResilientStore → RecordingSink / local stores.

use std::sync::Arc;
use std::sync::atomic::Ordering;

use cathub::adapters::file_store::FileStore;
use cathub::adapters::memory::MemoryStore;
use cathub::app::ports::{ConfigSource, LocalStore, TelemetrySink};
use cathub::error::{StorageError, ValidationError};
use cathub::telemetry::{
    DeviceIdResolver, PendingReading, Reading, ResilientStore, UNRESOLVED_DEVICE_ID,
};
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::json;

use crate::mock_hw::{MapConfig, RecordingSink};

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap()
}

fn reading(id: &str, offset_secs: i64) -> Reading {
    Reading::new("feeder_weight", id, 100.0, t0() + Duration::seconds(offset_secs), 3)
}

fn store_over(
    remote: &Arc<RecordingSink>,
    local: Arc<dyn LocalStore>,
    config: Arc<dyn ConfigSource>,
) -> ResilientStore {
    ResilientStore::new(
        Arc::clone(remote) as Arc<dyn TelemetrySink>,
        local,
        DeviceIdResolver::new(config),
    )
}

fn memory_rig(remote: &Arc<RecordingSink>) -> (ResilientStore, Arc<MemoryStore>) {
    let local = Arc::new(MemoryStore::new());
    let store = store_over(remote, local.clone(), Arc::new(MapConfig::default()));
    (store, local)
}

// ── Write path ────────────────────────────────────────────────

#[test]
fn outage_reading_is_queued_and_archived() {
    let remote = RecordingSink::offline();
    let mut cfg = MapConfig::default();
    cfg.device_ids.insert("WSR001".into(), 4);
    let local = Arc::new(MemoryStore::new());
    let store = store_over(&remote, local.clone(), Arc::new(cfg));

    assert!(store.record("feeder_weight", "WSR001", 150.5, t0()));

    assert!(remote.identifiers().is_empty());
    assert_eq!(store.pending_count(), 1);
    let archived = local.archived();
    assert_eq!(archived.len(), 1);
    assert_eq!(archived[0].value, 150.5);
    assert_eq!(archived[0].device_id, 4);

    let stats = store.stats();
    assert_eq!(stats.queued, 1);
    assert_eq!(stats.primary_writes, 0);
    assert_eq!(stats.archived, 1);
}

#[test]
fn online_reading_goes_to_primary_and_archive() {
    let remote = RecordingSink::online();
    let (store, local) = memory_rig(&remote);

    assert!(store.write(&reading("WSR001", 0)));
    assert_eq!(remote.identifiers(), vec!["WSR001"]);
    assert_eq!(store.pending_count(), 0);
    assert_eq!(local.archived().len(), 1);
}

#[test]
fn primary_error_falls_back_to_queue() {
    let remote = RecordingSink::online();
    remote.fail_attempt(1);
    let (store, _local) = memory_rig(&remote);

    assert!(store.write(&reading("WSR001", 0)));
    assert!(remote.identifiers().is_empty());
    assert_eq!(store.pending_count(), 1);
}

#[test]
fn nothing_accepts_the_reading() {
    let remote = RecordingSink::offline();
    let (store, local) = memory_rig(&remote);
    local.set_fail_writes(true);

    assert!(!store.write(&reading("WSR001", 0)));
    assert_eq!(store.stats().dropped, 1);
}

#[test]
fn every_reading_lands_somewhere() {
    let remote = RecordingSink::online();
    let (store, local) = memory_rig(&remote);

    for i in 0..20 {
        remote.set_up(i % 3 != 0);
        assert!(store.write(&reading(&format!("S{i}"), i)));
    }
    let in_remote = remote.identifiers().len();
    assert_eq!(in_remote + store.pending_count(), 20);
    assert_eq!(local.archived().len(), 20);
}

// ── Document validation ───────────────────────────────────────

#[test]
fn incomplete_document_is_rejected_before_any_write() {
    let remote = RecordingSink::online();
    let (store, local) = memory_rig(&remote);

    let doc = json!({
        "sensor_name": "feeder_weight",
        "identifier": "WSR001",
        "timestamp": "2024-03-01T08:00:00Z",
        "device_id": 3,
    });
    assert_eq!(store.write_document(&doc), Err(ValidationError::MissingField("value")));
    assert!(remote.identifiers().is_empty());
    assert!(local.archived().is_empty());
    assert_eq!(store.pending_count(), 0);
}

#[test]
fn valid_document_is_written() {
    let remote = RecordingSink::online();
    let (store, _local) = memory_rig(&remote);
    let doc = json!({
        "sensor_name": "water_level",
        "identifier": "WLS001",
        "value": 62.5,
        "timestamp": "2024-03-01T08:00:00Z",
        "device_id": 9,
    });
    assert_eq!(store.write_document(&doc), Ok(true));
    assert_eq!(remote.docs.lock().unwrap()[0].device_id, 9);
}

// ── Drain path ────────────────────────────────────────────────

#[test]
fn drain_replays_in_timestamp_order() {
    let remote = RecordingSink::offline();
    let (store, _local) = memory_rig(&remote);

    // Enqueue out of timestamp order.
    store.write(&reading("B", 1));
    store.write(&reading("C", 2));
    store.write(&reading("A", 0));
    assert_eq!(store.sync_offline(100), 0);

    remote.set_up(true);
    assert_eq!(store.sync_offline(100), 3);
    assert_eq!(remote.identifiers(), vec!["A", "B", "C"]);
    assert_eq!(store.pending_count(), 0);
    assert_eq!(store.stats().drained, 3);
}

#[test]
fn drain_stops_at_first_failure() {
    let remote = RecordingSink::offline();
    let (store, _local) = memory_rig(&remote);
    for i in 0..5 {
        store.write(&reading(&format!("R{i}"), i));
    }

    remote.set_up(true);
    remote.fail_attempt(3);
    assert_eq!(store.sync_offline(100), 2);
    assert_eq!(remote.identifiers(), vec!["R0", "R1"]);
    assert_eq!(store.pending_count(), 3);

    assert_eq!(store.sync_offline(100), 3);
    assert_eq!(remote.identifiers(), vec!["R0", "R1", "R2", "R3", "R4"]);
    assert_eq!(store.pending_count(), 0);
}

#[test]
fn drain_respects_the_batch_limit() {
    let remote = RecordingSink::offline();
    let (store, _local) = memory_rig(&remote);
    for i in 0..7 {
        store.write(&reading(&format!("R{i}"), i));
    }
    remote.set_up(true);
    assert_eq!(store.sync_offline(3), 3);
    assert_eq!(store.pending_count(), 4);
    assert_eq!(store.sync_offline(3), 3);
    assert_eq!(store.sync_offline(3), 1);
    assert_eq!(store.sync_offline(3), 0);
}

/// Local store whose removals fail until told otherwise.
struct StickyStore {
    inner: MemoryStore,
    remove_fails: std::sync::atomic::AtomicBool,
}

impl LocalStore for StickyStore {
    fn enqueue(&self, reading: &Reading) -> Result<u64, StorageError> {
        self.inner.enqueue(reading)
    }
    fn pending(&self, limit: usize) -> Result<Vec<PendingReading>, StorageError> {
        self.inner.pending(limit)
    }
    fn remove(&self, position: u64) -> Result<(), StorageError> {
        if self.remove_fails.load(Ordering::SeqCst) {
            return Err(StorageError::Io(std::io::Error::other("read-only filesystem")));
        }
        self.inner.remove(position)
    }
    fn pending_count(&self) -> Result<usize, StorageError> {
        self.inner.pending_count()
    }
    fn archive(&self, reading: &Reading) -> Result<(), StorageError> {
        self.inner.archive(reading)
    }
    fn archived_count(&self) -> Result<usize, StorageError> {
        self.inner.archived_count()
    }
}

#[test]
fn unremoved_entry_is_redelivered() {
    let remote = RecordingSink::offline();
    let local = Arc::new(StickyStore {
        inner: MemoryStore::new(),
        remove_fails: std::sync::atomic::AtomicBool::new(true),
    });
    let store = store_over(&remote, local.clone(), Arc::new(MapConfig::default()));
    store.write(&reading("DUP", 0));

    remote.set_up(true);
    assert_eq!(store.sync_offline(10), 1);
    assert_eq!(store.pending_count(), 1);

    local.remove_fails.store(false, Ordering::SeqCst);
    assert_eq!(store.sync_offline(10), 1);
    assert_eq!(store.pending_count(), 0);
    // At-least-once: the primary saw it twice.
    assert_eq!(remote.identifiers(), vec!["DUP", "DUP"]);
}

// ── File-backed queue ─────────────────────────────────────────

#[test]
fn file_queue_survives_a_restart() {
    let dir = tempfile::tempdir().unwrap();
    let remote = RecordingSink::offline();
    {
        let local = Arc::new(FileStore::open(dir.path()).unwrap());
        let store = store_over(&remote, local, Arc::new(MapConfig::default()));
        store.write(&reading("F2", 2));
        store.write(&reading("F0", 0));
        store.write(&reading("F1", 1));
        assert_eq!(store.pending_count(), 3);
    }

    remote.set_up(true);
    let local = Arc::new(FileStore::open(dir.path()).unwrap());
    let store = store_over(&remote, local, Arc::new(MapConfig::default()));
    assert_eq!(store.pending_count(), 3);
    assert_eq!(store.sync_offline(100), 3);
    assert_eq!(remote.identifiers(), vec!["F0", "F1", "F2"]);
    assert_eq!(store.pending_count(), 0);
    assert_eq!(store.stats().archived, 3);
}

// ── Device-id resolution ──────────────────────────────────────

#[test]
fn known_identifier_is_looked_up_once() {
    let remote = RecordingSink::online();
    let mut cfg = MapConfig::default();
    cfg.device_ids.insert("WSR001".into(), 12);
    let cfg = Arc::new(cfg);
    let store = store_over(&remote, Arc::new(MemoryStore::new()), cfg.clone());

    for _ in 0..3 {
        store.record("feeder_weight", "WSR001", 80.0, t0());
    }
    assert_eq!(cfg.lookups.load(Ordering::SeqCst), 1);
    assert_eq!(store.resolver().cached("WSR001"), Some(12));
    assert!(remote.docs.lock().unwrap().iter().all(|r| r.device_id == 12));
}

#[test]
fn unknown_identifier_uses_sentinel_and_retries() {
    let remote = RecordingSink::online();
    let cfg = Arc::new(MapConfig::default());
    let store = store_over(&remote, Arc::new(MemoryStore::new()), cfg.clone());

    store.record("water_level", "NEW001", 10.0, t0());
    store.record("water_level", "NEW001", 11.0, t0());
    assert_eq!(cfg.lookups.load(Ordering::SeqCst), 2);
    assert_eq!(store.resolver().cached("NEW001"), None);
    assert_eq!(remote.docs.lock().unwrap()[0].device_id, UNRESOLVED_DEVICE_ID);
}
