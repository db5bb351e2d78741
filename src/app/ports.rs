//! Port traits: the hexagonal boundary between domain logic and the outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ LitterboxController / ResilientStore (domain)
//! ```
//!
//! Driven adapters (serial channel, remote sink, local queue, config
//! source, event sinks, clocks) implement these traits.  The domain core
//! holds them as `Arc<dyn …>` so the background workers and operator
//! calls can share one instance, and tests can swap in mocks.
//!
//! All port methods take `&self`: implementations own their locking.

use std::time::Duration;

use chrono::{DateTime, Utc};

use super::events::AppEvent;
use crate::error::{ChannelError, SinkError, StorageError};
use crate::protocol::{Command, Response};
use crate::telemetry::reading::{PendingReading, Reading};

// ───────────────────────────────────────────────────────────────
// Command port (domain → microcontroller)
// ───────────────────────────────────────────────────────────────

/// Request/response access to one microcontroller.
///
/// Implementations must serialise callers: no two exchanges interleave.
pub trait CommandPort: Send + Sync {
    fn send_and_wait(&self, command: &Command, timeout: Duration) -> Result<Response, ChannelError>;

    fn send_fire_and_forget(&self, command: &Command) -> Result<(), ChannelError>;
}

// ───────────────────────────────────────────────────────────────
// Telemetry sink (domain → remote store)
// ───────────────────────────────────────────────────────────────

/// The primary remote telemetry store.
///
/// Consumers of the remote store must tolerate duplicate documents: a
/// drain interrupted between insert and local delete resends.
pub trait TelemetrySink: Send + Sync {
    fn insert(&self, reading: &Reading) -> Result<(), SinkError>;

    /// Cheap reachability probe.
    fn is_reachable(&self) -> bool;
}

// ───────────────────────────────────────────────────────────────
// Local store (domain ↔ disk)
// ───────────────────────────────────────────────────────────────

/// Durable local storage: a pending queue plus a permanent copy.
///
/// # Durability
///
/// - `enqueue` MUST NOT return `Ok` before the entry survives a crash.
/// - `remove` MUST be idempotent; removing an absent position is `Ok`.
/// - Positions increase monotonically for the lifetime of the store.
pub trait LocalStore: Send + Sync {
    /// Append to the pending queue.  Returns the queue position.
    fn enqueue(&self, reading: &Reading) -> Result<u64, StorageError>;

    /// Oldest-first (by timestamp, then position), at most `limit`.
    fn pending(&self, limit: usize) -> Result<Vec<PendingReading>, StorageError>;

    fn remove(&self, position: u64) -> Result<(), StorageError>;

    fn pending_count(&self) -> Result<usize, StorageError>;

    /// Append to the permanent copy (audit trail).
    fn archive(&self, reading: &Reading) -> Result<(), StorageError>;

    fn archived_count(&self) -> Result<usize, StorageError>;
}

// ───────────────────────────────────────────────────────────────
// Configuration source (domain ← configuration database)
// ───────────────────────────────────────────────────────────────

/// Per-appliance settings row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplianceSettings {
    pub cleaning_interval_hours: u8,
    pub enabled: bool,
}

/// Read-only lookups against the configuration database.
///
/// Treated as slow and fallible; callers cache.  `None` means "not found
/// or not reachable right now".
pub trait ConfigSource: Send + Sync {
    /// Device identifier of an appliance, by appliance code.
    fn device_identifier(&self, appliance_code: &str) -> Option<String>;

    /// Numeric device id of a sensor, by sensor identifier.
    fn device_id_for_sensor(&self, sensor_identifier: &str) -> Option<i64>;

    /// Per-appliance settings, by the identifier from
    /// [`device_identifier`](Self::device_identifier).
    fn appliance_settings(&self, device_identifier: &str) -> Option<ApplianceSettings>;
}

// ───────────────────────────────────────────────────────────────
// Event sink port (domain → logging / telemetry)
// ───────────────────────────────────────────────────────────────

/// The domain emits structured [`AppEvent`]s through this port.  Adapters
/// decide where they go (log, MQTT bridge, test recorder).
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &AppEvent);
}

// ───────────────────────────────────────────────────────────────
// Clock
// ───────────────────────────────────────────────────────────────

/// Wall-clock source, injectable so auto-clean timing is testable.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}
