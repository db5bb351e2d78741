//! Telemetry pipeline: documents, device-id resolution, dual-sink store.

pub mod device_ids;
pub mod reading;
pub mod resilient;

pub use device_ids::{DeviceIdResolver, UNRESOLVED_DEVICE_ID};
pub use reading::{PendingReading, Reading};
pub use resilient::{DEFAULT_SYNC_LIMIT, ResilientStore, StoreStats};
