//! Read-through cache of sensor identifier → numeric device id.
//!
//! A hit never re-queries.  A miss queries the configuration source once
//! and caches any non-null answer; a null answer is not cached so the next
//! reading retries.  Unresolved identifiers resolve to
//! [`UNRESOLVED_DEVICE_ID`] rather than dropping the reading.

use std::sync::{Arc, Mutex, PoisonError};

use heapless::FnvIndexMap;
use log::{debug, warn};

use crate::app::ports::ConfigSource;

/// Device id stamped on readings whose sensor is unknown.
pub const UNRESOLVED_DEVICE_ID: i64 = 1;

/// Fixed cache size.  Power of two (heapless index map requirement).
pub const CACHE_CAPACITY: usize = 64;

pub struct DeviceIdResolver {
    source: Arc<dyn ConfigSource>,
    cache: Mutex<FnvIndexMap<String, i64, CACHE_CAPACITY>>,
}

impl DeviceIdResolver {
    pub fn new(source: Arc<dyn ConfigSource>) -> Self {
        Self {
            source,
            cache: Mutex::new(FnvIndexMap::new()),
        }
    }

    /// Resolve `identifier`, falling back to the sentinel.
    pub fn resolve(&self, identifier: &str) -> i64 {
        if let Some(id) = self.cached(identifier) {
            return id;
        }

        // Query outside the lock: the source may be slow.
        match self.source.device_id_for_sensor(identifier) {
            Some(id) => {
                let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
                if cache.insert(identifier.to_string(), id).is_err() {
                    warn!("Device id cache full, not caching {identifier}");
                }
                id
            }
            None => {
                debug!("No device id for {identifier}, using {UNRESOLVED_DEVICE_ID}");
                UNRESOLVED_DEVICE_ID
            }
        }
    }

    pub fn cached(&self, identifier: &str) -> Option<i64> {
        let cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        cache.get(identifier).copied()
    }

    pub fn cache_len(&self) -> usize {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}
