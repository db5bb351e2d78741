//! Configuration source backed by the TOML file.
//!
//! Serves the `[device_ids]` and `[appliances.*]` tables through the
//! [`ConfigSource`] port.  A database-backed source would implement the
//! same trait; callers already cache and treat `None` as "not found".

use std::collections::BTreeMap;

use crate::app::ports::{ApplianceSettings, ConfigSource};
use crate::config::{ApplianceEntry, SystemConfig};

pub struct StaticConfigSource {
    device_ids: BTreeMap<String, i64>,
    appliances: BTreeMap<String, ApplianceEntry>,
}

impl StaticConfigSource {
    pub fn new(device_ids: BTreeMap<String, i64>, appliances: BTreeMap<String, ApplianceEntry>) -> Self {
        Self {
            device_ids,
            appliances,
        }
    }

    pub fn from_config(config: &SystemConfig) -> Self {
        Self::new(config.device_ids.clone(), config.appliances.clone())
    }
}

impl ConfigSource for StaticConfigSource {
    fn device_identifier(&self, appliance_code: &str) -> Option<String> {
        self.appliances.get(appliance_code).map(|a| a.identifier.clone())
    }

    fn device_id_for_sensor(&self, sensor_identifier: &str) -> Option<i64> {
        self.device_ids.get(sensor_identifier).copied()
    }

    fn appliance_settings(&self, device_identifier: &str) -> Option<ApplianceSettings> {
        self.appliances
            .values()
            .find(|a| a.identifier == device_identifier)
            .map(|a| ApplianceSettings {
                cleaning_interval_hours: a.cleaning_interval_hours,
                enabled: a.enabled,
            })
    }
}
