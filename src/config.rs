//! System configuration parameters
//!
//! All tunable parameters for the CatHub coordinator, loaded from a TOML
//! file at startup.  Every section carries `#[serde(default)]` so a
//! partial file only overrides what it names.
//!
//! The `[[sensors]]`, `[device_ids]` and `[appliances.*]` tables stand in
//! for the configuration database and back
//! [`StaticConfigSource`](crate::adapters::config_source::StaticConfigSource).

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use log::warn;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::fsm::CleaningInterval;
use crate::sensors::SensorKind;

/// Core system configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    pub serial: SerialConfig,
    pub litterbox: LitterboxConfig,
    pub telemetry: TelemetryConfig,
    /// Sensors polled by the generic polling driver.
    pub sensors: Vec<SensorEntry>,
    /// Sensor identifier → numeric device id.
    pub device_ids: BTreeMap<String, i64>,
    /// Appliance code → per-appliance settings.
    pub appliances: BTreeMap<String, ApplianceEntry>,
}

/// Serial link to the microcontroller.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    /// Device path, e.g. `/dev/ttyACM0`.
    pub port: String,
    pub baud_rate: u32,
    /// Per-read timeout of the OS port (milliseconds).
    pub read_timeout_ms: u64,
    /// Minimum spacing between reconnection attempts (seconds).
    pub reconnect_interval_secs: u64,
    /// Wait after opening the port for the board to finish resetting.
    pub settle_ms: u64,
    /// Reads attempted while waiting for the PING reply.
    pub ping_attempts: u32,
    /// Pause between PING reply reads (milliseconds).
    pub ping_delay_ms: u64,
    /// Sleep between read attempts inside the response loop (milliseconds).
    pub poll_interval_ms: u64,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: "/dev/ttyACM0".into(),
            baud_rate: 9600,
            read_timeout_ms: 100,
            reconnect_interval_secs: 10,
            settle_ms: 2000,
            ping_attempts: 5,
            ping_delay_ms: 200,
            poll_interval_ms: 100,
        }
    }
}

impl SerialConfig {
    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_secs(self.reconnect_interval_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Litterbox controller and safety thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LitterboxConfig {
    /// Code looked up in the configuration source.
    pub appliance_code: String,
    /// Background monitor period (seconds).
    pub monitor_interval_secs: u64,
    /// Humidity above this blocks actuation (%).
    pub max_humidity_pct: f64,
    /// Gas concentration above this blocks actuation (ppm).
    pub max_gas_ppm: f64,
    /// A reading at or below this distance (cm) means a cat is inside.
    pub presence_threshold_cm: f64,
    pub fill_timeout_ms: u64,
    pub clean_timeout_ms: u64,
    pub unblock_timeout_ms: u64,
    pub sync_timeout_ms: u64,
    pub sensor_timeout_ms: u64,
    /// Delivery attempts for `EMERGENCY_STOP`.
    pub emergency_stop_attempts: u32,
    /// Pause between emergency stop attempts (milliseconds).
    pub emergency_stop_retry_ms: u64,
    /// Reconcile with the microcontroller every N monitor ticks (0 = never).
    pub sync_every_ticks: u32,
    /// Used when the configuration source has no setting for this appliance.
    pub default_cleaning_interval_hours: u8,
    pub auto_cleaning: bool,
}

impl Default for LitterboxConfig {
    fn default() -> Self {
        Self {
            appliance_code: "litterbox".into(),
            monitor_interval_secs: 10,
            max_humidity_pct: 75.0,
            max_gas_ppm: 1000.0,
            presence_threshold_cm: 30.0,
            fill_timeout_ms: 15_000,
            clean_timeout_ms: 30_000,
            unblock_timeout_ms: 5_000,
            sync_timeout_ms: 3_000,
            sensor_timeout_ms: 5_000,
            emergency_stop_attempts: 3,
            emergency_stop_retry_ms: 500,
            sync_every_ticks: 6, // once a minute at the default period
            default_cleaning_interval_hours: 5,
            auto_cleaning: true,
        }
    }
}

impl LitterboxConfig {
    pub fn monitor_interval(&self) -> Duration {
        Duration::from_secs(self.monitor_interval_secs)
    }
}

/// Telemetry persistence.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Root of the local pending queue and permanent copy.
    pub data_dir: String,
    /// Endpoint accepting one reading document per POST.
    pub remote_url: String,
    /// Reachability probe. Falls back to `remote_url` when absent.
    pub health_url: Option<String>,
    pub request_timeout_ms: u64,
    /// Period of the drain worker (seconds).
    pub drain_interval_secs: u64,
    /// Maximum pending entries replayed per drain.
    pub drain_batch_limit: usize,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            data_dir: "data".into(),
            remote_url: "http://127.0.0.1:8080/api/readings".into(),
            health_url: None,
            request_timeout_ms: 5_000,
            drain_interval_secs: 60,
            drain_batch_limit: 100,
        }
    }
}

/// One polled sensor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorEntry {
    pub kind: SensorKind,
    pub identifier: String,
    #[serde(default = "default_poll_secs")]
    pub interval_secs: u64,
}

fn default_poll_secs() -> u64 {
    60
}

/// Per-appliance settings row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplianceEntry {
    /// Device identifier of the appliance itself.
    pub identifier: String,
    pub cleaning_interval_hours: u8,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl SystemConfig {
    /// Load and validate configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        let config: Self = toml::from_str(&text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Like [`load`](Self::load) but a missing file yields the defaults.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::load(path)
        } else {
            warn!("Config {} not found, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Reject dangerous or nonsensical values instead of clamping them.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let s = &self.serial;
        if s.port.is_empty() {
            return Err(ConfigError::ValidationFailed("serial.port is empty"));
        }
        if s.baud_rate == 0 {
            return Err(ConfigError::ValidationFailed("serial.baud_rate must be > 0"));
        }
        if s.read_timeout_ms == 0 || s.poll_interval_ms == 0 {
            return Err(ConfigError::ValidationFailed("serial timeouts must be > 0"));
        }

        let l = &self.litterbox;
        if l.monitor_interval_secs == 0 {
            return Err(ConfigError::ValidationFailed(
                "litterbox.monitor_interval_secs must be > 0",
            ));
        }
        if !(l.max_humidity_pct > 0.0 && l.max_humidity_pct <= 100.0) {
            return Err(ConfigError::ValidationFailed(
                "litterbox.max_humidity_pct must be in (0, 100]",
            ));
        }
        if !(l.max_gas_ppm > 0.0 && l.max_gas_ppm.is_finite()) {
            return Err(ConfigError::ValidationFailed("litterbox.max_gas_ppm must be > 0"));
        }
        if !(l.presence_threshold_cm > 0.0 && l.presence_threshold_cm.is_finite()) {
            return Err(ConfigError::ValidationFailed(
                "litterbox.presence_threshold_cm must be > 0",
            ));
        }
        if [
            l.fill_timeout_ms,
            l.clean_timeout_ms,
            l.unblock_timeout_ms,
            l.sync_timeout_ms,
            l.sensor_timeout_ms,
        ]
        .contains(&0)
        {
            return Err(ConfigError::ValidationFailed("litterbox command timeouts must be > 0"));
        }
        if l.emergency_stop_attempts == 0 {
            return Err(ConfigError::ValidationFailed(
                "litterbox.emergency_stop_attempts must be > 0",
            ));
        }
        if CleaningInterval::from_hours(l.default_cleaning_interval_hours).is_none() {
            return Err(ConfigError::ValidationFailed(
                "litterbox.default_cleaning_interval_hours must be 2, 5 or 8",
            ));
        }

        let t = &self.telemetry;
        if t.data_dir.is_empty() {
            return Err(ConfigError::ValidationFailed("telemetry.data_dir is empty"));
        }
        if t.drain_batch_limit == 0 || t.drain_interval_secs == 0 {
            return Err(ConfigError::ValidationFailed(
                "telemetry drain interval and batch limit must be > 0",
            ));
        }

        for sensor in &self.sensors {
            if sensor.identifier.is_empty() {
                return Err(ConfigError::ValidationFailed("sensor identifier is empty"));
            }
            if sensor.interval_secs == 0 {
                return Err(ConfigError::ValidationFailed("sensor interval_secs must be > 0"));
            }
        }
        for appliance in self.appliances.values() {
            if CleaningInterval::from_hours(appliance.cleaning_interval_hours).is_none() {
                return Err(ConfigError::ValidationFailed(
                    "appliance cleaning_interval_hours must be 2, 5 or 8",
                ));
            }
        }
        Ok(())
    }
}
