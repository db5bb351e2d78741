//! Shared mutable context of the litterbox controller.
//!
//! `ApplianceContext` is the single struct that operations and the
//! background monitor read from and write to.  It lives behind the
//! controller's lock; nothing else holds a reference to it.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{ApplianceState, CleaningInterval};

// ---------------------------------------------------------------------------
// Sensor snapshot (read fresh before every state-changing action)
// ---------------------------------------------------------------------------

/// A point-in-time reading of the safety-relevant sensors.
///
/// `None` means the sensor could not be read this cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SensorSnapshot {
    /// Ultrasonic distance to whatever is inside the box (cm).
    pub presence_cm: Option<f64>,
    /// Relative humidity inside the box (%).
    pub humidity_pct: Option<f64>,
    /// Gas concentration (ppm).
    pub gas_ppm: Option<f64>,
    /// Informational only; not part of the safety verdict.
    pub temperature_c: Option<f64>,
}

impl SensorSnapshot {
    /// Everything readable and comfortably inside all thresholds.
    pub fn nominal() -> Self {
        Self {
            presence_cm: Some(150.0),
            humidity_pct: Some(45.0),
            gas_ppm: Some(50.0),
            temperature_c: Some(22.0),
        }
    }
}

// ---------------------------------------------------------------------------
// Counters
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ControllerStats {
    pub normal_cleanings: u64,
    pub complete_cleanings: u64,
    pub safety_blocks: u64,
    pub fill_operations: u64,
    pub last_fill: Option<DateTime<Utc>>,
    pub last_cleaning: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// ApplianceContext
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ApplianceContext {
    pub state: ApplianceState,
    /// Set on safety block or emergency stop, cleared on unblock.
    pub motor_blocked: bool,
    pub auto_cleaning: bool,
    pub interval: CleaningInterval,
    /// Reset by every successful normal clean.
    pub last_auto_clean: Option<DateTime<Utc>>,
    /// Monitor ticks since start (drives periodic reconciliation).
    pub ticks: u64,
    /// Bumped on every block.  An in-flight command compares it before
    /// applying its transition.
    pub block_epoch: u64,
    pub stats: ControllerStats,
}

impl ApplianceContext {
    pub fn new(interval: CleaningInterval, auto_cleaning: bool) -> Self {
        Self {
            state: ApplianceState::Empty,
            motor_blocked: false,
            auto_cleaning,
            interval,
            last_auto_clean: None,
            ticks: 0,
            block_epoch: 0,
            stats: ControllerStats::default(),
        }
    }

    /// Enter BLOCKED and lock the motor.  Returns the previous state.
    pub fn assert_block(&mut self) -> ApplianceState {
        let from = self.state;
        self.state = ApplianceState::Blocked;
        self.motor_blocked = true;
        self.block_epoch += 1;
        from
    }

    /// Whether an auto-clean is due at `now`.  The first call only arms
    /// the timer.
    pub fn auto_clean_due(&mut self, now: DateTime<Utc>) -> bool {
        let Some(last) = self.last_auto_clean else {
            self.last_auto_clean = Some(now);
            return false;
        };
        let elapsed = now.signed_duration_since(last).to_std().unwrap_or_default();
        elapsed >= self.interval.duration()
    }
}
