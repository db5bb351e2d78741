//! Safety gate.
//!
//! The gate is evaluated **before every state-changing action** and by
//! every monitor tick.  It never caches: each call works on a snapshot that
//! the caller has just read from the board.
//!
//! ## Conditions
//!
//! | Fault              | Trigger                                      |
//! |--------------------|----------------------------------------------|
//! | `CatPresent`       | distance ≤ presence threshold                |
//! | `HumidityHigh`     | humidity > max humidity                      |
//! | `GasHigh`          | gas > danger threshold                       |
//! | `SensorUnavailable`| any of the three could not be read           |
//!
//! Several faults can be active at once; the verdict reason lists them all
//! in the order above.

use core::fmt;

use crate::config::LitterboxConfig;
use crate::fsm::context::SensorSnapshot;

// ---------------------------------------------------------------------------
// Faults
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SafetyFault {
    CatPresent = 0b0000_0001,
    HumidityHigh = 0b0000_0010,
    GasHigh = 0b0000_0100,
    SensorUnavailable = 0b0000_1000,
}

impl SafetyFault {
    /// Return the bitmask for this fault.
    pub const fn mask(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for SafetyFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CatPresent => write!(f, "cat present"),
            Self::HumidityHigh => write!(f, "humidity too high"),
            Self::GasHigh => write!(f, "gas too high"),
            Self::SensorUnavailable => write!(f, "sensor unavailable"),
        }
    }
}

// ---------------------------------------------------------------------------
// Thresholds and verdict
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SafetyThresholds {
    pub presence_cm: f64,
    pub max_humidity_pct: f64,
    pub max_gas_ppm: f64,
}

impl SafetyThresholds {
    pub fn from_config(cfg: &LitterboxConfig) -> Self {
        Self {
            presence_cm: cfg.presence_threshold_cm,
            max_humidity_pct: cfg.max_humidity_pct,
            max_gas_ppm: cfg.max_gas_ppm,
        }
    }
}

impl Default for SafetyThresholds {
    fn default() -> Self {
        Self::from_config(&LitterboxConfig::default())
    }
}

/// Outcome of one evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SafetyVerdict {
    pub safe: bool,
    pub reason: String,
    /// Bitmask of [`SafetyFault`]s behind `reason`.
    pub faults: u8,
}

impl SafetyVerdict {
    pub fn has_fault(&self, fault: SafetyFault) -> bool {
        self.faults & fault.mask() != 0
    }
}

// ---------------------------------------------------------------------------
// Gate
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct SafetyGate {
    thresholds: SafetyThresholds,
}

impl SafetyGate {
    pub fn new(thresholds: SafetyThresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &SafetyThresholds {
        &self.thresholds
    }

    /// Evaluate a fresh snapshot.
    pub fn evaluate(&self, snap: &SensorSnapshot) -> SafetyVerdict {
        let t = &self.thresholds;
        let mut faults = 0u8;
        let mut reasons: Vec<String> = Vec::new();
        let mut missing: Vec<&str> = Vec::new();

        match snap.presence_cm {
            Some(cm) if cm <= t.presence_cm => {
                faults |= SafetyFault::CatPresent.mask();
                reasons.push(format!("cat detected in litterbox ({cm:.1} cm)"));
            }
            Some(_) => {}
            None => missing.push("presence"),
        }

        match snap.humidity_pct {
            Some(h) if h > t.max_humidity_pct => {
                faults |= SafetyFault::HumidityHigh.mask();
                reasons.push(format!(
                    "humidity too high: {h:.1}% (max {:.1}%)",
                    t.max_humidity_pct
                ));
            }
            Some(_) => {}
            None => missing.push("humidity"),
        }

        match snap.gas_ppm {
            Some(g) if g > t.max_gas_ppm => {
                faults |= SafetyFault::GasHigh.mask();
                reasons.push(format!("gas too high: {g:.0} ppm (max {:.0} ppm)", t.max_gas_ppm));
            }
            Some(_) => {}
            None => missing.push("gas"),
        }

        if !missing.is_empty() {
            faults |= SafetyFault::SensorUnavailable.mask();
            reasons.push(format!("sensor unavailable: {}", missing.join(", ")));
        }

        if faults == 0 {
            SafetyVerdict {
                safe: true,
                reason: "conditions safe".into(),
                faults,
            }
        } else {
            SafetyVerdict {
                safe: false,
                reason: reasons.join("; "),
                faults,
            }
        }
    }
}
