//! Appliance state model.
//!
//! ```text
//!            fill                 complete_clean
//!   ┌───────┐ ───────▶ ┌───────┐ ───────────────▶ ┌───────┐
//!   │ EMPTY │          │ READY │                  │ EMPTY │
//!   └───────┘ ◀─────── └───────┘ ◀──┐             └───────┘
//!       │                  │ normal_clean (self-loop)
//!       │                  └────────┘
//!       │   safety block / emergency stop (from any state)
//!       ▼
//!   ┌─────────┐  unblock (safety restored) ──▶ state reported by the board
//!   │ BLOCKED │
//!   └─────────┘
//! ```
//!
//! The numeric codes match the microcontroller firmware, which is the
//! source of truth for physical state after a restart.  Transitions out of
//! the operator operations are described by the static table in
//! [`operations`]; the controller owns the mutable [`context`].

pub mod context;
pub mod operations;

use core::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// State identity
// ---------------------------------------------------------------------------

/// Litterbox state as understood by both sides of the link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(i8)]
pub enum ApplianceState {
    /// No litter; needs filling.
    Empty = 0,
    /// Filled and usable.
    Ready = 1,
    /// Motor locked out.  The cause is not encoded here.
    Blocked = -1,
}

impl ApplianceState {
    /// Decode the board's integer state code.
    pub fn from_wire(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::Empty),
            1 => Some(Self::Ready),
            -1 => Some(Self::Blocked),
            _ => None,
        }
    }

    pub const fn code(self) -> i8 {
        self as i8
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Empty => "EMPTY",
            Self::Ready => "READY",
            Self::Blocked => "BLOCKED",
        }
    }
}

impl fmt::Display for ApplianceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ---------------------------------------------------------------------------
// Auto-cleaning interval
// ---------------------------------------------------------------------------

/// The closed set of auto-cleaning periods the hardware supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum CleaningInterval {
    TwoHours,
    FiveHours,
    EightHours,
}

impl CleaningInterval {
    pub fn from_hours(hours: u8) -> Option<Self> {
        match hours {
            2 => Some(Self::TwoHours),
            5 => Some(Self::FiveHours),
            8 => Some(Self::EightHours),
            _ => None,
        }
    }

    pub const fn hours(self) -> u8 {
        match self {
            Self::TwoHours => 2,
            Self::FiveHours => 5,
            Self::EightHours => 8,
        }
    }

    pub fn duration(self) -> Duration {
        Duration::from_secs(u64::from(self.hours()) * 3600)
    }
}

impl TryFrom<u8> for CleaningInterval {
    type Error = String;

    fn try_from(hours: u8) -> Result<Self, Self::Error> {
        Self::from_hours(hours).ok_or_else(|| format!("invalid cleaning interval {hours}h"))
    }
}

impl From<CleaningInterval> for u8 {
    fn from(i: CleaningInterval) -> Self {
        i.hours()
    }
}
