//! Inbound commands to the litterbox controller.
//!
//! These represent actions requested by the outside world (operator,
//! network events, scheduler) that the
//! [`LitterboxController`](super::controller::LitterboxController)
//! interprets and acts upon.

use core::fmt;

/// Commands that external adapters can send into the application core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplianceCommand {
    /// Fill with litter.  Only from EMPTY.
    Fill,

    /// Sift and keep the litter.
    CleanNormal { force: bool },

    /// Dump all litter.
    CleanComplete { force: bool },

    /// Lock the motor immediately, whatever the state.
    EmergencyStop,

    /// Change the auto-cleaning period (2, 5 or 8 hours).
    SetCleaningInterval(u8),

    /// Enable or disable auto-cleaning.
    SetAutoCleaning(bool),
}

impl fmt::Display for ApplianceCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fill => f.write_str("fill"),
            Self::CleanNormal { force } => write!(f, "clean_normal(force={force})"),
            Self::CleanComplete { force } => write!(f, "clean_complete(force={force})"),
            Self::EmergencyStop => f.write_str("emergency_stop"),
            Self::SetCleaningInterval(h) => write!(f, "set_cleaning_interval({h}h)"),
            Self::SetAutoCleaning(on) => write!(f, "set_auto_cleaning({on})"),
        }
    }
}
