//! Outbound application events.
//!
//! The [`LitterboxController`](super::controller::LitterboxController)
//! emits these through the [`EventSink`](super::ports::EventSink) port.
//! Adapters on the other side decide what to do with them: log them,
//! forward them to a broker, or record them in a test.

use crate::fsm::ApplianceState;

/// Structured events emitted by the application core.
#[derive(Debug, Clone, PartialEq)]
pub enum AppEvent {
    /// The controller has started (carries initial state).
    Started(ApplianceState),

    /// The appliance moved between states.
    StateChanged {
        from: ApplianceState,
        to: ApplianceState,
    },

    /// The monitor locked the motor.  `faults` is the safety fault mask.
    SafetyBlocked { reason: String, faults: u8 },

    /// Conditions recovered; carries the state the board reported.
    SafetyCleared(ApplianceState),

    /// An automatic normal cleaning completed.
    AutoCleanRan,

    /// Emergency stop asserted.  `delivered` tells whether the board got it.
    EmergencyStop { delivered: bool },

    /// Local state was corrected from the board's authoritative view.
    StateResynced {
        local: ApplianceState,
        device: ApplianceState,
    },
}
