//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by writing structured application events to
//! the `log` facade (stderr through `env_logger` in production).  A
//! broker or dashboard adapter would implement the same trait.

use log::{info, warn};

use crate::app::events::AppEvent;
use crate::app::ports::EventSink;

/// Adapter that logs every [`AppEvent`] as one line.
pub struct LogEventSink;

impl LogEventSink {
    pub fn new() -> Self {
        Self
    }
}

impl Default for LogEventSink {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for LogEventSink {
    fn emit(&self, event: &AppEvent) {
        match event {
            AppEvent::Started(state) => {
                info!("START | initial_state={state}");
            }
            AppEvent::StateChanged { from, to } => {
                info!("STATE | {from} -> {to}");
            }
            AppEvent::SafetyBlocked { reason, faults } => {
                warn!("BLOCK | faults=0b{faults:04b} | {reason}");
            }
            AppEvent::SafetyCleared(state) => {
                info!("CLEAR | resumed in {state}");
            }
            AppEvent::AutoCleanRan => {
                info!("CLEAN | automatic normal cleaning done");
            }
            AppEvent::EmergencyStop { delivered } => {
                warn!(
                    "ESTOP | {}",
                    if *delivered { "delivered to board" } else { "NOT delivered, blocked locally" }
                );
            }
            AppEvent::StateResynced { local, device } => {
                info!("SYNC  | local={local} board={device}");
            }
        }
    }
}
