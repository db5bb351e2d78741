//! System clock adapter.
//!
//! Provides wall-clock time for telemetry timestamps and the auto-clean
//! timer.  Tests inject a manual clock through the same [`Clock`] port.

use chrono::{DateTime, Utc};

use crate::app::ports::Clock;

/// Wall clock (UTC).
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl SystemClock {
    pub fn new() -> Self {
        Self
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
