//! Generic sensor polling driver.
//!
//! Each round picks the drivers whose interval has elapsed, issues one
//! `REQUEST_SENSOR_DATA` per distinct request tag, and hands the reply to
//! every due driver sharing that tag.  Decoded values go to the
//! [`ResilientStore`]; a failed request or a bad value only skips that
//! reading.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use log::{debug, warn};

use super::ports::{Clock, CommandPort};
use crate::sensors::SensorDriver;
use crate::telemetry::ResilientStore;

/// Outcome of one polling round.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollReport {
    /// Requests sent to the board.
    pub requests: usize,
    /// Readings handed to the store.
    pub recorded: usize,
    /// Due drivers that produced no reading.
    pub failed: usize,
}

pub struct SensorPoller {
    port: Arc<dyn CommandPort>,
    store: Arc<ResilientStore>,
    clock: Arc<dyn Clock>,
    drivers: Vec<Box<dyn SensorDriver>>,
    next_due: Mutex<Vec<Option<Instant>>>,
    timeout: Duration,
}

impl SensorPoller {
    pub fn new(
        port: Arc<dyn CommandPort>,
        store: Arc<ResilientStore>,
        clock: Arc<dyn Clock>,
        drivers: Vec<Box<dyn SensorDriver>>,
        timeout: Duration,
    ) -> Self {
        let next_due = Mutex::new(vec![None; drivers.len()]);
        Self {
            port,
            store,
            clock,
            drivers,
            next_due,
            timeout,
        }
    }

    pub fn driver_count(&self) -> usize {
        self.drivers.len()
    }

    /// Shortest driver interval; a sensible period for the polling worker.
    pub fn tick_interval(&self) -> Option<Duration> {
        self.drivers.iter().map(|d| d.interval()).min()
    }

    /// Poll every due driver once.
    pub fn poll_round(&self) -> PollReport {
        let now = Instant::now();
        let mut next_due = self.next_due.lock().unwrap_or_else(PoisonError::into_inner);

        let mut by_tag: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
        for (i, driver) in self.drivers.iter().enumerate() {
            if next_due[i].is_none_or(|at| at <= now) {
                by_tag.entry(driver.request_tag()).or_default().push(i);
                next_due[i] = Some(now + driver.interval());
            }
        }
        drop(next_due);

        let mut report = PollReport::default();
        for (tag, members) in by_tag {
            report.requests += 1;
            let request = self.drivers[members[0]].build_request();
            let reply = match self.port.send_and_wait(&request, self.timeout) {
                Ok(reply) => reply,
                Err(e) => {
                    warn!("Sensor request {tag} failed: {e}");
                    report.failed += members.len();
                    continue;
                }
            };

            let timestamp = self.clock.now();
            for i in members {
                let driver = &self.drivers[i];
                match driver.decode(&reply) {
                    Ok(value) => {
                        debug!("{} {} = {value}", driver.sensor_name(), driver.identifier());
                        self.store
                            .record(driver.sensor_name(), driver.identifier(), value, timestamp);
                        report.recorded += 1;
                    }
                    Err(e) => {
                        warn!("Discarding {} reading: {e}", driver.identifier());
                        report.failed += 1;
                    }
                }
            }
        }
        report
    }
}
