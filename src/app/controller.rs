//! Litterbox controller, the hexagonal core of the appliance.
//!
//! [`LitterboxController`] owns the appliance context, the safety gate and
//! the command port.  Operator operations and the monitor steps are
//! serialised by the operation lock, so a monitor tick never observes a
//! half-applied operation.  The context lock is only held to read or
//! update the context, never across board I/O: an emergency stop asserts
//! BLOCKED at once, even while a fill or clean is still waiting for the
//! board, and the in-flight operation then completes without its
//! transition.
//!
//! ```text
//!  operator ──▶ ┌──────────────────────────────┐ ──▶ EventSink
//!               │     LitterboxController      │
//!  monitor  ──▶ │  guard · SafetyGate · table  │ ──▶ CommandPort ──▶ board
//!               └──────────────────────────────┘
//! ```
//!
//! Monitor tick, each step isolated (a failure is logged, the next step
//! still runs):
//!
//! ```text
//!   (a) safety      unsafe & unblocked ─▶ BLOCKED, send block
//!                   safe & blocked     ─▶ send unblock, adopt board state
//!   (b) auto-clean  READY & due        ─▶ clean_normal()
//!   (c) sync        every N ticks      ─▶ adopt board EMPTY/READY
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use serde::Serialize;

use super::commands::ApplianceCommand;
use super::events::AppEvent;
use super::ports::{Clock, CommandPort, ConfigSource, EventSink};
use crate::config::LitterboxConfig;
use crate::error::{ChannelError, ControlError};
use crate::fsm::context::{ApplianceContext, ControllerStats};
use crate::fsm::operations::{Operation, descriptor};
use crate::fsm::{ApplianceState, CleaningInterval};
use crate::protocol::{Command, LitterboxAction};
use crate::safety::{SafetyGate, SafetyThresholds, SafetyVerdict};
use crate::sensors::litterbox::{STATUS_TAG, read_safety_snapshot};

/// Snapshot of the controller for status queries.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ControllerStatus {
    pub state: ApplianceState,
    pub motor_blocked: bool,
    pub auto_cleaning: bool,
    pub cleaning_interval_hours: u8,
    pub last_auto_clean: Option<DateTime<Utc>>,
    pub monitoring: bool,
    pub stats: ControllerStats,
}

// ───────────────────────────────────────────────────────────────
// LitterboxController
// ───────────────────────────────────────────────────────────────

pub struct LitterboxController {
    port: Arc<dyn CommandPort>,
    gate: SafetyGate,
    config: LitterboxConfig,
    ctx: Mutex<ApplianceContext>,
    ops: Mutex<()>,
    events: Arc<dyn EventSink>,
    clock: Arc<dyn Clock>,
    monitoring: AtomicBool,
}

impl LitterboxController {
    pub fn new(
        port: Arc<dyn CommandPort>,
        config: LitterboxConfig,
        events: Arc<dyn EventSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let interval = CleaningInterval::from_hours(config.default_cleaning_interval_hours)
            .unwrap_or(CleaningInterval::FiveHours);
        let ctx = ApplianceContext::new(interval, config.auto_cleaning);
        Self {
            port,
            gate: SafetyGate::new(SafetyThresholds::from_config(&config)),
            config,
            ctx: Mutex::new(ctx),
            ops: Mutex::new(()),
            events,
            clock,
            monitoring: AtomicBool::new(false),
        }
    }

    // ── Lifecycle ─────────────────────────────────────────────

    /// Pick up the board's view of the state and mark monitoring active.
    ///
    /// A board that does not answer leaves the initial EMPTY in place.
    pub fn start(&self) {
        if let Err(e) = self.sync_with_device() {
            warn!("Initial state sync failed: {e}");
        }
        self.monitoring.store(true, Ordering::SeqCst);
        let state = self.state();
        self.events.emit(&AppEvent::Started(state));
        info!("Litterbox controller started in {state}");
    }

    pub fn stop(&self) {
        self.monitoring.store(false, Ordering::SeqCst);
        info!("Litterbox monitoring stopped");
    }

    /// Apply per-appliance settings from the configuration source.
    ///
    /// The appliance code resolves to a device identifier first; settings
    /// are stored against that identifier.
    pub fn load_settings(&self, source: &dyn ConfigSource) {
        let code = &self.config.appliance_code;
        let Some(identifier) = source.device_identifier(code) else {
            debug!("No device registered for {code}, keeping defaults");
            return;
        };
        let Some(settings) = source.appliance_settings(&identifier) else {
            debug!("No stored settings for {identifier}, keeping defaults");
            return;
        };
        let mut ctx = self.lock();
        match CleaningInterval::from_hours(settings.cleaning_interval_hours) {
            Some(interval) => ctx.interval = interval,
            None => warn!(
                "Ignoring stored cleaning interval {}h for {code}",
                settings.cleaning_interval_hours
            ),
        }
        ctx.auto_cleaning = self.config.auto_cleaning && settings.enabled;
        info!(
            "Loaded settings for {code} ({identifier}): every {}h, auto-cleaning {}",
            ctx.interval.hours(),
            if ctx.auto_cleaning { "on" } else { "off" }
        );
    }

    // ── Operator operations ───────────────────────────────────

    pub fn fill(&self) -> Result<String, ControlError> {
        self.run(Operation::Fill, false)
    }

    pub fn clean_normal(&self, force: bool) -> Result<String, ControlError> {
        self.run(Operation::CleanNormal, force)
    }

    pub fn clean_complete(&self, force: bool) -> Result<String, ControlError> {
        self.run(Operation::CleanComplete, force)
    }

    /// Lock the motor, whatever the state or the sensors say.
    ///
    /// Local state is BLOCKED before the first delivery attempt and stays
    /// BLOCKED if every attempt fails.  Never waits for an operation in
    /// flight.  The monitor may unblock later once conditions are safe.
    pub fn emergency_stop(&self) -> Result<String, ControlError> {
        let from = self.lock().assert_block();
        warn!("EMERGENCY STOP asserted (was {from})");
        if from != ApplianceState::Blocked {
            self.events.emit(&AppEvent::StateChanged {
                from,
                to: ApplianceState::Blocked,
            });
        }

        let delivery = self.deliver_emergency_stop();
        self.events.emit(&AppEvent::EmergencyStop {
            delivered: delivery.is_ok(),
        });
        match delivery {
            Ok(attempt) => Ok(format!("emergency stop delivered (attempt {attempt})")),
            Err(e) => {
                error!("Emergency stop not delivered, motor blocked locally: {e}");
                Err(ControlError::Link(e))
            }
        }
    }

    pub fn set_cleaning_interval(&self, hours: u8) -> Result<String, ControlError> {
        let interval = CleaningInterval::from_hours(hours).ok_or(ControlError::InvalidInterval(hours))?;
        self.lock().interval = interval;
        info!("Cleaning interval set to {hours}h");
        Ok(format!("cleaning interval set to {hours}h"))
    }

    pub fn set_auto_cleaning(&self, enabled: bool) -> String {
        self.lock().auto_cleaning = enabled;
        let word = if enabled { "enabled" } else { "disabled" };
        info!("Auto-cleaning {word}");
        format!("auto-cleaning {word}")
    }

    /// Route an operator command to its operation.
    pub fn handle_command(&self, command: ApplianceCommand) -> Result<String, ControlError> {
        debug!("Command: {command}");
        match command {
            ApplianceCommand::Fill => self.fill(),
            ApplianceCommand::CleanNormal { force } => self.clean_normal(force),
            ApplianceCommand::CleanComplete { force } => self.clean_complete(force),
            ApplianceCommand::EmergencyStop => self.emergency_stop(),
            ApplianceCommand::SetCleaningInterval(hours) => self.set_cleaning_interval(hours),
            ApplianceCommand::SetAutoCleaning(on) => Ok(self.set_auto_cleaning(on)),
        }
    }

    // ── Background monitor ────────────────────────────────────

    /// One monitor cycle.  Never fails; each step logs its own errors.
    pub fn monitor_tick(&self) {
        let tick = {
            let mut ctx = self.lock();
            ctx.ticks += 1;
            ctx.ticks
        };

        if let Err(e) = self.enforce_safety() {
            warn!("Monitor: safety step failed: {e}");
        }
        if let Err(e) = self.auto_clean_if_due() {
            warn!("Monitor: auto-clean failed: {e}");
        }
        let every = u64::from(self.config.sync_every_ticks);
        if every > 0 && tick % every == 0 {
            if let Err(e) = self.sync_with_device() {
                debug!("Monitor: state sync failed: {e}");
            }
        }
    }

    /// Reconcile local state with the board's report.
    ///
    /// The board wins on EMPTY/READY.  A local safety block is never lifted
    /// here (only the safety step does that) and a BLOCKED report is not
    /// adopted, since the block reason would be unknown.
    pub fn sync_with_device(&self) -> Result<ApplianceState, ControlError> {
        let _op = self.begin_operation();
        {
            let ctx = self.lock();
            if ctx.motor_blocked {
                return Ok(ctx.state);
            }
        }

        let timeout = Duration::from_millis(self.config.sync_timeout_ms);
        let reply = self.port.send_and_wait(&Command::request_sensor(STATUS_TAG), timeout)?;
        if !reply.is_success() {
            return Err(ControlError::Rejected(reply.error_message()));
        }
        let device = reply
            .state_code()
            .and_then(ApplianceState::from_wire)
            .ok_or_else(|| ControlError::Rejected("status reply without a valid state".into()))?;

        let mut ctx = self.lock();
        if ctx.motor_blocked {
            debug!("Blocked while syncing, keeping {}", ctx.state);
            return Ok(ctx.state);
        }
        if device == ApplianceState::Blocked {
            debug!("Board reports BLOCKED without a local block, not adopting");
        } else if device != ctx.state {
            let local = ctx.state;
            info!("Resyncing state {local} -> {device} from board");
            ctx.state = device;
            self.events.emit(&AppEvent::StateResynced { local, device });
            self.events.emit(&AppEvent::StateChanged { from: local, to: device });
        }
        Ok(ctx.state)
    }

    // ── Queries ───────────────────────────────────────────────

    pub fn state(&self) -> ApplianceState {
        self.lock().state
    }

    pub fn is_monitoring(&self) -> bool {
        self.monitoring.load(Ordering::SeqCst)
    }

    pub fn status(&self) -> ControllerStatus {
        let ctx = self.lock();
        ControllerStatus {
            state: ctx.state,
            motor_blocked: ctx.motor_blocked,
            auto_cleaning: ctx.auto_cleaning,
            cleaning_interval_hours: ctx.interval.hours(),
            last_auto_clean: ctx.last_auto_clean,
            monitoring: self.is_monitoring(),
            stats: ctx.stats.clone(),
        }
    }

    /// Read the sensors and evaluate them now.  Never cached.
    pub fn check_safety(&self) -> SafetyVerdict {
        let snapshot = read_safety_snapshot(self.port.as_ref(), self.sensor_timeout());
        self.gate.evaluate(&snapshot)
    }

    pub fn config(&self) -> &LitterboxConfig {
        &self.config
    }

    // ── Internal ──────────────────────────────────────────────

    fn lock(&self) -> MutexGuard<'_, ApplianceContext> {
        self.ctx.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn begin_operation(&self) -> MutexGuard<'_, ()> {
        self.ops.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The context, or `Preempted` if a block landed since `epoch`.
    fn lock_unless_blocked_since(
        &self,
        epoch: u64,
        name: &str,
    ) -> Result<MutexGuard<'_, ApplianceContext>, ControlError> {
        let ctx = self.lock();
        if ctx.block_epoch == epoch {
            Ok(ctx)
        } else {
            drop(ctx);
            warn!("{name} preempted by a motor block, state stays BLOCKED");
            Err(ControlError::Preempted)
        }
    }

    fn sensor_timeout(&self) -> Duration {
        Duration::from_millis(self.config.sensor_timeout_ms)
    }

    /// guard → safety → command → transition.  The context is locked for
    /// the guard and the transition only; a block asserted in between
    /// wins over the transition.
    fn run(&self, op: Operation, force: bool) -> Result<String, ControlError> {
        let d = descriptor(op);
        let _op = self.begin_operation();

        let epoch = {
            let ctx = self.lock();
            if let Err(e) = d.guard(ctx.state, force) {
                warn!("Refused {}: {e}", d.name);
                return Err(e);
            }
            ctx.block_epoch
        };

        if d.bypasses(force) {
            warn!("Forced {}: skipping state and safety checks", d.name);
        } else {
            let verdict = self.check_safety();
            if !verdict.safe {
                warn!("Refused {}: {}", d.name, verdict.reason);
                return Err(ControlError::Unsafe(verdict.reason));
            }
        }

        drop(self.lock_unless_blocked_since(epoch, d.name)?);
        info!("Starting {}", d.name);
        let reply = self
            .port
            .send_and_wait(&Command::litterbox(d.action), (d.timeout)(&self.config))?;
        if !reply.is_success() {
            let msg = reply.error_message();
            warn!("{} rejected by board: {msg}", d.name);
            return Err(ControlError::Rejected(msg));
        }

        let mut ctx = self.lock_unless_blocked_since(epoch, d.name)?;
        let from = ctx.state;
        d.complete(&mut ctx, self.clock.now());
        if from == ApplianceState::Blocked && ctx.state != ApplianceState::Blocked {
            ctx.motor_blocked = false;
        }
        let to = ctx.state;
        if from != to {
            self.events.emit(&AppEvent::StateChanged { from, to });
        }
        info!("{} completed, state {to}", d.name);
        Ok(format!("{} completed", d.name))
    }

    /// Step (a): block on unsafe, unblock on recovery.
    fn enforce_safety(&self) -> Result<(), ControlError> {
        let _op = self.begin_operation();
        let verdict = self.check_safety();
        let mut ctx = self.lock();

        if !verdict.safe && !ctx.motor_blocked {
            let from = ctx.assert_block();
            ctx.stats.safety_blocks += 1;
            drop(ctx);
            warn!("Blocking motor: {}", verdict.reason);
            if from != ApplianceState::Blocked {
                self.events.emit(&AppEvent::StateChanged {
                    from,
                    to: ApplianceState::Blocked,
                });
            }
            self.events.emit(&AppEvent::SafetyBlocked {
                reason: verdict.reason,
                faults: verdict.faults,
            });
            // Local block stands even if the board never hears about it.
            self.port
                .send_fire_and_forget(&Command::litterbox(LitterboxAction::Block))?;
        } else if verdict.safe && ctx.motor_blocked {
            let epoch = ctx.block_epoch;
            drop(ctx);
            let timeout = Duration::from_millis(self.config.unblock_timeout_ms);
            let reply = self
                .port
                .send_and_wait(&Command::litterbox(LitterboxAction::Unblock), timeout)?;
            if !reply.is_success() {
                return Err(ControlError::Rejected(reply.error_message()));
            }
            let device = reply
                .state_code()
                .and_then(ApplianceState::from_wire)
                .unwrap_or(ApplianceState::Empty);
            if device == ApplianceState::Blocked {
                warn!("Board still reports BLOCKED after unblock, staying blocked");
                return Ok(());
            }

            let mut ctx = self.lock();
            if ctx.block_epoch != epoch {
                drop(ctx);
                warn!("Blocked again during unblock, re-sending block");
                self.port
                    .send_fire_and_forget(&Command::litterbox(LitterboxAction::Block))?;
                return Ok(());
            }
            ctx.state = device;
            ctx.motor_blocked = false;
            drop(ctx);
            info!("Conditions safe, motor unblocked, board reports {device}");
            self.events.emit(&AppEvent::StateChanged {
                from: ApplianceState::Blocked,
                to: device,
            });
            self.events.emit(&AppEvent::SafetyCleared(device));
        } else if !verdict.safe {
            debug!("Still unsafe: {}", verdict.reason);
        }
        Ok(())
    }

    /// Step (b).  The lock is released before cleaning re-takes it.
    fn auto_clean_if_due(&self) -> Result<(), ControlError> {
        let now = self.clock.now();
        let due = {
            let mut ctx = self.lock();
            ctx.auto_cleaning && ctx.state == ApplianceState::Ready && ctx.auto_clean_due(now)
        };
        if !due {
            return Ok(());
        }
        info!("Auto-clean due");
        self.clean_normal(false)?;
        self.events.emit(&AppEvent::AutoCleanRan);
        Ok(())
    }

    /// Returns the 1-based attempt that got through, or the last error.
    fn deliver_emergency_stop(&self) -> Result<u32, ChannelError> {
        let attempts = self.config.emergency_stop_attempts.max(1);
        let pause = Duration::from_millis(self.config.emergency_stop_retry_ms);
        let mut last_err = None;
        for attempt in 1..=attempts {
            match self.port.send_fire_and_forget(&Command::emergency_stop()) {
                Ok(()) => return Ok(attempt),
                Err(e) => {
                    warn!("Emergency stop attempt {attempt}/{attempts} failed: {e}");
                    last_err = Some(e);
                }
            }
            if attempt < attempts {
                thread::sleep(pause);
            }
        }
        Err(last_err.unwrap_or_else(|| ChannelError::Encode("no delivery attempt made".into())))
    }
}
