//! Integration tests for LitterboxController → SafetyGate → board.
//!
//! The board is modelled at command level by `LitterboxBoard`; the clock
//! is manual so auto-cleaning is deterministic.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use cathub::app::commands::ApplianceCommand;
use cathub::app::controller::LitterboxController;
use cathub::app::events::AppEvent;
use cathub::app::ports::{ApplianceSettings, CommandPort};
use cathub::config::LitterboxConfig;
use cathub::error::ControlError;
use cathub::fsm::ApplianceState;
use cathub::safety::SafetyFault;

use crate::mock_hw::{LitterboxBoard, ManualClock, MapConfig, RecordingEvents};

struct Rig {
    ctl: LitterboxController,
    board: Arc<LitterboxBoard>,
    clock: Arc<ManualClock>,
    events: Arc<RecordingEvents>,
}

fn rig_with(device_state: i64, config: LitterboxConfig) -> Rig {
    let board = LitterboxBoard::new(device_state);
    let clock = ManualClock::new();
    let events = RecordingEvents::new();
    let ctl = LitterboxController::new(
        Arc::clone(&board) as Arc<dyn CommandPort>,
        config,
        events.clone(),
        clock.clone(),
    );
    ctl.start();
    Rig {
        ctl,
        board,
        clock,
        events,
    }
}

fn test_config() -> LitterboxConfig {
    LitterboxConfig {
        emergency_stop_retry_ms: 1,
        sync_every_ticks: 0,
        ..LitterboxConfig::default()
    }
}

fn rig(device_state: i64) -> Rig {
    rig_with(device_state, test_config())
}

// ── Start-up ──────────────────────────────────────────────────

#[test]
fn start_adopts_board_state() {
    let r = rig(1);
    assert_eq!(r.ctl.state(), ApplianceState::Ready);
    assert!(r.ctl.is_monitoring());
    assert!(r.events.contains(&AppEvent::Started(ApplianceState::Ready)));
}

#[test]
fn start_with_silent_board_stays_empty() {
    let board = LitterboxBoard::new(1);
    board.link_down.store(true, std::sync::atomic::Ordering::SeqCst);
    let ctl = LitterboxController::new(
        Arc::clone(&board) as Arc<dyn CommandPort>,
        test_config(),
        RecordingEvents::new(),
        ManualClock::new(),
    );
    ctl.start();
    assert_eq!(ctl.state(), ApplianceState::Empty);
}

#[test]
fn stored_settings_override_defaults() {
    let r = rig(0);
    let mut cfg = MapConfig::default();
    cfg.identifiers.insert("litterbox".into(), "LBX001".into());
    cfg.settings.insert(
        "LBX001".into(),
        ApplianceSettings {
            cleaning_interval_hours: 2,
            enabled: false,
        },
    );
    r.ctl.load_settings(&cfg);
    let s = r.ctl.status();
    assert_eq!(s.cleaning_interval_hours, 2);
    assert!(!s.auto_cleaning);
}

#[test]
fn unregistered_appliance_keeps_defaults() {
    let r = rig(0);
    let mut cfg = MapConfig::default();
    // Settings exist, but nothing maps the appliance code to them.
    cfg.settings.insert(
        "litterbox".into(),
        ApplianceSettings {
            cleaning_interval_hours: 2,
            enabled: false,
        },
    );
    r.ctl.load_settings(&cfg);
    let s = r.ctl.status();
    assert_eq!(s.cleaning_interval_hours, 5);
    assert!(s.auto_cleaning);
}

// ── Scenario A: fill from EMPTY ───────────────────────────────

#[test]
fn fill_from_empty_with_nominal_sensors() {
    let r = rig(0);
    assert_eq!(r.ctl.state(), ApplianceState::Empty);

    let msg = r.ctl.fill().unwrap();
    assert!(msg.contains("fill"));
    assert_eq!(r.ctl.state(), ApplianceState::Ready);
    let stats = r.ctl.status().stats;
    assert_eq!(stats.fill_operations, 1);
    assert!(stats.last_fill.is_some());
    assert_eq!(r.board.actions(), vec!["fill_litter"]);
    assert!(r.events.contains(&AppEvent::StateChanged {
        from: ApplianceState::Empty,
        to: ApplianceState::Ready,
    }));
}

// ── Scenario B: gas spike while READY ─────────────────────────

#[test]
fn gas_spike_blocks_on_monitor_tick() {
    let r = rig(1);
    r.board.set(|c| c.gas_ppm = 1500.0);

    r.ctl.monitor_tick();

    let s = r.ctl.status();
    assert_eq!(s.state, ApplianceState::Blocked);
    assert!(s.motor_blocked);
    assert_eq!(s.stats.safety_blocks, 1);
    assert_eq!(r.board.actions(), vec!["block"]);

    let blocked = r.events.all().into_iter().find_map(|e| match e {
        AppEvent::SafetyBlocked { reason, faults } => Some((reason, faults)),
        _ => None,
    });
    let (reason, faults) = blocked.expect("SafetyBlocked emitted");
    assert!(reason.contains("gas"));
    assert_eq!(faults & SafetyFault::GasHigh.mask(), SafetyFault::GasHigh.mask());

    // Still unsafe: no second block, no second count.
    r.ctl.monitor_tick();
    assert_eq!(r.ctl.status().stats.safety_blocks, 1);
    assert_eq!(r.board.actions(), vec!["block"]);
}

#[test]
fn recovery_unblocks_into_board_reported_state() {
    let r = rig(1);
    r.board.set(|c| c.presence_cm = Some(12.0));
    r.ctl.monitor_tick();
    assert_eq!(r.ctl.state(), ApplianceState::Blocked);

    r.board.set(|c| c.presence_cm = Some(150.0));
    r.board.set_device_state(0);
    r.ctl.monitor_tick();

    assert_eq!(r.ctl.state(), ApplianceState::Empty);
    assert!(!r.ctl.status().motor_blocked);
    assert_eq!(r.board.actions(), vec!["block", "unblock"]);
    assert!(r.events.contains(&AppEvent::SafetyCleared(ApplianceState::Empty)));
}

#[test]
fn board_still_blocked_keeps_local_block() {
    let r = rig(1);
    r.board.set(|c| c.humidity_pct = 90.0);
    r.ctl.monitor_tick();

    r.board.set(|c| c.humidity_pct = 40.0);
    r.board.set_device_state(-1);
    r.ctl.monitor_tick();
    assert_eq!(r.ctl.state(), ApplianceState::Blocked);
    assert!(r.ctl.status().motor_blocked);
}

#[test]
fn rejected_unblock_keeps_block() {
    let r = rig(1);
    r.board.set(|c| c.gas_ppm = 2000.0);
    r.ctl.monitor_tick();

    r.board.set(|c| c.gas_ppm = 100.0);
    r.board.reject.lock().unwrap().insert("unblock".into());
    r.ctl.monitor_tick();
    assert_eq!(r.ctl.state(), ApplianceState::Blocked);
}

// ── Safety gate on operations ─────────────────────────────────

#[test]
fn each_violation_refuses_unforced_operations() {
    let violations: [fn(&mut crate::mock_hw::Conditions); 4] = [
        |c| c.presence_cm = Some(20.0),
        |c| c.humidity_pct = 80.0,
        |c| c.gas_ppm = 1200.0,
        |c| c.presence_cm = None,
    ];
    for violate in violations {
        let r = rig(1);
        r.board.set(violate);

        for result in [r.ctl.clean_normal(false), r.ctl.clean_complete(false)] {
            assert!(matches!(result, Err(ControlError::Unsafe(_))), "{result:?}");
        }
        assert_eq!(r.ctl.state(), ApplianceState::Ready);

        let r = rig(0);
        r.board.set(violate);
        assert!(matches!(r.ctl.fill(), Err(ControlError::Unsafe(_))));
        assert_eq!(r.ctl.state(), ApplianceState::Empty);
        assert!(r.board.actions().is_empty());
    }
}

#[test]
fn forced_cleaning_bypasses_the_gate() {
    let r = rig(1);
    r.board.set(|c| c.gas_ppm = 5000.0);

    assert!(r.ctl.clean_normal(true).is_ok());
    assert_eq!(r.ctl.state(), ApplianceState::Ready);
    assert!(r.ctl.clean_complete(true).is_ok());
    assert_eq!(r.ctl.state(), ApplianceState::Empty);
    assert_eq!(r.board.actions(), vec!["normal_cleaning", "complete_cleaning"]);
}

#[test]
fn forced_cleaning_bypasses_state_guard() {
    let r = rig(0);
    assert!(r.ctl.clean_normal(true).is_ok());
    assert_eq!(r.ctl.state(), ApplianceState::Empty);
}

// ── State invariants ──────────────────────────────────────────

#[test]
fn wrong_state_is_refused_with_both_states_named() {
    let r = rig(1);
    let err = r.ctl.fill().unwrap_err();
    assert_eq!(
        err,
        ControlError::WrongState {
            current: ApplianceState::Ready,
            required: ApplianceState::Empty,
        }
    );
    assert_eq!(err.to_string(), "litterbox is READY, operation requires EMPTY");

    let r = rig(0);
    assert!(matches!(r.ctl.clean_normal(false), Err(ControlError::WrongState { .. })));
    assert!(matches!(r.ctl.clean_complete(false), Err(ControlError::WrongState { .. })));
    assert!(r.board.actions().is_empty());
}

#[test]
fn full_cycle_transitions() {
    let r = rig(0);
    r.ctl.fill().unwrap();
    assert_eq!(r.ctl.state(), ApplianceState::Ready);
    r.ctl.clean_normal(false).unwrap();
    assert_eq!(r.ctl.state(), ApplianceState::Ready);
    r.ctl.clean_complete(false).unwrap();
    assert_eq!(r.ctl.state(), ApplianceState::Empty);

    let stats = r.ctl.status().stats;
    assert_eq!(stats.fill_operations, 1);
    assert_eq!(stats.normal_cleanings, 1);
    assert_eq!(stats.complete_cleanings, 1);
    assert_eq!(stats.safety_blocks, 0);
}

#[test]
fn device_rejection_leaves_state_unchanged() {
    let r = rig(0);
    r.board.reject.lock().unwrap().insert("fill_litter".into());
    let err = r.ctl.fill().unwrap_err();
    assert!(matches!(err, ControlError::Rejected(ref m) if m.contains("refused")));
    assert_eq!(r.ctl.state(), ApplianceState::Empty);
    assert_eq!(r.ctl.status().stats.fill_operations, 0);
}

#[test]
fn link_failure_during_operation_leaves_state_unchanged() {
    let r = rig(1);
    r.board.link_down.store(true, std::sync::atomic::Ordering::SeqCst);
    // The safety probes fail first, so the refusal is "unsafe".
    assert!(matches!(r.ctl.clean_complete(false), Err(ControlError::Unsafe(_))));
    // Forced: no probes, the command itself fails.
    assert!(matches!(r.ctl.clean_complete(true), Err(ControlError::Link(_))));
    assert_eq!(r.ctl.state(), ApplianceState::Ready);
}

// ── Emergency stop ────────────────────────────────────────────

#[test]
fn emergency_stop_blocks_and_notifies_board() {
    let r = rig(1);
    r.ctl.emergency_stop().unwrap();
    let s = r.ctl.status();
    assert_eq!(s.state, ApplianceState::Blocked);
    assert!(s.motor_blocked);
    assert_eq!(r.board.count_kind("EMERGENCY_STOP"), 1);
    assert!(r.events.contains(&AppEvent::EmergencyStop { delivered: true }));
    // Not a safety block.
    assert_eq!(s.stats.safety_blocks, 0);
}

#[test]
fn emergency_stop_with_dead_link_still_blocks_locally() {
    let r = rig(1);
    r.board.link_down.store(true, std::sync::atomic::Ordering::SeqCst);

    let err = r.ctl.handle_command(ApplianceCommand::EmergencyStop).unwrap_err();
    assert!(matches!(err, ControlError::Link(_)));
    assert_eq!(r.ctl.state(), ApplianceState::Blocked);
    assert_eq!(r.board.count_kind("EMERGENCY_STOP"), 3);
    assert!(r.events.contains(&AppEvent::EmergencyStop { delivered: false }));

    // Nothing proceeds while blocked.
    assert!(r.ctl.fill().is_err());
    assert!(r.ctl.clean_normal(false).is_err());
}

#[test]
fn monitor_lifts_emergency_stop_once_safe() {
    let r = rig(1);
    r.ctl.emergency_stop().unwrap();
    r.ctl.monitor_tick();
    assert_eq!(r.ctl.state(), ApplianceState::Ready);
    assert_eq!(r.board.actions(), vec!["unblock"]);
}

fn wait_until(cond: impl Fn() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !cond() {
        assert!(Instant::now() < deadline, "condition never became true");
        thread::sleep(Duration::from_millis(2));
    }
}

#[test]
fn emergency_stop_does_not_wait_for_a_running_clean() {
    let r = rig(1);
    r.board.set_motor_time(Duration::from_millis(1500));

    thread::scope(|s| {
        let clean = s.spawn(|| r.ctl.clean_normal(false));
        wait_until(|| r.board.actions().len() == 1);

        let t = Instant::now();
        r.ctl.emergency_stop().unwrap();
        let status = r.ctl.status();
        assert!(t.elapsed() < Duration::from_millis(100), "blocked after {:?}", t.elapsed());
        assert_eq!(status.state, ApplianceState::Blocked);
        assert!(status.motor_blocked);

        assert_eq!(clean.join().unwrap(), Err(ControlError::Preempted));
    });

    // The finished clean did not undo the stop.
    let s = r.ctl.status();
    assert_eq!(s.state, ApplianceState::Blocked);
    assert_eq!(s.stats.normal_cleanings, 0);
    assert_eq!(r.board.count_kind("EMERGENCY_STOP"), 1);
}

#[test]
fn emergency_stop_during_unblock_keeps_the_block() {
    let r = rig(1);
    r.ctl.emergency_stop().unwrap();
    r.board.set_motor_time(Duration::from_millis(500));

    thread::scope(|s| {
        let monitor = s.spawn(|| r.ctl.monitor_tick());
        wait_until(|| r.board.actions() == ["unblock"]);
        r.ctl.emergency_stop().unwrap();
        assert_eq!(r.ctl.state(), ApplianceState::Blocked);
        monitor.join().unwrap();
    });

    assert_eq!(r.ctl.state(), ApplianceState::Blocked);
    assert!(r.ctl.status().motor_blocked);
    assert_eq!(r.board.actions(), vec!["unblock", "block"]);
}

#[test]
fn monitor_waits_for_the_operation_in_flight() {
    let r = rig(0);
    r.board.set_motor_time(Duration::from_millis(300));

    thread::scope(|s| {
        let fill = s.spawn(|| r.ctl.fill());
        wait_until(|| r.board.actions().len() == 1);

        // Status queries stay responsive while the motor runs.
        let t = Instant::now();
        assert_eq!(r.ctl.state(), ApplianceState::Empty);
        assert!(t.elapsed() < Duration::from_millis(100));

        r.board.set(|c| c.gas_ppm = 3000.0);
        r.ctl.monitor_tick();
        assert!(fill.join().unwrap().is_ok());
    });

    // The fill completed before the monitor blocked.
    assert_eq!(r.ctl.state(), ApplianceState::Blocked);
    assert_eq!(r.board.actions(), vec!["fill_litter", "block"]);
    assert_eq!(r.ctl.status().stats.fill_operations, 1);
    assert!(r.events.contains(&AppEvent::StateChanged {
        from: ApplianceState::Ready,
        to: ApplianceState::Blocked,
    }));
}

// ── Auto-cleaning ─────────────────────────────────────────────

#[test]
fn auto_clean_runs_when_interval_elapses() {
    let r = rig(1);
    r.ctl.monitor_tick(); // arms the timer
    r.clock.advance(chrono::Duration::hours(4));
    r.ctl.monitor_tick();
    assert!(r.board.actions().is_empty());

    r.clock.advance(chrono::Duration::hours(1));
    r.ctl.monitor_tick();
    assert_eq!(r.board.actions(), vec!["normal_cleaning"]);
    assert_eq!(r.ctl.status().stats.normal_cleanings, 1);
    assert_eq!(r.ctl.status().last_auto_clean, Some(r.clock_now()));
    assert!(r.events.contains(&AppEvent::AutoCleanRan));

    // Timer restarted by the cleaning.
    r.ctl.monitor_tick();
    assert_eq!(r.board.actions().len(), 1);
}

#[test]
fn auto_clean_waits_for_the_cat_to_leave() {
    let r = rig(1);
    r.ctl.set_cleaning_interval(2).unwrap();
    r.ctl.monitor_tick();
    r.clock.advance(chrono::Duration::hours(3));
    r.board.set(|c| c.presence_cm = Some(10.0));
    r.ctl.monitor_tick();
    // Cat present: blocked, no cleaning.
    assert_eq!(r.board.actions(), vec!["block"]);

    r.board.set(|c| c.presence_cm = Some(150.0));
    r.ctl.monitor_tick();
    assert_eq!(r.board.actions(), vec!["block", "unblock", "normal_cleaning"]);
}

#[test]
fn auto_clean_disabled_never_runs() {
    let r = rig(1);
    r.ctl.handle_command(ApplianceCommand::SetAutoCleaning(false)).unwrap();
    r.ctl.monitor_tick();
    r.clock.advance(chrono::Duration::hours(24));
    r.ctl.monitor_tick();
    assert!(r.board.actions().is_empty());
}

#[test]
fn invalid_interval_changes_nothing() {
    let r = rig(1);
    for hours in [0, 1, 3, 4, 6, 7, 9, 24] {
        assert_eq!(
            r.ctl.handle_command(ApplianceCommand::SetCleaningInterval(hours)),
            Err(ControlError::InvalidInterval(hours))
        );
    }
    assert_eq!(r.ctl.status().cleaning_interval_hours, 5);
}

// ── State sync ────────────────────────────────────────────────

#[test]
fn periodic_sync_prefers_the_board() {
    let config = LitterboxConfig {
        sync_every_ticks: 2,
        ..test_config()
    };
    let r = rig_with(0, config);
    r.board.set_device_state(1);

    r.ctl.monitor_tick();
    assert_eq!(r.ctl.state(), ApplianceState::Empty);
    r.ctl.monitor_tick();
    assert_eq!(r.ctl.state(), ApplianceState::Ready);
    assert!(r.events.contains(&AppEvent::StateResynced {
        local: ApplianceState::Empty,
        device: ApplianceState::Ready,
    }));
}

#[test]
fn sync_never_adopts_blocked() {
    let r = rig(1);
    r.board.set_device_state(-1);
    assert_eq!(r.ctl.sync_with_device().unwrap(), ApplianceState::Ready);
}

#[test]
fn sync_does_not_lift_a_safety_block() {
    let r = rig(1);
    r.board.set(|c| c.gas_ppm = 3000.0);
    r.ctl.monitor_tick();
    assert_eq!(r.ctl.sync_with_device().unwrap(), ApplianceState::Blocked);
}

#[test]
fn monitor_survives_a_dead_link() {
    let r = rig(1);
    r.board.link_down.store(true, std::sync::atomic::Ordering::SeqCst);
    for _ in 0..3 {
        r.ctl.monitor_tick();
    }
    // Unreadable sensors count as unsafe.
    assert_eq!(r.ctl.state(), ApplianceState::Blocked);
    assert_eq!(r.ctl.status().stats.safety_blocks, 1);

    r.board.link_down.store(false, std::sync::atomic::Ordering::SeqCst);
    r.ctl.monitor_tick();
    assert_eq!(r.ctl.state(), ApplianceState::Ready);
}

impl Rig {
    fn clock_now(&self) -> chrono::DateTime<chrono::Utc> {
        use cathub::app::ports::Clock;
        self.clock.now()
    }
}
