//! CatHub coordinator entry point.
//!
//! Hexagonal architecture with supervised background workers.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │  SerialConnector   HttpSink        FileStore     SystemClock   │
//! │  (Connector)       (TelemetrySink) (LocalStore)  (Clock)       │
//! │  StaticConfigSource                LogEventSink                │
//! │  (ConfigSource)                    (EventSink)                 │
//! │                                                                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │  ┌────────────────────────────────────────────────────────┐    │
//! │  │  CommandChannel · LitterboxController · ResilientStore │    │
//! │  │  SensorPoller   · SafetyGate                           │    │
//! │  └────────────────────────────────────────────────────────┘    │
//! │                                                                │
//! │  Workers: monitor · poller · drain (PeriodicTask)              │
//! └────────────────────────────────────────────────────────────────┘
//! ```
#![deny(unused_must_use)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use log::{info, warn};

use cathub::adapters::config_source::StaticConfigSource;
use cathub::adapters::file_store::FileStore;
use cathub::adapters::http_sink::HttpSink;
use cathub::adapters::log_sink::LogEventSink;
use cathub::adapters::serial::SerialConnector;
use cathub::adapters::time::SystemClock;
use cathub::app::controller::LitterboxController;
use cathub::app::poller::SensorPoller;
use cathub::app::ports::{Clock, CommandPort, ConfigSource, EventSink, LocalStore, TelemetrySink};
use cathub::config::SystemConfig;
use cathub::protocol::{ChannelConfig, CommandChannel};
use cathub::sensors::build_drivers;
use cathub::supervisor::PeriodicTask;
use cathub::telemetry::{DeviceIdResolver, ResilientStore};

const CONFIG_ENV: &str = "CATHUB_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "cathub.toml";

fn main() -> Result<()> {
    // ── 1. Logging ────────────────────────────────────────────
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    info!("CatHub coordinator v{} starting", env!("CARGO_PKG_VERSION"));

    // ── 2. Configuration ──────────────────────────────────────
    let config_path =
        PathBuf::from(std::env::var(CONFIG_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.into()));
    let config = SystemConfig::load_or_default(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;

    // ── 3. Construct adapters ─────────────────────────────────
    let clock: Arc<dyn Clock> = Arc::new(SystemClock::new());
    let events: Arc<dyn EventSink> = Arc::new(LogEventSink::new());
    let config_source: Arc<dyn ConfigSource> = Arc::new(StaticConfigSource::from_config(&config));

    let channel = Arc::new(CommandChannel::new(
        Box::new(SerialConnector::from_config(&config.serial)),
        ChannelConfig::from_serial(&config.serial),
    ));
    if let Err(e) = channel.connect() {
        warn!("Board not reachable yet ({e}); commands will retry the connection");
    }
    let port: Arc<dyn CommandPort> = channel.clone();

    let local: Arc<dyn LocalStore> =
        Arc::new(FileStore::open(&config.telemetry.data_dir).context("opening local store")?);
    let remote: Arc<dyn TelemetrySink> =
        Arc::new(HttpSink::from_config(&config.telemetry).context("building remote sink")?);
    let store = Arc::new(ResilientStore::new(
        remote,
        local,
        DeviceIdResolver::new(Arc::clone(&config_source)),
    ));

    // ── 4. Construct app core ─────────────────────────────────
    let controller = Arc::new(LitterboxController::new(
        Arc::clone(&port),
        config.litterbox.clone(),
        events,
        Arc::clone(&clock),
    ));
    controller.load_settings(config_source.as_ref());
    controller.start();

    let poller = SensorPoller::new(
        port,
        Arc::clone(&store),
        clock,
        build_drivers(&config.sensors),
        Duration::from_millis(config.litterbox.sensor_timeout_ms),
    );
    info!("Polling {} sensors", poller.driver_count());

    // ── 5. Workers ────────────────────────────────────────────
    let monitor = {
        let controller = Arc::clone(&controller);
        PeriodicTask::spawn("monitor", config.litterbox.monitor_interval(), move || {
            controller.monitor_tick();
            Ok::<(), String>(())
        })?
    };

    let _poll_task = match poller.tick_interval() {
        Some(period) => Some(PeriodicTask::spawn("poller", period, move || {
            let report = poller.poll_round();
            if report.requests > 0 && report.recorded == 0 {
                return Err(format!("{} requests, no readings", report.requests));
            }
            Ok(())
        })?),
        None => {
            info!("No sensors configured, poller idle");
            None
        }
    };

    let drain_limit = config.telemetry.drain_batch_limit;
    let _drain_task = {
        let store = Arc::clone(&store);
        PeriodicTask::spawn(
            "drain",
            Duration::from_secs(config.telemetry.drain_interval_secs),
            move || {
                let pending = store.pending_count();
                if pending > 0 {
                    info!("{} readings pending, drained {}", pending, store.sync_offline(drain_limit));
                }
                Ok::<(), String>(())
            },
        )?
    };

    info!(
        "System ready on {} (link {})",
        config.serial.port,
        if channel.is_connected() { "up" } else { "down" }
    );

    // Workers run until the process is terminated.
    monitor.join();
    Ok(())
}
