//! Command channel: serialised request/response over a [`SerialLink`].
//!
//! ```text
//!   caller A ─┐                       ┌──────────────────────────┐
//!   caller B ─┼──▶ Mutex<ChannelInner>│ write ─▶ read…read ─▶ Response
//!   monitor  ─┘    (one cycle at once)│ reconnect (rate-limited) │
//!                                     └──────────────────────────┘
//! ```
//!
//! The lock covers the full send-then-read cycle, so no caller's write can
//! land between another caller's write and its reply.  The protocol has no
//! request id: the next parseable line after a write is taken as the reply.
//! A late reply to a timed-out command may therefore be read as the reply
//! to the next one.
//!
//! Counters are plain atomics readable without the lock.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::Serialize;

use super::link::SerialLink;
use super::message::{Command, Response};
use super::transport::Connector;
use crate::app::ports::CommandPort;
use crate::config::SerialConfig;
use crate::error::{ChannelError, LinkError};

// ───────────────────────────────────────────────────────────────
// Configuration
// ───────────────────────────────────────────────────────────────

/// Timing knobs for the channel.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Minimum spacing between reconnection attempts.
    pub reconnect_interval: Duration,
    /// Sleep between empty reads while waiting for a reply.
    pub poll_interval: Duration,
    /// Wait after opening the port before talking to the board.
    pub settle: Duration,
    /// Reads attempted while waiting for the PING reply.
    pub ping_attempts: u32,
    pub ping_delay: Duration,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self::from_serial(&SerialConfig::default())
    }
}

impl ChannelConfig {
    pub fn from_serial(cfg: &SerialConfig) -> Self {
        Self {
            reconnect_interval: cfg.reconnect_interval(),
            poll_interval: cfg.poll_interval(),
            settle: Duration::from_millis(cfg.settle_ms),
            ping_attempts: cfg.ping_attempts.max(1),
            ping_delay: Duration::from_millis(cfg.ping_delay_ms),
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Observability
// ───────────────────────────────────────────────────────────────

#[derive(Default)]
struct LinkCounters {
    sent: AtomicU64,
    received: AtomicU64,
    timeouts: AtomicU64,
    errors: AtomicU64,
}

impl LinkCounters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Snapshot of the channel counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LinkStats {
    pub commands_sent: u64,
    pub responses_received: u64,
    pub timeouts: u64,
    pub errors: u64,
}

/// Full status report of the link.
#[derive(Debug, Clone, Serialize)]
pub struct LinkStatus {
    pub connected: bool,
    pub port: String,
    pub stats: LinkStats,
    pub last_communication: Option<DateTime<Utc>>,
    pub last_connection_attempt: Option<DateTime<Utc>>,
}

// ───────────────────────────────────────────────────────────────
// CommandChannel
// ───────────────────────────────────────────────────────────────

struct ChannelInner {
    link: SerialLink,
    last_attempt: Option<Instant>,
    last_attempt_at: Option<DateTime<Utc>>,
    last_communication: Option<DateTime<Utc>>,
}

/// Owner of the serial connection.  Construct once per process and share
/// by `Arc`.
pub struct CommandChannel {
    inner: Mutex<ChannelInner>,
    counters: LinkCounters,
    config: ChannelConfig,
}

impl CommandChannel {
    pub fn new(connector: Box<dyn Connector>, config: ChannelConfig) -> Self {
        Self {
            inner: Mutex::new(ChannelInner {
                link: SerialLink::new(connector),
                last_attempt: None,
                last_attempt_at: None,
                last_communication: None,
            }),
            counters: LinkCounters::default(),
            config,
        }
    }

    // ── Lifecycle ─────────────────────────────────────────────

    /// Open the link and verify the board answers.  Ignores the rate limit.
    pub fn connect(&self) -> Result<(), LinkError> {
        let mut inner = self.lock();
        if inner.link.is_open() {
            return Ok(());
        }
        self.open_and_handshake(&mut inner)
    }

    pub fn disconnect(&self) {
        self.lock().link.close();
    }

    pub fn is_connected(&self) -> bool {
        self.lock().link.is_open()
    }

    // ── Commands ──────────────────────────────────────────────

    /// Send `command` and return the next parseable response.
    ///
    /// Non-protocol lines are discarded without extending the deadline.
    /// A timeout leaves the link open.
    pub fn send_and_wait(&self, command: &Command, timeout: Duration) -> Result<Response, ChannelError> {
        let mut inner = self.lock();
        self.transmit(&mut inner, command)?;

        let deadline = Instant::now() + timeout;
        loop {
            match inner.link.read_line() {
                Ok(Some(line)) => {
                    if let Some(response) = Response::parse(&line) {
                        LinkCounters::bump(&self.counters.received);
                        inner.last_communication = Some(Utc::now());
                        return Ok(response);
                    }
                    debug!("Discarding non-protocol line: {line}");
                }
                Ok(None) => {
                    let now = Instant::now();
                    if now >= deadline {
                        break;
                    }
                    thread::sleep(self.config.poll_interval.min(deadline - now));
                }
                Err(e) => {
                    LinkCounters::bump(&self.counters.errors);
                    return Err(e.into());
                }
            }
            if Instant::now() >= deadline {
                break;
            }
        }

        LinkCounters::bump(&self.counters.timeouts);
        warn!("Timeout waiting for reply to {command}");
        Err(ChannelError::Timeout {
            kind: command.kind().to_string(),
            waited_ms: timeout.as_millis() as u64,
        })
    }

    /// Send `command` without reading a reply.
    pub fn send_fire_and_forget(&self, command: &Command) -> Result<(), ChannelError> {
        let mut inner = self.lock();
        self.transmit(&mut inner, command)
    }

    // ── Queries ───────────────────────────────────────────────

    pub fn stats(&self) -> LinkStats {
        LinkStats {
            commands_sent: self.counters.sent.load(Ordering::Relaxed),
            responses_received: self.counters.received.load(Ordering::Relaxed),
            timeouts: self.counters.timeouts.load(Ordering::Relaxed),
            errors: self.counters.errors.load(Ordering::Relaxed),
        }
    }

    pub fn status(&self) -> LinkStatus {
        let inner = self.lock();
        LinkStatus {
            connected: inner.link.is_open(),
            port: inner.link.describe(),
            stats: self.stats(),
            last_communication: inner.last_communication,
            last_connection_attempt: inner.last_attempt_at,
        }
    }

    // ── Internal ──────────────────────────────────────────────

    fn lock(&self) -> MutexGuard<'_, ChannelInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Write one command, reconnecting first if the link is down and once
    /// more if the write itself fails.
    fn transmit(&self, inner: &mut ChannelInner, command: &Command) -> Result<(), ChannelError> {
        let payload = command
            .encode()
            .map_err(|e| ChannelError::Encode(e.to_string()))?;

        if !inner.link.is_open() {
            self.reconnect(inner)?;
        }

        if let Err(e) = inner.link.send_line(&payload) {
            LinkCounters::bump(&self.counters.errors);
            warn!("Sending {command} failed ({e}), reconnecting");
            self.reconnect(inner)?;
            if let Err(e) = inner.link.send_line(&payload) {
                LinkCounters::bump(&self.counters.errors);
                return Err(e.into());
            }
        }
        LinkCounters::bump(&self.counters.sent);
        Ok(())
    }

    /// Rate-limited reconnect.
    fn reconnect(&self, inner: &mut ChannelInner) -> Result<(), LinkError> {
        if let Some(last) = inner.last_attempt {
            if last.elapsed() < self.config.reconnect_interval {
                debug!("Reconnect suppressed, last attempt {:?} ago", last.elapsed());
                return Err(LinkError::NotConnected);
            }
        }
        info!("Reconnecting to {}", inner.link.describe());
        self.open_and_handshake(inner)
    }

    fn open_and_handshake(&self, inner: &mut ChannelInner) -> Result<(), LinkError> {
        inner.last_attempt = Some(Instant::now());
        inner.last_attempt_at = Some(Utc::now());

        if let Err(e) = inner.link.open() {
            LinkCounters::bump(&self.counters.errors);
            warn!("Cannot open {}: {e}", inner.link.describe());
            return Err(e);
        }
        // Opening the port resets most boards.
        thread::sleep(self.config.settle);
        inner.link.clear_input()?;

        let ping = Command::ping()
            .encode()
            .map_err(|e| LinkError::Write(e.to_string()))?;
        inner.link.send_line(&ping)?;
        LinkCounters::bump(&self.counters.sent);

        for _ in 0..self.config.ping_attempts {
            if let Some(line) = inner.link.read_line()? {
                info!("Board answered PING: {line}");
                inner.last_communication = Some(Utc::now());
                return Ok(());
            }
            thread::sleep(self.config.ping_delay);
        }

        warn!("No reply to PING from {}", inner.link.describe());
        inner.link.close();
        Err(LinkError::Open("no reply to PING".into()))
    }
}

impl CommandPort for CommandChannel {
    fn send_and_wait(&self, command: &Command, timeout: Duration) -> Result<Response, ChannelError> {
        CommandChannel::send_and_wait(self, command, timeout)
    }

    fn send_fire_and_forget(&self, command: &Command) -> Result<(), ChannelError> {
        CommandChannel::send_fire_and_forget(self, command)
    }
}
