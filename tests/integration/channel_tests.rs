//! Integration tests for CommandChannel → SerialLink → simulated board.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use cathub::app::ports::CommandPort;
use cathub::error::{ChannelError, LinkError};
use cathub::protocol::{ChannelConfig, Command, CommandChannel};

use crate::mock_hw::{SimBoard, fast_channel_config, sim_channel};

const WAIT: Duration = Duration::from_secs(2);

fn echo(id: &str) -> Command {
    Command::new("ECHO").with("id", id)
}

// ── Serialisation under concurrency ──────────────────────────

#[test]
fn concurrent_callers_each_get_their_own_reply() {
    let board = SimBoard::echo();
    let channel = Arc::new(sim_channel(&board));
    channel.connect().unwrap();

    let handles: Vec<_> = (0..6)
        .map(|t| {
            let ch = Arc::clone(&channel);
            thread::spawn(move || {
                for i in 0..15 {
                    let id = format!("{t}-{i}");
                    let reply = ch.send_and_wait(&echo(&id), WAIT).unwrap();
                    assert_eq!(reply.str_field("echo"), Some(id.as_str()));
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    let stats = channel.stats();
    // 90 echoes plus the handshake PING.
    assert_eq!(stats.commands_sent, 91);
    assert_eq!(stats.responses_received, 90);
    assert_eq!(stats.timeouts, 0);
    assert_eq!(board.written().len(), 91);
}

#[test]
fn channel_is_usable_through_the_port_trait() {
    let board = SimBoard::echo();
    let port: Arc<dyn CommandPort> = Arc::new(sim_channel(&board));
    let reply = port.send_and_wait(&echo("via-port"), WAIT).unwrap();
    assert!(reply.is_success());
    port.send_fire_and_forget(&Command::emergency_stop()).unwrap();
    assert!(board.written().last().unwrap().contains("EMERGENCY_STOP"));
}

// ── Noise and framing ─────────────────────────────────────────

#[test]
fn boot_noise_and_debug_objects_are_skipped() {
    let board = SimBoard::echo();
    let channel = sim_channel(&board);
    channel.connect().unwrap();

    board.inject("Arduino CatHub v2 booting...\n{\"debug\":\"stepper 400\"}\n\n");
    let reply = channel.send_and_wait(&echo("after-noise"), WAIT).unwrap();
    assert_eq!(reply.str_field("echo"), Some("after-noise"));
    assert_eq!(channel.stats().timeouts, 0);
}

#[test]
fn silence_times_out_without_dropping_the_link() {
    let board = SimBoard::new(Box::new(|cmd| {
        if cmd["type"] == "PING" {
            vec!["pong".into()]
        } else {
            Vec::new()
        }
    }));
    let channel = sim_channel(&board);
    channel.connect().unwrap();

    let err = channel
        .send_and_wait(&Command::request_sensor("feeder_weight"), Duration::from_millis(30))
        .unwrap_err();
    assert!(matches!(err, ChannelError::Timeout { ref kind, .. } if kind == "REQUEST_SENSOR_DATA"));
    assert!(channel.is_connected());
    assert_eq!(channel.stats().timeouts, 1);
    assert_eq!(board.opens(), 1);
}

// ── Reconnection ──────────────────────────────────────────────

#[test]
fn first_command_connects_and_handshakes() {
    let board = SimBoard::echo();
    let channel = sim_channel(&board);
    assert!(!channel.is_connected());

    channel.send_and_wait(&echo("first"), WAIT).unwrap();
    let written = board.written();
    assert!(written[0].contains("PING"));
    assert!(written[1].contains("first"));
    assert!(channel.status().last_connection_attempt.is_some());
}

#[test]
fn write_failure_reconnects_and_retries_once() {
    let board = SimBoard::echo();
    let channel = sim_channel(&board);
    channel.connect().unwrap();

    board.0.lock().unwrap().fail_writes = 1;
    let reply = channel.send_and_wait(&echo("retry"), WAIT).unwrap();
    assert_eq!(reply.str_field("echo"), Some("retry"));
    assert_eq!(board.opens(), 2);
    assert!(channel.stats().errors >= 1);
}

#[test]
fn reconnect_is_rate_limited() {
    let board = SimBoard::echo();
    let config = ChannelConfig {
        reconnect_interval: Duration::from_secs(60),
        ..fast_channel_config()
    };
    let channel = CommandChannel::new(board.connector(), config);
    board.0.lock().unwrap().refuse_open = true;

    assert!(channel.connect().is_err());
    // Inside the window: no new open attempt, immediate NotConnected.
    board.0.lock().unwrap().refuse_open = false;
    let err = channel.send_fire_and_forget(&echo("x")).unwrap_err();
    assert_eq!(err, ChannelError::Link(LinkError::NotConnected));
    assert_eq!(board.opens(), 0);

    // An explicit connect ignores the window.
    channel.connect().unwrap();
    assert_eq!(board.opens(), 1);
}

#[test]
fn status_report_reflects_traffic() {
    let board = SimBoard::echo();
    let channel = sim_channel(&board);
    channel.connect().unwrap();
    channel.send_and_wait(&echo("s"), WAIT).unwrap();

    let status = channel.status();
    assert!(status.connected);
    assert_eq!(status.port, "sim0@9600");
    assert_eq!(status.stats.responses_received, 1);
    assert!(status.last_communication.is_some());

    channel.disconnect();
    assert!(!channel.status().connected);
}
