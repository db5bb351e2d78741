//! Newline-delimited line codec.
//!
//! Wire format:
//! ```text
//! ┌──────────────────────────────┬────┐
//! │ UTF-8 JSON object (N B)      │ \n │
//! └──────────────────────────────┴────┘
//! ```
//!
//! The codec accumulates incoming bytes into a bounded buffer and yields
//! complete lines.  This handles partial reads gracefully: a single
//! `Transport::read` call may return part of a line, or several lines
//! concatenated.  A trailing `\r` is stripped (Arduino `println`).

use heapless::Vec;
use log::{debug, warn};

/// Maximum line length (protects against a runaway sender).
pub const MAX_LINE_LEN: usize = 1024;

/// Decoder state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecoderState {
    /// Collecting bytes of the current line.
    Collecting,
    /// The current line overflowed; drop bytes until the next newline.
    Discarding,
}

/// Streaming line decoder.
pub struct LineDecoder {
    state: DecoderState,
    buf: Vec<u8, MAX_LINE_LEN>,
}

impl LineDecoder {
    pub fn new() -> Self {
        Self {
            state: DecoderState::Collecting,
            buf: Vec::new(),
        }
    }

    /// Feed bytes into the decoder, calling `on_line` for every complete
    /// non-empty line.  Lines that are not valid UTF-8 are dropped.
    pub fn feed(&mut self, data: &[u8], mut on_line: impl FnMut(&str)) {
        for &byte in data {
            match (self.state, byte) {
                (DecoderState::Discarding, b'\n') => {
                    self.state = DecoderState::Collecting;
                }
                (DecoderState::Discarding, _) => {}
                (DecoderState::Collecting, b'\n') => {
                    let mut line: &[u8] = &self.buf;
                    if let [rest @ .., b'\r'] = line {
                        line = rest;
                    }
                    match core::str::from_utf8(line) {
                        Ok(s) if !s.trim().is_empty() => on_line(s),
                        Ok(_) => {}
                        Err(_) => debug!("Dropping non-UTF-8 line ({} bytes)", line.len()),
                    }
                    self.buf.clear();
                }
                (DecoderState::Collecting, _) => {
                    if self.buf.push(byte).is_err() {
                        warn!("Line exceeds {MAX_LINE_LEN} bytes, discarding");
                        self.buf.clear();
                        self.state = DecoderState::Discarding;
                    }
                }
            }
        }
    }

    /// Bytes of the incomplete line currently buffered.
    pub fn pending_len(&self) -> usize {
        self.buf.len()
    }

    /// Reset decoder state (e.g. after a transport reconnect).
    pub fn reset(&mut self) {
        self.buf.clear();
        self.state = DecoderState::Collecting;
    }
}

impl Default for LineDecoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Frame one encoded message for the wire.
pub fn encode_line(payload: &str) -> std::vec::Vec<u8> {
    let mut out = std::vec::Vec::with_capacity(payload.len() + 1);
    out.extend_from_slice(payload.as_bytes());
    out.push(b'\n');
    out
}
