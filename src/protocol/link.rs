//! Serial link: owns the physical connection and the line framing.
//!
//! No protocol semantics live here.  The link knows how to open and close
//! the transport, write one framed line, and hand back decoded lines one at
//! a time.  Any I/O failure other than a read timeout closes the transport
//! so the owner can decide when to reconnect.

use std::collections::VecDeque;
use std::io;

use log::{debug, info, warn};

use super::codec::{LineDecoder, encode_line};
use super::transport::{Connector, Transport};
use crate::error::LinkError;

const READ_CHUNK: usize = 256;

pub struct SerialLink {
    connector: Box<dyn Connector>,
    transport: Option<Box<dyn Transport>>,
    decoder: LineDecoder,
    /// Complete lines decoded but not yet handed out.
    lines: VecDeque<String>,
}

impl SerialLink {
    pub fn new(connector: Box<dyn Connector>) -> Self {
        Self {
            connector,
            transport: None,
            decoder: LineDecoder::new(),
            lines: VecDeque::new(),
        }
    }

    pub fn describe(&self) -> String {
        self.connector.describe()
    }

    pub fn is_open(&self) -> bool {
        self.transport.is_some()
    }

    /// (Re)open the transport, dropping any previous one.
    pub fn open(&mut self) -> Result<(), LinkError> {
        self.close();
        match self.connector.connect() {
            Ok(transport) => {
                info!("Serial link open: {}", self.connector.describe());
                self.transport = Some(transport);
                Ok(())
            }
            Err(e) => Err(LinkError::Open(e.to_string())),
        }
    }

    pub fn close(&mut self) {
        if self.transport.take().is_some() {
            info!("Serial link closed: {}", self.connector.describe());
        }
        self.decoder.reset();
        self.lines.clear();
    }

    /// Drop buffered input on both sides of the decoder.
    pub fn clear_input(&mut self) -> Result<(), LinkError> {
        self.decoder.reset();
        self.lines.clear();
        let transport = self.transport.as_mut().ok_or(LinkError::NotConnected)?;
        if let Err(e) = transport.clear_input() {
            self.close();
            return Err(LinkError::Read(e.to_string()));
        }
        Ok(())
    }

    /// Write one framed line.  A write failure closes the link.
    pub fn send_line(&mut self, payload: &str) -> Result<(), LinkError> {
        let transport = self.transport.as_mut().ok_or(LinkError::NotConnected)?;
        let frame = encode_line(payload);
        let result = transport.write_all(&frame).and_then(|()| transport.flush());
        if let Err(e) = result {
            warn!("Serial write failed: {e}");
            self.close();
            return Err(LinkError::Write(e.to_string()));
        }
        debug!("TX {payload}");
        Ok(())
    }

    /// Return the next complete line, performing at most one transport read.
    ///
    /// `Ok(None)` means nothing complete arrived within the port's read
    /// timeout.  A hard read failure closes the link.
    pub fn read_line(&mut self) -> Result<Option<String>, LinkError> {
        if let Some(line) = self.lines.pop_front() {
            return Ok(Some(line));
        }
        let transport = self.transport.as_mut().ok_or(LinkError::NotConnected)?;

        let mut buf = [0u8; READ_CHUNK];
        let n = match transport.read(&mut buf) {
            Ok(n) => n,
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
                ) =>
            {
                0
            }
            Err(e) => {
                warn!("Serial read failed: {e}");
                self.close();
                return Err(LinkError::Read(e.to_string()));
            }
        };

        let lines = &mut self.lines;
        self.decoder.feed(&buf[..n], |line| {
            debug!("RX {line}");
            lines.push_back(line.to_string());
        });
        Ok(self.lines.pop_front())
    }
}
