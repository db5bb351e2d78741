//! USB/UART serial transport.
//!
//! Opens the port 8N1 without flow control and asserts DTR (CDC boards
//! wait for it).  The OS read timeout is short; a read that times out
//! returns 0 bytes and the response loop polls again.

use std::io::{self, Read, Write};
use std::time::Duration;

use log::{debug, info};
use serialport::{ClearBuffer, DataBits, FlowControl, Parity, SerialPort, StopBits};

use crate::config::SerialConfig;
use crate::protocol::transport::{Connector, Transport};

/// Opens the configured serial device on demand.
pub struct SerialConnector {
    port: String,
    baud_rate: u32,
    read_timeout: Duration,
}

impl SerialConnector {
    pub fn new(port: impl Into<String>, baud_rate: u32, read_timeout: Duration) -> Self {
        Self {
            port: port.into(),
            baud_rate,
            read_timeout,
        }
    }

    pub fn from_config(cfg: &SerialConfig) -> Self {
        Self::new(cfg.port.clone(), cfg.baud_rate, Duration::from_millis(cfg.read_timeout_ms))
    }
}

impl Connector for SerialConnector {
    fn connect(&mut self) -> io::Result<Box<dyn Transport>> {
        let mut port = serialport::new(&self.port, self.baud_rate)
            .timeout(self.read_timeout)
            .data_bits(DataBits::Eight)
            .stop_bits(StopBits::One)
            .parity(Parity::None)
            .flow_control(FlowControl::None)
            .open()
            .map_err(io::Error::from)?;
        if let Err(e) = port.write_data_terminal_ready(true) {
            debug!("DTR not supported on {}: {e}", self.port);
        }
        info!("Opened serial port {}", self.describe());
        Ok(Box::new(SerialTransport { port }))
    }

    fn describe(&self) -> String {
        format!("{}@{}", self.port, self.baud_rate)
    }
}

/// An open serial port.
pub struct SerialTransport {
    port: Box<dyn SerialPort>,
}

impl Transport for SerialTransport {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.port.read(buf) {
            Err(e) if e.kind() == io::ErrorKind::TimedOut => Ok(0),
            other => other,
        }
    }

    fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        Write::write_all(&mut self.port, data)
    }

    fn flush(&mut self) -> io::Result<()> {
        Write::flush(&mut self.port)
    }

    fn clear_input(&mut self) -> io::Result<()> {
        self.port.clear(ClearBuffer::Input).map_err(io::Error::from)
    }
}
