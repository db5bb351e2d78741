//! Transport abstraction over any byte-oriented channel to a microcontroller.
//!
//! Concrete implementations:
//! - USB/UART serial port ([`SerialConnector`](crate::adapters::serial::SerialConnector))
//! - Simulated boards in the integration tests
//!
//! [`SerialLink`](super::link::SerialLink) is written against these traits,
//! so swapping the physical medium requires zero changes to the protocol.

use std::io;

/// An open byte channel.
pub trait Transport: Send {
    /// Read up to `buf.len()` bytes into `buf`.
    /// Returns 0 if no data arrived within the port's own read timeout.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Write all of `data`.
    fn write_all(&mut self, data: &[u8]) -> io::Result<()>;

    /// Flush any buffered output.
    fn flush(&mut self) -> io::Result<()>;

    /// Discard whatever is sitting in the input buffer.
    fn clear_input(&mut self) -> io::Result<()>;
}

/// Opens transports.  Called once at startup and again on every reconnect.
pub trait Connector: Send {
    fn connect(&mut self) -> io::Result<Box<dyn Transport>>;

    /// Human-readable endpoint, e.g. `/dev/ttyACM0@9600`.
    fn describe(&self) -> String;
}
