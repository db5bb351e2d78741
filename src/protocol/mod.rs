//! Microcontroller protocol stack.
//!
//! ```text
//!  CommandChannel  (lock · correlation · reconnect · counters)
//!        │
//!  SerialLink      (open/close · framed send · line receive)
//!        │
//!  LineDecoder     (bytes → lines)
//!        │
//!  Transport       (serial port, simulated board)
//! ```
//!
//! Wire format: newline-delimited JSON objects in both directions.

pub mod channel;
pub mod codec;
pub mod link;
pub mod message;
pub mod transport;

pub use channel::{ChannelConfig, CommandChannel, LinkStats, LinkStatus};
pub use message::{Command, LitterboxAction, Response, ResponseStatus, kinds};
