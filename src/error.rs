//! Unified error types for the CatHub coordinator.
//!
//! Every subsystem has its own small error enum with a hand-written
//! `Display`, and every one of them converts into the top-level [`Error`]
//! so the binary's startup path can funnel failures through one type.
//!
//! ```text
//!   LinkError ──▶ ChannelError ──▶ ControlError ──┐
//!   ProtocolError ────────────────────────────────┤
//!   StorageError · SinkError · ValidationError ───┼──▶ Error
//!   ConfigError ──────────────────────────────────┘
//! ```

use core::fmt;

use crate::fsm::ApplianceState;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Every fallible operation in the coordinator funnels into this type.
#[derive(Debug)]
pub enum Error {
    Link(LinkError),
    Channel(ChannelError),
    Protocol(ProtocolError),
    Control(ControlError),
    Storage(StorageError),
    Sink(SinkError),
    Validation(ValidationError),
    Config(ConfigError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Link(e) => write!(f, "link: {e}"),
            Self::Channel(e) => write!(f, "channel: {e}"),
            Self::Protocol(e) => write!(f, "protocol: {e}"),
            Self::Control(e) => write!(f, "control: {e}"),
            Self::Storage(e) => write!(f, "storage: {e}"),
            Self::Sink(e) => write!(f, "sink: {e}"),
            Self::Validation(e) => write!(f, "validation: {e}"),
            Self::Config(e) => write!(f, "config: {e}"),
        }
    }
}

impl std::error::Error for Error {}

macro_rules! impl_from {
    ($($variant:ident($ty:ty)),* $(,)?) => {
        $(
            impl From<$ty> for Error {
                fn from(e: $ty) -> Self {
                    Self::$variant(e)
                }
            }
        )*
    };
}

impl_from!(
    Link(LinkError),
    Channel(ChannelError),
    Protocol(ProtocolError),
    Control(ControlError),
    Storage(StorageError),
    Sink(SinkError),
    Validation(ValidationError),
    Config(ConfigError),
);

// ---------------------------------------------------------------------------
// Transport errors
// ---------------------------------------------------------------------------

/// Physical link failures. Recoverable by reconnecting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkError {
    /// No transport is open.
    NotConnected,
    /// The port could not be opened.
    Open(String),
    /// Writing to the port failed.
    Write(String),
    /// Reading from the port failed.
    Read(String),
}

impl fmt::Display for LinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotConnected => write!(f, "link not connected"),
            Self::Open(msg) => write!(f, "open failed: {msg}"),
            Self::Write(msg) => write!(f, "write failed: {msg}"),
            Self::Read(msg) => write!(f, "read failed: {msg}"),
        }
    }
}

impl std::error::Error for LinkError {}

/// Failures of a single command/response exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelError {
    /// The transport failed (and reconnection did not help).
    Link(LinkError),
    /// No parseable response arrived before the deadline.
    Timeout { kind: String, waited_ms: u64 },
    /// The command could not be serialised.
    Encode(String),
}

impl fmt::Display for ChannelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Link(e) => write!(f, "{e}"),
            Self::Timeout { kind, waited_ms } => {
                write!(f, "no response to {kind} within {waited_ms} ms")
            }
            Self::Encode(msg) => write!(f, "encode failed: {msg}"),
        }
    }
}

impl std::error::Error for ChannelError {}

impl From<LinkError> for ChannelError {
    fn from(e: LinkError) -> Self {
        Self::Link(e)
    }
}

// ---------------------------------------------------------------------------
// Protocol errors
// ---------------------------------------------------------------------------

/// A response arrived but could not be turned into a reading.
#[derive(Debug, Clone, PartialEq)]
pub enum ProtocolError {
    /// Not a JSON object.
    Malformed,
    /// A required field is absent or has the wrong type.
    MissingField(&'static str),
    /// A shared request was answered for a different sensor.
    WrongSensor { expected: String, got: String },
    /// The microcontroller reported a sensor-level error.
    DeviceStatus(String),
    /// The value is outside the sensor's physical range.
    OutOfRange { field: &'static str, value: f64 },
    /// The value is not a finite number.
    NotANumber(&'static str),
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Malformed => write!(f, "malformed response"),
            Self::MissingField(name) => write!(f, "missing field '{name}'"),
            Self::WrongSensor { expected, got } => {
                write!(f, "expected sensor '{expected}', got '{got}'")
            }
            Self::DeviceStatus(msg) => write!(f, "device reported: {msg}"),
            Self::OutOfRange { field, value } => write!(f, "{field}={value} out of range"),
            Self::NotANumber(name) => write!(f, "field '{name}' is not a finite number"),
        }
    }
}

impl std::error::Error for ProtocolError {}

// ---------------------------------------------------------------------------
// Control errors
// ---------------------------------------------------------------------------

/// Structured refusal from the appliance controller.
///
/// Always carries enough detail to build a human-readable reason.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlError {
    /// The operation needs a different current state.
    WrongState {
        current: ApplianceState,
        required: ApplianceState,
    },
    /// The safety gate said no. Carries the gate's reason.
    Unsafe(String),
    /// The command never got a usable answer.
    Link(ChannelError),
    /// The microcontroller answered with a non-success status.
    Rejected(String),
    /// Cleaning interval outside the allowed set.
    InvalidInterval(u8),
    /// A block was asserted while the command was in flight; the
    /// transition was not applied.
    Preempted,
}

impl fmt::Display for ControlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WrongState { current, required } => write!(
                f,
                "litterbox is {current}, operation requires {required}"
            ),
            Self::Unsafe(reason) => write!(f, "unsafe: {reason}"),
            Self::Link(e) => write!(f, "communication failed: {e}"),
            Self::Rejected(msg) => write!(f, "device rejected command: {msg}"),
            Self::InvalidInterval(h) => {
                write!(f, "invalid cleaning interval {h}h (allowed: 2, 5, 8)")
            }
            Self::Preempted => f.write_str("motor blocked while the command was running"),
        }
    }
}

impl std::error::Error for ControlError {}

impl From<ChannelError> for ControlError {
    fn from(e: ChannelError) -> Self {
        Self::Link(e)
    }
}

// ---------------------------------------------------------------------------
// Persistence errors
// ---------------------------------------------------------------------------

/// Errors from the local durable store.
#[derive(Debug)]
pub enum StorageError {
    Io(std::io::Error),
    Encode(String),
    Decode(String),
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::Encode(msg) => write!(f, "encode error: {msg}"),
            Self::Decode(msg) => write!(f, "decode error: {msg}"),
        }
    }
}

impl std::error::Error for StorageError {}

impl From<std::io::Error> for StorageError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

/// Errors from the remote telemetry sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkError {
    /// The sink could not be reached at all.
    Unreachable(String),
    /// The sink answered but refused the document.
    Rejected(String),
}

impl fmt::Display for SinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unreachable(msg) => write!(f, "unreachable: {msg}"),
            Self::Rejected(msg) => write!(f, "rejected: {msg}"),
        }
    }
}

impl std::error::Error for SinkError {}

/// A telemetry document failed boundary validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// A required field is missing.
    MissingField(&'static str),
    /// A field is present but unusable.
    InvalidField { field: &'static str, reason: String },
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingField(name) => write!(f, "missing required field '{name}'"),
            Self::InvalidField { field, reason } => write!(f, "invalid '{field}': {reason}"),
        }
    }
}

impl std::error::Error for ValidationError {}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum ConfigError {
    /// Reading the file failed.
    Io(std::io::Error),
    /// The file is not valid TOML for [`SystemConfig`](crate::config::SystemConfig).
    Parse(String),
    /// A field failed range validation. Describes which field and why.
    ValidationFailed(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::Parse(msg) => write!(f, "parse error: {msg}"),
            Self::ValidationFailed(msg) => write!(f, "validation failed: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Crate-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
