//! Command and response envelopes.
//!
//! Outbound: `{"type": <kind>, ...parameters}` on one line.
//! Inbound: one JSON object per line.  An object counts as a protocol
//! message only if it carries at least one of `status`, `sensor`, `state`
//! or `error`; anything else (debug prints, boot banners) is noise.

use std::collections::BTreeMap;
use std::fmt;

use serde_json::{Map, Value};

/// Reserved command kinds.
pub mod kinds {
    /// Connectivity probe.  Any non-empty reply counts as alive.
    pub const PING: &str = "PING";
    /// Parameterised by `sensor`.
    pub const REQUEST_SENSOR_DATA: &str = "REQUEST_SENSOR_DATA";
    /// Parameterised by `action`.
    pub const LITTERBOX_COMMAND: &str = "LITTERBOX_COMMAND";
    pub const EMERGENCY_STOP: &str = "EMERGENCY_STOP";
}

/// Fields that mark a line as a protocol message.
const RECOGNIZED_FIELDS: [&str; 4] = ["status", "sensor", "state", "error"];

// ───────────────────────────────────────────────────────────────
// Command
// ───────────────────────────────────────────────────────────────

/// A command for the microcontroller.  Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    kind: String,
    parameters: BTreeMap<String, String>,
}

impl Command {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            parameters: BTreeMap::new(),
        }
    }

    /// Builder-style parameter.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    pub fn ping() -> Self {
        Self::new(kinds::PING)
    }

    pub fn request_sensor(sensor: &str) -> Self {
        Self::new(kinds::REQUEST_SENSOR_DATA).with("sensor", sensor)
    }

    pub fn litterbox(action: LitterboxAction) -> Self {
        Self::new(kinds::LITTERBOX_COMMAND).with("action", action.as_str())
    }

    pub fn emergency_stop() -> Self {
        Self::new(kinds::EMERGENCY_STOP)
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn param(&self, key: &str) -> Option<&str> {
        self.parameters.get(key).map(String::as_str)
    }

    /// Serialise to a single JSON object (no trailing newline).
    ///
    /// A parameter named `type` is ignored; the command kind always wins.
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        let mut obj = Map::new();
        for (k, v) in &self.parameters {
            obj.insert(k.clone(), Value::String(v.clone()));
        }
        obj.insert("type".into(), Value::String(self.kind.clone()));
        serde_json::to_string(&Value::Object(obj))
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.kind)?;
        for (k, v) in &self.parameters {
            write!(f, " {k}={v}")?;
        }
        Ok(())
    }
}

/// `action` values of `LITTERBOX_COMMAND`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LitterboxAction {
    FillLitter,
    NormalCleaning,
    CompleteCleaning,
    Block,
    Unblock,
}

impl LitterboxAction {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::FillLitter => "fill_litter",
            Self::NormalCleaning => "normal_cleaning",
            Self::CompleteCleaning => "complete_cleaning",
            Self::Block => "block",
            Self::Unblock => "unblock",
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Response
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseStatus {
    Success,
    Error,
}

/// A decoded reply line.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub status: ResponseStatus,
    pub fields: Map<String, Value>,
}

impl Response {
    /// Decode one line.  Returns `None` for non-JSON, non-object or
    /// unrecognised objects; the caller keeps reading.
    pub fn parse(line: &str) -> Option<Self> {
        let value: Value = serde_json::from_str(line.trim()).ok()?;
        let Value::Object(fields) = value else {
            return None;
        };
        if !RECOGNIZED_FIELDS.iter().any(|k| fields.contains_key(*k)) {
            return None;
        }
        let status = match fields.get("status").and_then(Value::as_str) {
            Some(s) if ["success", "ok", "ready"].iter().any(|ok| s.eq_ignore_ascii_case(ok)) => {
                ResponseStatus::Success
            }
            Some(_) => ResponseStatus::Error,
            None if fields.contains_key("error") => ResponseStatus::Error,
            None => ResponseStatus::Success,
        };
        Some(Self { status, fields })
    }

    pub fn is_success(&self) -> bool {
        self.status == ResponseStatus::Success
    }

    /// Human-readable failure detail, if the device sent one.
    pub fn error_message(&self) -> String {
        self.str_field("error")
            .or_else(|| self.str_field("message"))
            .or_else(|| self.str_field("status"))
            .unwrap_or("unspecified error")
            .to_string()
    }

    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }

    pub fn f64_field(&self, key: &str) -> Option<f64> {
        self.fields.get(key).and_then(Value::as_f64)
    }

    pub fn bool_field(&self, key: &str) -> Option<bool> {
        self.fields.get(key).and_then(Value::as_bool)
    }

    /// Sensor tag of a `REQUEST_SENSOR_DATA` reply.
    pub fn sensor(&self) -> Option<&str> {
        self.str_field("sensor")
    }

    /// Authoritative appliance state code (unblock / status sync).
    pub fn state_code(&self) -> Option<i64> {
        self.fields.get("state").and_then(Value::as_i64)
    }
}
