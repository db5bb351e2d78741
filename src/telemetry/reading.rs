//! Telemetry documents.
//!
//! A [`Reading`] is immutable and append-only.  `identifier` + `timestamp`
//! is not a key: two sensors may report in the same instant, and a drain
//! interrupted before its local delete resends the same document.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ValidationError;

/// The five required fields of a telemetry document, in wire order.
pub const REQUIRED_FIELDS: [&str; 5] = ["sensor_name", "identifier", "value", "timestamp", "device_id"];

/// One sensor measurement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub sensor_name: String,
    pub identifier: String,
    pub value: f64,
    pub timestamp: DateTime<Utc>,
    pub device_id: i64,
}

impl Reading {
    pub fn new(
        sensor_name: impl Into<String>,
        identifier: impl Into<String>,
        value: f64,
        timestamp: DateTime<Utc>,
        device_id: i64,
    ) -> Self {
        Self {
            sensor_name: sensor_name.into(),
            identifier: identifier.into(),
            value,
            timestamp,
            device_id,
        }
    }

    /// Validate an untyped document at the store boundary.
    ///
    /// Every one of [`REQUIRED_FIELDS`] must be present and non-null.
    pub fn from_document(doc: &Value) -> Result<Self, ValidationError> {
        let obj = doc.as_object().ok_or(ValidationError::InvalidField {
            field: "document",
            reason: "not an object".into(),
        })?;
        for field in REQUIRED_FIELDS {
            if obj.get(field).is_none_or(Value::is_null) {
                return Err(ValidationError::MissingField(field));
            }
        }

        let text = |field: &'static str| -> Result<String, ValidationError> {
            match obj.get(field).and_then(Value::as_str) {
                Some(s) if !s.is_empty() => Ok(s.to_string()),
                _ => Err(ValidationError::InvalidField {
                    field,
                    reason: "expected a non-empty string".into(),
                }),
            }
        };

        let value = obj
            .get("value")
            .and_then(Value::as_f64)
            .filter(|v| v.is_finite())
            .ok_or_else(|| ValidationError::InvalidField {
                field: "value",
                reason: "expected a finite number".into(),
            })?;

        let timestamp = text("timestamp")?
            .parse::<DateTime<Utc>>()
            .map_err(|e| ValidationError::InvalidField {
                field: "timestamp",
                reason: e.to_string(),
            })?;

        let device_id = obj
            .get("device_id")
            .and_then(Value::as_i64)
            .ok_or_else(|| ValidationError::InvalidField {
                field: "device_id",
                reason: "expected an integer".into(),
            })?;

        Ok(Self {
            sensor_name: text("sensor_name")?,
            identifier: text("identifier")?,
            value,
            timestamp,
            device_id,
        })
    }
}

/// A reading waiting in the local queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingReading {
    /// Monotonic queue position assigned on enqueue.
    pub position: u64,
    pub reading: Reading,
}
