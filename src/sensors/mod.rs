//! Sensor drivers.
//!
//! Every onboard sensor is read the same way: send
//! `REQUEST_SENSOR_DATA{sensor: <tag>}`, check the reply is for the right
//! tag and reports a healthy status, pull one field, range-check it.  The
//! sensors differ only in those constants, so one flat [`FieldSensor`]
//! driven by the [`SensorKind`] table covers all of them.
//!
//! Several kinds share a request tag (the environment probe returns
//! humidity, temperature and gas in one object); the poller issues one
//! request per tag per round and hands the reply to each driver.

pub mod litterbox;

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::SensorEntry;
use crate::error::ProtocolError;
use crate::protocol::{Command, Response};

// ───────────────────────────────────────────────────────────────
// Capability interface
// ───────────────────────────────────────────────────────────────

/// What the polling driver needs from a sensor.
pub trait SensorDriver: Send + Sync {
    /// Telemetry name, e.g. `feeder_weight`.
    fn sensor_name(&self) -> &str;

    /// Physical sensor identifier, e.g. `WSR001`.
    fn identifier(&self) -> &str;

    /// Value of the `sensor` field in the request.
    fn request_tag(&self) -> &str;

    fn interval(&self) -> Duration;

    fn build_request(&self) -> Command {
        Command::request_sensor(self.request_tag())
    }

    /// Extract the raw value from a reply.
    fn parse_response(&self, response: &Response) -> Result<f64, ProtocolError>;

    /// Range check.
    fn validate(&self, value: f64) -> Result<f64, ProtocolError>;

    fn decode(&self, response: &Response) -> Result<f64, ProtocolError> {
        let value = self.parse_response(response)?;
        self.validate(value)
    }
}

// ───────────────────────────────────────────────────────────────
// Kind table
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorKind {
    LitterboxPresence,
    LitterboxHumidity,
    LitterboxTemperature,
    LitterboxGas,
    FeederWeight,
    FeederFoodLevel,
    FeederContainerHeight,
    WaterLevel,
    WaterPresence,
}

/// Constants of one sensor kind.
#[derive(Debug, Clone, Copy)]
pub struct KindSpec {
    pub sensor_name: &'static str,
    pub request_tag: &'static str,
    pub field: &'static str,
    /// Per-sensor status field that must read `READY`.
    pub status_field: Option<&'static str>,
    pub min: f64,
    pub max: f64,
    /// Boolean field reported as 1.0 / 0.0.
    pub boolean: bool,
}

impl SensorKind {
    pub const ALL: [Self; 9] = [
        Self::LitterboxPresence,
        Self::LitterboxHumidity,
        Self::LitterboxTemperature,
        Self::LitterboxGas,
        Self::FeederWeight,
        Self::FeederFoodLevel,
        Self::FeederContainerHeight,
        Self::WaterLevel,
        Self::WaterPresence,
    ];

    pub const fn spec(self) -> KindSpec {
        const fn num(
            sensor_name: &'static str,
            request_tag: &'static str,
            field: &'static str,
            status_field: Option<&'static str>,
            min: f64,
            max: f64,
        ) -> KindSpec {
            KindSpec {
                sensor_name,
                request_tag,
                field,
                status_field,
                min,
                max,
                boolean: false,
            }
        }

        match self {
            Self::LitterboxPresence => num(
                "litterbox_presence",
                "litterbox_presence",
                "distancia_cm",
                Some("status"),
                2.0,
                200.0,
            ),
            Self::LitterboxHumidity => num(
                "litterbox_humidity",
                "litterbox_environment",
                "humedad_pct",
                None,
                0.0,
                100.0,
            ),
            Self::LitterboxTemperature => num(
                "litterbox_temperature",
                "litterbox_environment",
                "temperatura_c",
                None,
                -20.0,
                50.0,
            ),
            Self::LitterboxGas => num(
                "litterbox_gas",
                "litterbox_environment",
                "gas_ppm",
                None,
                0.0,
                10_000.0,
            ),
            Self::FeederWeight => num(
                "feeder_weight",
                "feeder_weight",
                "peso_gramos",
                Some("status"),
                0.0,
                5_000.0,
            ),
            Self::FeederFoodLevel => num(
                "feeder_ultrasonic1",
                "feeder_level",
                "nivel_comida_cm",
                Some("sensor1_status"),
                2.0,
                100.0,
            ),
            Self::FeederContainerHeight => num(
                "feeder_ultrasonic2",
                "feeder_level",
                "altura_contenedor_cm",
                Some("sensor2_status"),
                2.0,
                100.0,
            ),
            Self::WaterLevel => num(
                "water_level",
                "water_level",
                "nivel_analogico",
                None,
                0.0,
                1023.0,
            ),
            Self::WaterPresence => KindSpec {
                sensor_name: "water_ir",
                request_tag: "water_ir",
                field: "gato_presente",
                status_field: None,
                min: 0.0,
                max: 1.0,
                boolean: true,
            },
        }
    }
}

// ───────────────────────────────────────────────────────────────
// FieldSensor
// ───────────────────────────────────────────────────────────────

/// A sensor whose reading is one field of the reply object.
#[derive(Debug, Clone)]
pub struct FieldSensor {
    kind: SensorKind,
    spec: KindSpec,
    identifier: String,
    interval: Duration,
}

impl FieldSensor {
    pub fn new(kind: SensorKind, identifier: impl Into<String>, interval: Duration) -> Self {
        Self {
            kind,
            spec: kind.spec(),
            identifier: identifier.into(),
            interval,
        }
    }

    pub fn from_entry(entry: &SensorEntry) -> Self {
        Self::new(
            entry.kind,
            entry.identifier.clone(),
            Duration::from_secs(entry.interval_secs),
        )
    }

    pub fn kind(&self) -> SensorKind {
        self.kind
    }
}

impl SensorDriver for FieldSensor {
    fn sensor_name(&self) -> &str {
        self.spec.sensor_name
    }

    fn identifier(&self) -> &str {
        &self.identifier
    }

    fn request_tag(&self) -> &str {
        self.spec.request_tag
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    fn parse_response(&self, response: &Response) -> Result<f64, ProtocolError> {
        let spec = &self.spec;
        match response.sensor() {
            Some(tag) if tag == spec.request_tag => {}
            other => {
                return Err(ProtocolError::WrongSensor {
                    expected: spec.request_tag.to_string(),
                    got: other.unwrap_or("<none>").to_string(),
                });
            }
        }
        if !response.is_success() {
            return Err(ProtocolError::DeviceStatus(response.error_message()));
        }
        if let Some(field) = spec.status_field {
            let status = response.str_field(field).unwrap_or("ERROR");
            if !status.eq_ignore_ascii_case("READY") {
                return Err(ProtocolError::DeviceStatus(format!("{field}={status}")));
            }
        }

        if spec.boolean {
            return response
                .bool_field(spec.field)
                .map(|b| if b { 1.0 } else { 0.0 })
                .ok_or(ProtocolError::MissingField(spec.field));
        }
        let value = response
            .f64_field(spec.field)
            .ok_or(ProtocolError::MissingField(spec.field))?;
        if value.is_finite() {
            Ok(value)
        } else {
            Err(ProtocolError::NotANumber(spec.field))
        }
    }

    fn validate(&self, value: f64) -> Result<f64, ProtocolError> {
        if (self.spec.min..=self.spec.max).contains(&value) {
            Ok(value)
        } else {
            Err(ProtocolError::OutOfRange {
                field: self.spec.field,
                value,
            })
        }
    }
}

/// Build the configured drivers.
pub fn build_drivers(entries: &[SensorEntry]) -> Vec<Box<dyn SensorDriver>> {
    entries
        .iter()
        .map(|e| Box::new(FieldSensor::from_entry(e)) as Box<dyn SensorDriver>)
        .collect()
}
