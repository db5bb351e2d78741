//! Live safety snapshot of the litterbox.
//!
//! Two requests per snapshot: the presence probe and the shared
//! environment probe.  Any sensor that cannot be read or decoded is left
//! as `None`, which the safety gate treats as unsafe.

use std::time::Duration;

use log::{debug, warn};

use super::{FieldSensor, SensorDriver, SensorKind};
use crate::app::ports::CommandPort;
use crate::fsm::context::SensorSnapshot;
use crate::protocol::Response;

/// Sensor tag of the board's authoritative state report (`{"state": <code>}`).
pub const STATUS_TAG: &str = "litterbox_status";

/// Read a fresh snapshot.  Never fails; unreadable values are `None`.
pub fn read_safety_snapshot(port: &dyn CommandPort, timeout: Duration) -> SensorSnapshot {
    let presence = probe(SensorKind::LitterboxPresence);
    let humidity = probe(SensorKind::LitterboxHumidity);
    let temperature = probe(SensorKind::LitterboxTemperature);
    let gas = probe(SensorKind::LitterboxGas);

    let presence_reply = request(port, &presence, timeout);
    let env_reply = request(port, &humidity, timeout);

    SensorSnapshot {
        presence_cm: decode(&presence, presence_reply.as_ref()),
        humidity_pct: decode(&humidity, env_reply.as_ref()),
        gas_ppm: decode(&gas, env_reply.as_ref()),
        temperature_c: decode(&temperature, env_reply.as_ref()),
    }
}

fn probe(kind: SensorKind) -> FieldSensor {
    FieldSensor::new(kind, "safety", Duration::ZERO)
}

fn request(port: &dyn CommandPort, sensor: &FieldSensor, timeout: Duration) -> Option<Response> {
    match port.send_and_wait(&sensor.build_request(), timeout) {
        Ok(r) => Some(r),
        Err(e) => {
            warn!("Safety probe {} failed: {e}", sensor.request_tag());
            None
        }
    }
}

fn decode(sensor: &FieldSensor, reply: Option<&Response>) -> Option<f64> {
    let reply = reply?;
    match sensor.decode(reply) {
        Ok(v) => Some(v),
        Err(e) => {
            debug!("{}: {e}", sensor.sensor_name());
            None
        }
    }
}
