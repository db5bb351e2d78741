//! Remote telemetry sink over HTTP.
//!
//! One reading per `POST <remote_url>` as a JSON document.  Any 2xx is a
//! confirmed insert; anything else is a rejection and the store falls back
//! to its local queue.  Reachability is a `GET` on the health URL (or the
//! remote URL itself) answered with any non-5xx status.

use std::time::Duration;

use log::debug;
use reqwest::blocking::Client;

use crate::app::ports::TelemetrySink;
use crate::config::TelemetryConfig;
use crate::error::SinkError;
use crate::telemetry::reading::Reading;

pub struct HttpSink {
    client: Client,
    insert_url: String,
    health_url: String,
}

impl HttpSink {
    pub fn new(insert_url: impl Into<String>, health_url: Option<String>, timeout: Duration) -> Result<Self, SinkError> {
        let insert_url = insert_url.into();
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .map_err(|e| SinkError::Unreachable(e.to_string()))?;
        Ok(Self {
            client,
            health_url: health_url.unwrap_or_else(|| insert_url.clone()),
            insert_url,
        })
    }

    pub fn from_config(cfg: &TelemetryConfig) -> Result<Self, SinkError> {
        Self::new(
            cfg.remote_url.clone(),
            cfg.health_url.clone(),
            Duration::from_millis(cfg.request_timeout_ms),
        )
    }
}

impl TelemetrySink for HttpSink {
    fn insert(&self, reading: &Reading) -> Result<(), SinkError> {
        let response = self
            .client
            .post(&self.insert_url)
            .json(reading)
            .send()
            .map_err(|e| SinkError::Unreachable(e.to_string()))?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(SinkError::Rejected(format!("HTTP {status}")))
        }
    }

    fn is_reachable(&self) -> bool {
        match self.client.get(&self.health_url).send() {
            Ok(r) => !r.status().is_server_error(),
            Err(e) => {
                debug!("Remote store unreachable: {e}");
                false
            }
        }
    }
}
