//! Transport abstraction for delivering payloads to the collector

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::debug;

use crate::error::{Result, TelemetryError};

/// OTLP/HTTP content type for binary protobuf bodies
pub const PROTOBUF_CONTENT_TYPE: &str = "application/x-protobuf";

/// Sends one opaque payload and reports whether the collector accepted it
#[async_trait]
pub trait TransportClient: Send {
    /// Deliver `payload`, giving up after `timeout`
    ///
    /// # Errors
    ///
    /// Returns [`TelemetryError::TransportFailure`] on timeout, connection
    /// failure or a non-success response.
    async fn send(&mut self, payload: Bytes, timeout: Duration) -> Result<()>;
}

/// OTLP/HTTP transport posting to a collector's `/v1/metrics` endpoint
#[derive(Debug, Clone)]
pub struct HttpTransport {
    agent: ureq::Agent,
    endpoint: String,
}

impl HttpTransport {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            agent: ureq::Agent::new(),
            endpoint: endpoint.into(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Blocking I/O
    fn post(agent: &ureq::Agent, endpoint: &str, payload: &[u8], timeout: Duration) -> Result<()> {
        match agent
            .post(endpoint)
            .timeout(timeout)
            .set("Content-Type", PROTOBUF_CONTENT_TYPE)
            .send_bytes(payload)
        {
            Ok(response) => {
                debug!(status = response.status(), "Collector accepted payload");
                Ok(())
            }
            Err(ureq::Error::Status(code, _)) => Err(TelemetryError::TransportFailure(format!(
                "collector responded with HTTP {}",
                code
            ))),
            Err(e) => Err(TelemetryError::TransportFailure(e.to_string())),
        }
    }
}

#[async_trait]
impl TransportClient for HttpTransport {
    async fn send(&mut self, payload: Bytes, timeout: Duration) -> Result<()> {
        let agent = self.agent.clone();
        let endpoint = self.endpoint.clone();

        tokio::task::spawn_blocking(move || Self::post(&agent, &endpoint, &payload, timeout))
            .await
            .map_err(|e| TelemetryError::TransportFailure(format!("send task failed: {}", e)))?
    }
}
