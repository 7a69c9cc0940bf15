//! # Exporter
//!
//! Hands finished payloads to the transport and reports the outcome.
//!
//! The exporter never retries and never touches the FIFO. The caller commits
//! the payload's range on [`ExportOutcome::Acked`] and restores it on
//! [`ExportOutcome::Failed`]; retry pacing lives in [`backoff`].

pub mod backoff;
pub mod transport;

use std::time::Duration;

use tracing::{debug, warn};

use crate::otlp::Payload;

pub use backoff::BackoffController;
pub use transport::{HttpTransport, TransportClient};

/// Result of one send
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportOutcome {
    /// Collector confirmed receipt
    Acked,
    /// Send failed, timed out or was rejected
    Failed(String),
}

/// Sends payloads with a bounded wait
#[derive(Debug)]
pub struct Exporter<T: TransportClient> {
    transport: T,
    timeout: Duration,
    acked: u64,
    failed: u64,
}

impl<T: TransportClient> Exporter<T> {
    pub fn new(transport: T, timeout: Duration) -> Self {
        Self {
            transport,
            timeout,
            acked: 0,
            failed: 0,
        }
    }

    /// Send one payload
    ///
    /// The send is abandoned after the configured timeout; abandonment is
    /// reported as `Failed` like any other transport error.
    pub async fn send(&mut self, payload: &Payload) -> ExportOutcome {
        let send = self.transport.send(payload.bytes().clone(), self.timeout);

        let outcome = match tokio::time::timeout(self.timeout, send).await {
            Ok(Ok(())) => ExportOutcome::Acked,
            Ok(Err(e)) => ExportOutcome::Failed(e.to_string()),
            Err(_) => ExportOutcome::Failed(format!(
                "send abandoned after {} ms",
                self.timeout.as_millis()
            )),
        };

        match &outcome {
            ExportOutcome::Acked => {
                self.acked += 1;
                debug!(bytes = payload.len(), points = payload.point_count(), "Payload acknowledged");
            }
            ExportOutcome::Failed(reason) => {
                self.failed += 1;
                warn!(bytes = payload.len(), "Export failed: {}", reason);
            }
        }
        outcome
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Acknowledged sends since start
    pub fn acked(&self) -> u64 {
        self.acked
    }

    /// Failed or abandoned sends since start
    pub fn failed(&self) -> u64 {
        self.failed
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }
}

#[cfg(test)]
mod tests {
    use super::transport::mocks::MockTransport;
    use super::*;
    use crate::catalog::{MetricCatalog, MetricId};
    use crate::fifo::SampleFifo;
    use crate::otlp::{BatchEncoder, EncoderConfig};
    use crate::sample::{Sample, SampleValue};

    fn payload(fifo: &mut SampleFifo) -> Payload {
        fifo.push(Sample::new(MetricId::SystemUptime, 1_000_000, SampleValue::Int(1)))
            .unwrap();
        let mut encoder = BatchEncoder::new(
            MetricCatalog::builtin(),
            EncoderConfig {
                max_payload_bytes: 8192,
                batch_limit: 40,
                time_base_unix_nanos: 0,
                service_name: "field-telemetry".to_string(),
                device_id: "test".to_string(),
            },
        );
        encoder.build_batch(fifo).unwrap().unwrap()
    }

    #[tokio::test]
    async fn test_ack_is_reported() {
        let mock = MockTransport::new();
        let mut exporter = Exporter::new(mock.clone(), Duration::from_secs(1));
        let mut fifo = SampleFifo::new(8);
        let payload = payload(&mut fifo);

        assert_eq!(exporter.send(&payload).await, ExportOutcome::Acked);
        assert_eq!(mock.get_sent().len(), 1);
        assert_eq!(mock.get_sent()[0], *payload.bytes());
        assert_eq!(exporter.acked(), 1);

        fifo.commit(payload.into_range());
    }

    #[tokio::test]
    async fn test_transport_error_is_failed() {
        let mock = MockTransport::new();
        mock.set_failure("HTTP 503");
        let mut exporter = Exporter::new(mock.clone(), Duration::from_secs(1));
        let mut fifo = SampleFifo::new(8);
        let payload = payload(&mut fifo);

        match exporter.send(&payload).await {
            ExportOutcome::Failed(reason) => assert!(reason.contains("HTTP 503")),
            other => panic!("expected Failed, got {:?}", other),
        }
        assert_eq!(exporter.failed(), 1);

        fifo.restore(payload.into_range());
        assert_eq!(fifo.len(), 1);
    }

    #[tokio::test]
    async fn test_timeout_is_failed() {
        let mock = MockTransport::new();
        mock.set_delay(Duration::from_secs(5));
        let mut exporter = Exporter::new(mock.clone(), Duration::from_millis(20));
        let mut fifo = SampleFifo::new(8);
        let payload = payload(&mut fifo);

        match exporter.send(&payload).await {
            ExportOutcome::Failed(reason) => assert!(reason.contains("abandoned")),
            other => panic!("expected Failed, got {:?}", other),
        }
        assert!(mock.get_sent().is_empty());

        fifo.restore(payload.into_range());
        assert_eq!(fifo.stats().in_flight, 0);
    }
}
