//! # Pipeline
//!
//! Owns every stage of the acquisition path and exposes one operation per
//! scheduler tick:
//!
//! | Tick | Operation |
//! |------|-----------|
//! | sampling timer | [`Pipeline::sample_imu`] |
//! | serial bytes available | [`Pipeline::poll_gps`] |
//! | health timer | [`Pipeline::sample_health`] |
//! | hardware drain | [`Pipeline::service_fifo`] |
//! | export timer | [`Pipeline::export_once`] |
//!
//! All operations run sequentially on the main loop. Only the FIFO's
//! hardware tier is shared with other contexts.

use std::time::Instant;

use tracing::{debug, error, info, warn};

use crate::board::{BoardProfile, ImuSource};
use crate::catalog::{MetricCatalog, METRICS};
use crate::config::Config;
use crate::error::{Result, TelemetryError};
use crate::export::{BackoffController, ExportOutcome, Exporter, TransportClient};
use crate::fifo::{FifoStats, SampleFifo};
use crate::otlp::{BatchEncoder, EncoderConfig};
use crate::sample::Sample;
use crate::sensor::gps::{ByteSource, GpsAdapter, GpsPoll};
use crate::sensor::health::health_samples;
use crate::sensor::imu::{Bus, ImuSampler, SimulatedBus};
use crate::sensor::nmea::NmeaParser;

/// What one export tick did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportReport {
    /// Nothing pending
    Idle,
    /// Waiting out the retry delay after a failure
    BackingOff,
    /// Payload acknowledged and its samples committed
    Sent { points: usize, bytes: usize },
    /// Payload rejected; its samples are back in the FIFO
    Failed { points: usize, reason: String },
}

/// Running counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub imu_readings: u64,
    pub imu_failures: u64,
    pub gps_fixes: u64,
    pub gps_malformed: u64,
    pub exports_acked: u64,
    pub exports_failed: u64,
    pub points_exported: u64,
}

/// Acquisition, buffering and export for one device
pub struct Pipeline<T: TransportClient> {
    fifo: SampleFifo,
    imu: ImuSampler,
    bus: Option<Box<dyn Bus + Send>>,
    gps: GpsAdapter,
    gps_source: Option<Box<dyn ByteSource + Send>>,
    encoder: BatchEncoder,
    exporter: Exporter<T>,
    backoff: BackoffController,
    boot: Instant,
    stats: PipelineStats,
    halted: bool,
}

impl<T: TransportClient> std::fmt::Debug for Pipeline<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("fifo", &self.fifo.stats())
            .field("stats", &self.stats)
            .field("halted", &self.halted)
            .finish_non_exhaustive()
    }
}

/// Check that `catalog` serves every built-in source at its fixed index
fn check_catalog(catalog: &MetricCatalog) -> Result<()> {
    for (index, descriptor) in METRICS.iter().enumerate() {
        let found = catalog.index_of(descriptor.source);
        if found != Some(index as u16) {
            return Err(TelemetryError::Catalog(format!(
                "source {:?} expected at index {}, catalog has {:?}",
                descriptor.source, index, found
            )));
        }
        let entry = catalog.describe(index as u16)?;
        if entry.value_kind != descriptor.value_kind {
            return Err(TelemetryError::Catalog(format!(
                "metric '{}' must carry {:?} values",
                entry.name, descriptor.value_kind
            )));
        }
    }
    Ok(())
}

impl<T: TransportClient> Pipeline<T> {
    /// Build the pipeline from a validated configuration
    ///
    /// # Arguments
    ///
    /// * `config` - Validated configuration
    /// * `catalog` - Metric schema shared by the adapters and the encoder
    /// * `transport` - Collector transport
    /// * `boot` - Device time zero
    /// * `time_base_unix_nanos` - Wall-clock time at `boot`
    ///
    /// # Errors
    ///
    /// Returns [`TelemetryError::Catalog`] if the catalog does not serve the
    /// built-in sources at their fixed indices.
    pub fn new(
        config: &Config,
        catalog: MetricCatalog,
        transport: T,
        boot: Instant,
        time_base_unix_nanos: u64,
    ) -> Result<Self> {
        check_catalog(&catalog)?;

        let profile = BoardProfile::from_config(&config.board);
        let bus: Option<Box<dyn Bus + Send>> = match profile.imu_source {
            ImuSource::Simulated => Some(Box::new(SimulatedBus::new(&profile))),
            ImuSource::None => None,
        };

        let encoder = BatchEncoder::new(
            catalog,
            EncoderConfig {
                max_payload_bytes: config.export.max_payload_bytes,
                batch_limit: config.export.batch_limit,
                time_base_unix_nanos,
                service_name: config.resource.service_name.clone(),
                device_id: config.resource.device_id.clone(),
            },
        );

        Ok(Self {
            fifo: SampleFifo::new(config.buffer.capacity),
            imu: ImuSampler::new(&profile),
            bus,
            gps: GpsAdapter::new(NmeaParser::new(), config.sampling.gps_poll_budget),
            gps_source: None,
            encoder,
            exporter: Exporter::new(transport, config.export.timeout()),
            backoff: BackoffController::new(
                config.export.retry_initial_ms,
                config.export.retry_max_ms,
            ),
            boot,
            stats: PipelineStats::default(),
            halted: false,
        })
    }

    /// Replace the accelerometer bus
    pub fn with_bus(mut self, bus: Box<dyn Bus + Send>) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Attach the GPS byte source
    pub fn with_gps_source(mut self, source: Box<dyn ByteSource + Send>) -> Self {
        self.gps_source = Some(source);
        self
    }

    /// Device time in microseconds
    pub fn timestamp_us(&self, now: Instant) -> u64 {
        u64::try_from(now.saturating_duration_since(self.boot).as_micros()).unwrap_or(u64::MAX)
    }

    fn push_all(&mut self, samples: &[Sample]) -> usize {
        let mut accepted = 0;
        for sample in samples {
            match self.fifo.push(*sample) {
                Ok(()) => accepted += 1,
                Err(e) => debug!("Dropped sample: {}", e),
            }
        }
        accepted
    }

    /// Take one accelerometer reading
    ///
    /// A failed bus transaction drops this tick's reading. Returns the number
    /// of samples queued.
    pub fn sample_imu(&mut self, now: Instant) -> usize {
        if self.halted {
            return 0;
        }
        let timestamp_us = self.timestamp_us(now);
        let Some(bus) = self.bus.as_mut() else {
            return 0;
        };

        match self.imu.sample(bus.as_mut(), timestamp_us) {
            Ok(samples) => {
                self.stats.imu_readings += 1;
                self.push_all(&samples)
            }
            Err(e) => {
                self.stats.imu_failures += 1;
                debug!("Skipping IMU tick: {}", e);
                0
            }
        }
    }

    /// Feed pending GPS bytes to the NMEA parser
    pub fn poll_gps(&mut self, now: Instant) -> GpsPoll {
        if self.halted {
            return GpsPoll::default();
        }
        let timestamp_us = self.timestamp_us(now);
        let Some(source) = self.gps_source.as_mut() else {
            return GpsPoll::default();
        };

        let outcome = self.gps.poll(source.as_mut(), &mut self.fifo, timestamp_us);
        self.stats.gps_fixes += outcome.fixes as u64;
        self.stats.gps_malformed += outcome.malformed as u64;
        outcome
    }

    /// Queue uptime and buffer health samples
    pub fn sample_health(&mut self, now: Instant) -> usize {
        if self.halted {
            return 0;
        }
        let samples = health_samples(self.timestamp_us(now), &self.fifo.stats());
        self.push_all(&samples)
    }

    /// Move the hardware tier into the software tier
    pub fn service_fifo(&mut self) -> usize {
        self.fifo.service()
    }

    /// Build one batch and send it
    ///
    /// Commits the batch's samples on acknowledgement and restores them on
    /// failure, then paces the next attempt with exponential backoff.
    ///
    /// # Errors
    ///
    /// * [`TelemetryError::Catalog`] - fatal; acquisition halts
    /// * [`TelemetryError::PayloadTooLarge`] - the ceiling cannot hold a
    ///   single data point; samples stay queued
    pub async fn export_once(&mut self, now: Instant) -> Result<ExportReport> {
        if self.halted {
            return Ok(ExportReport::Idle);
        }
        if !self.backoff.should_retry(now) {
            return Ok(ExportReport::BackingOff);
        }

        let payload = match self.encoder.build_batch(&mut self.fifo) {
            Ok(Some(payload)) => payload,
            Ok(None) => return Ok(ExportReport::Idle),
            Err(e) if e.is_fatal() => {
                self.halted = true;
                error!("Halting acquisition: {}", e);
                return Err(e);
            }
            Err(e) => {
                self.backoff.mark_failure(now);
                warn!("Batch not built: {}", e);
                return Err(e);
            }
        };

        let points = payload.point_count();
        let bytes = payload.len();

        match self.exporter.send(&payload).await {
            ExportOutcome::Acked => {
                self.fifo.commit(payload.into_range());
                self.backoff.mark_success();
                self.stats.exports_acked += 1;
                self.stats.points_exported += points as u64;
                Ok(ExportReport::Sent { points, bytes })
            }
            ExportOutcome::Failed(reason) => {
                let evicted = self.fifo.restore(payload.into_range());
                self.backoff.mark_failure(now);
                self.stats.exports_failed += 1;
                debug!(
                    points,
                    evicted,
                    retry_in_ms = self.backoff.current_delay().as_millis() as u64,
                    "Batch restored after failed export"
                );
                Ok(ExportReport::Failed { points, reason })
            }
        }
    }

    /// Log a one-line status summary
    pub fn log_status(&self) {
        let fifo = self.fifo.stats();
        info!(
            occupancy = fifo.occupancy,
            evicted = fifo.evicted,
            hw_overflows = fifo.hardware_overflows,
            imu_failures = self.stats.imu_failures,
            gps_fixes = self.stats.gps_fixes,
            gps_malformed = self.stats.gps_malformed,
            exported = self.stats.points_exported,
            export_failures = self.stats.exports_failed,
            "Pipeline status"
        );
    }

    pub fn fifo(&self) -> &SampleFifo {
        &self.fifo
    }

    pub fn fifo_stats(&self) -> FifoStats {
        self.fifo.stats()
    }

    pub fn stats(&self) -> PipelineStats {
        self.stats
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    pub fn exporter(&self) -> &Exporter<T> {
        &self.exporter
    }
}
