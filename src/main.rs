//! # Field Telemetry
//!
//! Fuse GPS, accelerometer and device health into OpenTelemetry metrics.
//!
//! This application samples the board's sensors on fixed ticks, buffers the
//! samples, and exports them as OTLP/HTTP protobuf to a collector.

use std::time::Instant;

use anyhow::{Context, Result};
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use field_telemetry::catalog::MetricCatalog;
use field_telemetry::config::{Config, LoggingConfig};
use field_telemetry::export::HttpTransport;
use field_telemetry::pipeline::{ExportReport, Pipeline};
use field_telemetry::serial::GpsSerial;

/// Configuration file used when `FIELD_TELEMETRY_CONFIG` is not set
const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Initialize console logging, plus a daily rolling file when configured
///
/// The returned guard flushes the file writer on drop and must live until
/// shutdown.
fn init_logging(logging: &LoggingConfig) -> Option<WorkerGuard> {
    let filter = EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into());
    let registry = tracing_subscriber::registry().with(filter).with(fmt::layer());

    match &logging.dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "field-telemetry.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            registry
                .with(fmt::layer().with_ansi(false).with_writer(writer))
                .init();
            Some(guard)
        }
        None => {
            registry.init();
            None
        }
    }
}

/// Wall-clock nanoseconds since the Unix epoch, for exported timestamps
fn unix_nanos_now() -> u64 {
    chrono::Utc::now()
        .timestamp_nanos_opt()
        .and_then(|n| u64::try_from(n).ok())
        .unwrap_or(0)
}

fn period(ms: u64) -> tokio::time::Interval {
    let mut ticker = interval(Duration::from_millis(ms));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ticker
}

/// Main entry point for Field Telemetry
///
/// # Control Flow
///
/// 1. **Initialization**
///    - Load configuration (`FIELD_TELEMETRY_CONFIG` or `config/default.toml`)
///    - Set up logging
///    - Open the GPS serial port and select RMC + GGA output
///    - Build the pipeline with the OTLP/HTTP transport
///
/// 2. **Main Loop**
///    - IMU, GPS, health, FIFO service and export ticks on one thread
///    - Status log on every health tick
///    - Handle Ctrl+C for graceful shutdown
///
/// 3. **Shutdown**
///    - One last export attempt for pending samples
///
/// # Errors
///
/// Returns error if:
/// - The configuration cannot be loaded
/// - The metric catalog is inconsistent (acquisition halts)
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let config_path =
        std::env::var("FIELD_TELEMETRY_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    let config = Config::load(&config_path)
        .with_context(|| format!("loading configuration from {}", config_path))?;

    let _log_guard = init_logging(&config.logging);
    info!("Field Telemetry v{} starting...", env!("CARGO_PKG_VERSION"));
    info!(
        "Exporting to {} (ceiling {} bytes, batch {})",
        config.export.endpoint, config.export.max_payload_bytes, config.export.batch_limit
    );

    let boot = Instant::now();
    let transport = HttpTransport::new(config.export.endpoint.clone());
    let mut pipeline = Pipeline::new(
        &config,
        MetricCatalog::builtin(),
        transport,
        boot,
        unix_nanos_now(),
    )?;

    if config.board.gps_port.is_empty() {
        info!("GPS disabled");
    } else {
        match GpsSerial::open(&config.board.gps_port, config.board.gps_baud) {
            Ok(mut gps) => {
                if let Err(e) = gps.configure().await {
                    warn!("GPS output format not set, using receiver defaults: {}", e);
                }
                let (source, _reader) = gps.spawn_reader();
                pipeline = pipeline.with_gps_source(Box::new(source));
            }
            Err(e) => warn!("Continuing without GPS: {}", e),
        }
    }

    let mut imu_tick = period(config.sampling.imu_interval_ms);
    let mut gps_tick = period(config.sampling.gps_poll_interval_ms);
    let mut health_tick = period(config.sampling.health_interval_ms);
    let mut service_tick = period(config.sampling.service_interval_ms);
    let mut export_tick = period(config.export.interval_ms);

    info!("Press Ctrl+C to exit");

    loop {
        tokio::select! {
            _ = imu_tick.tick() => {
                pipeline.sample_imu(Instant::now());
            }

            _ = gps_tick.tick() => {
                let outcome = pipeline.poll_gps(Instant::now());
                if outcome.fixes > 0 {
                    debug!("GPS: {} fixes, {} samples", outcome.fixes, outcome.samples);
                }
            }

            _ = health_tick.tick() => {
                pipeline.sample_health(Instant::now());
                pipeline.log_status();
            }

            _ = service_tick.tick() => {
                pipeline.service_fifo();
            }

            _ = export_tick.tick() => {
                match pipeline.export_once(Instant::now()).await {
                    Ok(ExportReport::Sent { points, bytes }) => {
                        debug!("Exported {} points ({} bytes)", points, bytes);
                    }
                    Ok(_) => {}
                    Err(e) if e.is_fatal() => {
                        error!("Fatal pipeline error: {}", e);
                        return Err(e.into());
                    }
                    Err(e) => warn!("Export skipped: {}", e),
                }
            }

            // Handle Ctrl+C for graceful shutdown
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down...");
                break;
            }
        }
    }

    if let Ok(ExportReport::Sent { points, .. }) = pipeline.export_once(Instant::now()).await {
        info!("Flushed {} points before exit", points);
    }
    let stats = pipeline.stats();
    info!(
        "Total points exported: {} ({} sends acknowledged, {} failed)",
        stats.points_exported, stats.exports_acked, stats.exports_failed
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unix_nanos_now_is_after_2020() {
        assert!(unix_nanos_now() > 1_577_836_800_000_000_000);
    }

    #[test]
    fn test_default_config_file_is_valid() {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/config/default.toml");
        assert!(Config::load(path).is_ok());
    }
}
