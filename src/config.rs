//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.

use serde::de::Error;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::board::{AccelModel, ImuSource};
use crate::error::{Result, TelemetryError};
use crate::otlp::MAX_PROTOBUF_BYTES;

/// Main configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub board: BoardConfig,
    #[serde(default)]
    pub sampling: SamplingConfig,
    #[serde(default)]
    pub buffer: BufferConfig,
    #[serde(default)]
    pub export: ExportConfig,
    #[serde(default)]
    pub resource: ResourceConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Hardware description
#[derive(Debug, Deserialize, Clone)]
pub struct BoardConfig {
    #[serde(default = "default_accel_model")]
    pub accel_model: AccelModel,

    /// Accelerometer full-scale range in g
    #[serde(default = "default_g_range")]
    pub g_range: u8,

    #[serde(default = "default_imu_source")]
    pub imu_source: ImuSource,

    /// GPS serial device; empty disables GPS
    #[serde(default = "default_gps_port")]
    pub gps_port: String,

    #[serde(default = "default_gps_baud")]
    pub gps_baud: u32,
}

/// Tick periods
#[derive(Debug, Deserialize, Clone)]
pub struct SamplingConfig {
    #[serde(default = "default_imu_interval_ms")]
    pub imu_interval_ms: u64,

    #[serde(default = "default_gps_poll_interval_ms")]
    pub gps_poll_interval_ms: u64,

    /// Maximum GPS bytes consumed per poll
    #[serde(default = "default_gps_poll_budget")]
    pub gps_poll_budget: usize,

    #[serde(default = "default_health_interval_ms")]
    pub health_interval_ms: u64,

    /// How often the hardware tier is moved into the software tier
    #[serde(default = "default_service_interval_ms")]
    pub service_interval_ms: u64,
}

/// Sample buffer sizing
#[derive(Debug, Deserialize, Clone)]
pub struct BufferConfig {
    /// Software tier capacity in samples
    #[serde(default = "default_capacity")]
    pub capacity: usize,
}

/// Export configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ExportConfig {
    /// OTLP/HTTP metrics endpoint
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Payload ceiling in bytes
    #[serde(default = "default_max_payload_bytes")]
    pub max_payload_bytes: usize,

    /// Samples drained per batch
    #[serde(default = "default_batch_limit")]
    pub batch_limit: usize,

    #[serde(default = "default_send_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default = "default_export_interval_ms")]
    pub interval_ms: u64,

    #[serde(default = "default_retry_initial_ms")]
    pub retry_initial_ms: u64,

    #[serde(default = "default_retry_max_ms")]
    pub retry_max_ms: u64,
}

/// OTLP resource attributes
#[derive(Debug, Deserialize, Clone)]
pub struct ResourceConfig {
    #[serde(default = "default_service_name")]
    pub service_name: String,

    #[serde(default = "default_device_id")]
    pub device_id: String,
}

/// Log output configuration
#[derive(Debug, Deserialize, Clone, Default)]
pub struct LoggingConfig {
    /// Directory for a daily rolling log file; console only when unset
    #[serde(default)]
    pub dir: Option<String>,
}

// Default value functions
fn default_accel_model() -> AccelModel { AccelModel::Mc3419 }
fn default_g_range() -> u8 { 2 }
fn default_imu_source() -> ImuSource { ImuSource::Simulated }
fn default_gps_port() -> String { "/dev/ttyUSB0".to_string() }
fn default_gps_baud() -> u32 { 9600 }

fn default_imu_interval_ms() -> u64 { 100 }
fn default_gps_poll_interval_ms() -> u64 { 50 }
fn default_gps_poll_budget() -> usize { 512 }
fn default_health_interval_ms() -> u64 { 10_000 }
fn default_service_interval_ms() -> u64 { 10 }

fn default_capacity() -> usize { 1024 }

fn default_endpoint() -> String { "http://127.0.0.1:4318/v1/metrics".to_string() }
fn default_max_payload_bytes() -> usize { 8192 }
fn default_batch_limit() -> usize { 40 }
fn default_send_timeout_ms() -> u64 { 5_000 }
fn default_export_interval_ms() -> u64 { 1_000 }
fn default_retry_initial_ms() -> u64 { 1_000 }
fn default_retry_max_ms() -> u64 { 60_000 }

fn default_service_name() -> String { "field-telemetry".to_string() }
fn default_device_id() -> String { "unit-0001".to_string() }

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            accel_model: default_accel_model(),
            g_range: default_g_range(),
            imu_source: default_imu_source(),
            gps_port: default_gps_port(),
            gps_baud: default_gps_baud(),
        }
    }
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            imu_interval_ms: default_imu_interval_ms(),
            gps_poll_interval_ms: default_gps_poll_interval_ms(),
            gps_poll_budget: default_gps_poll_budget(),
            health_interval_ms: default_health_interval_ms(),
            service_interval_ms: default_service_interval_ms(),
        }
    }
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
        }
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            max_payload_bytes: default_max_payload_bytes(),
            batch_limit: default_batch_limit(),
            timeout_ms: default_send_timeout_ms(),
            interval_ms: default_export_interval_ms(),
            retry_initial_ms: default_retry_initial_ms(),
            retry_max_ms: default_retry_max_ms(),
        }
    }
}

impl Default for ResourceConfig {
    fn default() -> Self {
        Self {
            service_name: default_service_name(),
            device_id: default_device_id(),
        }
    }
}

impl ExportConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

fn invalid(msg: impl std::fmt::Display) -> TelemetryError {
    TelemetryError::Config(toml::de::Error::custom(msg))
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Returns
    ///
    /// * `Result<Config>` - Loaded and validated configuration
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use field_telemetry::config::Config;
    ///
    /// let config = Config::load("config/default.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    pub fn validate(&self) -> Result<()> {
        // Board
        if ![2, 4, 8, 16].contains(&self.board.g_range) {
            return Err(invalid("g_range must be one of: 2, 4, 8, 16"));
        }

        if !self.board.gps_port.is_empty()
            && ![4800, 9600, 19200, 38400, 57600, 115200].contains(&self.board.gps_baud)
        {
            return Err(invalid(
                "gps_baud must be one of: 4800, 9600, 19200, 38400, 57600, 115200",
            ));
        }

        // Sampling periods
        for (name, value) in [
            ("imu_interval_ms", self.sampling.imu_interval_ms),
            ("gps_poll_interval_ms", self.sampling.gps_poll_interval_ms),
            ("service_interval_ms", self.sampling.service_interval_ms),
        ] {
            if value == 0 || value > 10_000 {
                return Err(invalid(format!("{} must be between 1 and 10000", name)));
            }
        }

        if self.sampling.health_interval_ms == 0 || self.sampling.health_interval_ms > 3_600_000 {
            return Err(invalid("health_interval_ms must be between 1 and 3600000"));
        }

        if self.sampling.gps_poll_budget == 0 {
            return Err(invalid("gps_poll_budget must be greater than 0"));
        }

        // Buffer
        if self.buffer.capacity == 0 {
            return Err(invalid("buffer capacity must be greater than 0"));
        }

        // Export
        if self.export.endpoint.is_empty() {
            return Err(invalid("export endpoint cannot be empty"));
        }

        if self.export.max_payload_bytes < 256 || self.export.max_payload_bytes > MAX_PROTOBUF_BYTES {
            return Err(invalid(format!(
                "max_payload_bytes must be between 256 and {}",
                MAX_PROTOBUF_BYTES
            )));
        }

        if self.export.batch_limit == 0 {
            return Err(invalid("batch_limit must be greater than 0"));
        }

        if self.export.batch_limit > self.buffer.capacity {
            return Err(invalid("batch_limit cannot exceed buffer capacity"));
        }

        if self.export.timeout_ms == 0 || self.export.timeout_ms > 60_000 {
            return Err(invalid("export timeout_ms must be between 1 and 60000"));
        }

        if self.export.interval_ms == 0 || self.export.interval_ms > 3_600_000 {
            return Err(invalid("export interval_ms must be between 1 and 3600000"));
        }

        if self.export.retry_initial_ms == 0 {
            return Err(invalid("retry_initial_ms must be greater than 0"));
        }

        if self.export.retry_max_ms < self.export.retry_initial_ms {
            return Err(invalid("retry_max_ms must be at least retry_initial_ms"));
        }

        // Resource
        if self.resource.service_name.is_empty() {
            return Err(invalid("service_name cannot be empty"));
        }

        if let Some(dir) = &self.logging.dir {
            if dir.is_empty() {
                return Err(invalid("logging dir cannot be empty when set"));
            }
        }

        Ok(())
    }
}
