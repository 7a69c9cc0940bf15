//! # Error Types
//!
//! Custom error types for the telemetry pipeline using `thiserror`.
//!
//! Every variant except [`TelemetryError::Catalog`] is a runtime transient
//! that the pipeline recovers from locally. Catalog errors indicate a build or
//! configuration defect and halt acquisition.

use thiserror::Error;

use crate::sensor::nmea::NmeaError;

/// Main error type for the telemetry pipeline
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// Bus transaction timed out or was not acknowledged
    #[error("Sensor unavailable: {0}")]
    SensorUnavailable(String),

    /// NMEA sentence failed length or checksum validation
    #[error("Malformed NMEA sentence: {0}")]
    MalformedSentence(#[from] NmeaError),

    /// A buffer tier had no room for the sample
    #[error("Buffer full: {0}")]
    BufferFull(String),

    /// Not even a single data point fits under the payload ceiling
    #[error("Payload too large: {needed} bytes needed, ceiling is {ceiling} bytes")]
    PayloadTooLarge { needed: usize, ceiling: usize },

    /// Send timed out or the collector rejected the payload
    #[error("Transport failure: {0}")]
    TransportFailure(String),

    /// Metric catalog defect (out-of-range index, kind mismatch, bad descriptor)
    #[error("Metric catalog error: {0}")]
    Catalog(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serial port errors
    #[error("Serial error: {0}")]
    Serial(String),
}

impl TelemetryError {
    /// Whether this error must halt acquisition.
    ///
    /// Only catalog defects are fatal; everything else degrades data
    /// completeness and the pipeline carries on with the next tick.
    pub fn is_fatal(&self) -> bool {
        matches!(self, TelemetryError::Catalog(_))
    }
}

/// Result type alias for the telemetry pipeline
pub type Result<T> = std::result::Result<T, TelemetryError>;
