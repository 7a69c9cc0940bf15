//! # OTLP Encoding
//!
//! Serializes drained samples into OpenTelemetry metrics protobuf
//! (`ExportMetricsServiceRequest`), bounded by a payload ceiling.
//!
//! The schema subset is small and fixed, so messages are written directly
//! with [`wire`] primitives instead of going through generated types.

#[cfg(test)]
pub(crate) mod decode;
pub mod encoder;
pub mod wire;

pub use encoder::{
    BatchEncoder, EncoderConfig, Payload, DEFAULT_BATCH_LIMIT, MAX_PROTOBUF_BYTES, SCOPE_NAME,
};
