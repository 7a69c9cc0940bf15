//! # Field Telemetry Library
//!
//! Fuse GPS position, accelerometer readings and device health into
//! OpenTelemetry metrics, exported over an unreliable uplink.
//!
//! This library provides the acquisition and export pipeline: sensor
//! adapters feed a bounded two-tier sample FIFO, a batch encoder drains it
//! into size-bounded OTLP protobuf payloads, and the exporter hands them to
//! the collector, releasing samples only once they are acknowledged.

pub mod board;
pub mod catalog;
pub mod config;
pub mod error;
pub mod export;
pub mod fifo;
pub mod otlp;
pub mod pipeline;
pub mod sample;
pub mod sensor;
pub mod serial;
