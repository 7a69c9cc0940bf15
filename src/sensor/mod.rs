//! # Sensor Adapters Module
//!
//! Producers that turn raw hardware input into timestamped samples.
//!
//! This module handles:
//! - Accelerometer burst reads and full-scale conversion
//! - NMEA 0183 stream parsing into position fixes
//! - Device health metrics from pipeline state

pub mod gps;
pub mod health;
pub mod imu;
pub mod nmea;
