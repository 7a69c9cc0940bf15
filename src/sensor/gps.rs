//! # GPS Adapter
//!
//! Pulls bytes from the serial collaborator into the NMEA parser and turns
//! committed fixes into samples.

use std::collections::VecDeque;

use bytes::{Buf, Bytes};
use heapless::Vec;
use tokio::sync::mpsc;
use tracing::debug;

use super::nmea::{GpsFix, NmeaParser};
use crate::catalog::MetricId;
use crate::fifo::SampleFifo;
use crate::sample::{Sample, SampleValue};

/// Samples produced per committed fix, at most
pub const SAMPLES_PER_FIX: usize = 6;

/// Non-blocking byte delivery from the GPS UART
pub trait ByteSource {
    /// Next received byte, or `None` if nothing is waiting
    fn read_byte_if_available(&mut self) -> Option<u8>;
}

impl ByteSource for VecDeque<u8> {
    fn read_byte_if_available(&mut self) -> Option<u8> {
        self.pop_front()
    }
}

/// Byte source fed in chunks by a serial reader task
#[derive(Debug)]
pub struct ChannelByteSource {
    rx: mpsc::Receiver<Bytes>,
    chunk: Bytes,
}

impl ChannelByteSource {
    pub fn new(rx: mpsc::Receiver<Bytes>) -> Self {
        Self {
            rx,
            chunk: Bytes::new(),
        }
    }
}

impl ByteSource for ChannelByteSource {
    fn read_byte_if_available(&mut self) -> Option<u8> {
        while !self.chunk.has_remaining() {
            self.chunk = self.rx.try_recv().ok()?;
        }
        Some(self.chunk.get_u8())
    }
}

/// Outcome of one poll
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct GpsPoll {
    /// Bytes consumed from the source
    pub bytes: usize,
    /// Position sentences committed
    pub fixes: usize,
    /// Sentences discarded
    pub malformed: usize,
    /// Samples accepted by the FIFO
    pub samples: usize,
}

/// Samples for a committed fix, sharing one timestamp
///
/// Satellite count and validity are always reported; position, altitude and
/// speed only while the fix is valid.
pub fn fix_samples(fix: &GpsFix, timestamp_us: u64) -> Vec<Sample, SAMPLES_PER_FIX> {
    let mut samples = Vec::new();

    // Capacity covers every push below
    let _ = samples.push(Sample::new(
        MetricId::GpsSatellites,
        timestamp_us,
        SampleValue::Int(i64::from(fix.satellites)),
    ));
    let _ = samples.push(Sample::new(
        MetricId::GpsFixValid,
        timestamp_us,
        SampleValue::Bool(fix.valid),
    ));

    if fix.valid {
        for (metric, value) in [
            (MetricId::GpsLatitude, fix.latitude),
            (MetricId::GpsLongitude, fix.longitude),
            (MetricId::GpsAltitude, fix.altitude_m),
            (MetricId::GpsSpeed, fix.speed_mps),
        ] {
            let _ = samples.push(Sample::new(metric, timestamp_us, SampleValue::Double(value)));
        }
    }
    samples
}

/// NMEA parser plus the per-poll byte budget
#[derive(Debug)]
pub struct GpsAdapter {
    parser: NmeaParser,
    budget: usize,
}

impl GpsAdapter {
    /// Adapter consuming at most `budget` bytes per poll
    pub fn new(parser: NmeaParser, budget: usize) -> Self {
        Self {
            parser,
            budget: budget.max(1),
        }
    }

    pub fn parser(&self) -> &NmeaParser {
        &self.parser
    }

    /// Drain available bytes (up to the budget) and push fix samples
    ///
    /// Malformed sentences are logged and skipped; the last good fix stays in
    /// place. The poll never waits for bytes.
    pub fn poll<S: ByteSource + ?Sized>(
        &mut self,
        source: &mut S,
        fifo: &mut SampleFifo,
        timestamp_us: u64,
    ) -> GpsPoll {
        let mut outcome = GpsPoll::default();

        while outcome.bytes < self.budget {
            let Some(byte) = source.read_byte_if_available() else {
                break;
            };
            outcome.bytes += 1;

            match self.parser.feed(byte) {
                Ok(Some(fix)) => {
                    outcome.fixes += 1;
                    for sample in fix_samples(&fix, timestamp_us) {
                        match fifo.push(sample) {
                            Ok(()) => outcome.samples += 1,
                            Err(e) => debug!("Dropped GPS sample: {}", e),
                        }
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    outcome.malformed += 1;
                    debug!("Discarded NMEA sentence: {}", e);
                }
            }
        }

        outcome
    }
}
