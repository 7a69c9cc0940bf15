//! # IMU Sampler
//!
//! Reads the accelerometer's X/Y/Z output registers in one burst and scales
//! the signed 16-bit words to m/s^2 using the configured full-scale range.
//!
//! Raw bus transactions are an external collaborator behind the [`Bus`] trait.

use thiserror::Error;
use tracing::debug;

use crate::board::{BoardProfile, ByteOrder};
use crate::catalog::MetricId;
use crate::error::{Result, TelemetryError};
use crate::sample::{Sample, SampleValue};

/// Standard gravity in m/s^2
pub const STANDARD_GRAVITY: f64 = 9.80665;

/// Bytes read per sample: three 16-bit words
pub const ACCEL_READ_LEN: usize = 6;

/// Bus transaction failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BusError {
    #[error("no acknowledge from device 0x{0:02X}")]
    Nack(u8),

    #[error("bus transaction timed out")]
    Timeout,
}

/// Register-level access to a peripheral bus (I2C/SPI)
///
/// Implementations must fail fast with a bounded timeout.
#[cfg_attr(test, mockall::automock)]
pub trait Bus {
    /// Read `buf.len()` bytes starting at `register` of device `address`
    fn read_register(
        &mut self,
        address: u8,
        register: u8,
        buf: &mut [u8],
    ) -> std::result::Result<(), BusError>;
}

/// Accelerometer sampler bound to one board profile
#[derive(Debug, Clone, Copy)]
pub struct ImuSampler {
    address: u8,
    register: u8,
    byte_order: ByteOrder,
    scale: f64,
}

impl ImuSampler {
    pub fn new(profile: &BoardProfile) -> Self {
        Self {
            address: profile.accel_address,
            register: profile.accel_register,
            byte_order: profile.byte_order,
            scale: f64::from(profile.g_range) * STANDARD_GRAVITY / 32768.0,
        }
    }

    /// m/s^2 per least significant bit
    pub fn scale(&self) -> f64 {
        self.scale
    }

    /// Scale a raw 6-byte burst into X/Y/Z acceleration
    pub fn convert(&self, raw: &[u8; ACCEL_READ_LEN]) -> [f64; 3] {
        let word = |i: usize| {
            let pair = [raw[i * 2], raw[i * 2 + 1]];
            match self.byte_order {
                ByteOrder::Little => i16::from_le_bytes(pair),
                ByteOrder::Big => i16::from_be_bytes(pair),
            }
        };
        [
            f64::from(word(0)) * self.scale,
            f64::from(word(1)) * self.scale,
            f64::from(word(2)) * self.scale,
        ]
    }

    /// Take one reading and produce X/Y/Z samples sharing `timestamp_us`
    ///
    /// # Errors
    ///
    /// Returns [`TelemetryError::SensorUnavailable`] if the bus transaction
    /// fails. Callers drop this tick and sample again on the next one.
    pub fn sample<B: Bus + ?Sized>(&self, bus: &mut B, timestamp_us: u64) -> Result<[Sample; 3]> {
        let mut raw = [0u8; ACCEL_READ_LEN];
        bus.read_register(self.address, self.register, &mut raw)
            .map_err(|e| {
                debug!("Accelerometer read at 0x{:02X} failed: {}", self.address, e);
                TelemetryError::SensorUnavailable(e.to_string())
            })?;

        let [x, y, z] = self.convert(&raw);
        Ok([
            Sample::new(MetricId::ImuAccelX, timestamp_us, SampleValue::Double(x)),
            Sample::new(MetricId::ImuAccelY, timestamp_us, SampleValue::Double(y)),
            Sample::new(MetricId::ImuAccelZ, timestamp_us, SampleValue::Double(z)),
        ])
    }
}

/// In-process bus for hosts without an accelerometer
///
/// Answers reads at the profile's address with a level, stationary board:
/// 0 g on X and Y, +1 g on Z. Any other address is not acknowledged.
#[derive(Debug, Clone)]
pub struct SimulatedBus {
    address: u8,
    words: [u8; ACCEL_READ_LEN],
}

impl SimulatedBus {
    pub fn new(profile: &BoardProfile) -> Self {
        let one_g = (32768 / i32::from(profile.g_range.max(1))).min(i32::from(i16::MAX)) as i16;
        let z = match profile.byte_order {
            ByteOrder::Little => one_g.to_le_bytes(),
            ByteOrder::Big => one_g.to_be_bytes(),
        };
        Self {
            address: profile.accel_address,
            words: [0, 0, 0, 0, z[0], z[1]],
        }
    }
}

impl Bus for SimulatedBus {
    fn read_register(
        &mut self,
        address: u8,
        _register: u8,
        buf: &mut [u8],
    ) -> std::result::Result<(), BusError> {
        if address != self.address {
            return Err(BusError::Nack(address));
        }
        let n = buf.len().min(ACCEL_READ_LEN);
        buf[..n].copy_from_slice(&self.words[..n]);
        Ok(())
    }
}
