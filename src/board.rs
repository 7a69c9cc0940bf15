//! # Board Profile
//!
//! Hardware capabilities resolved once at startup and injected into the
//! sensor adapters, instead of scattering board conditionals through the code.

use serde::Deserialize;

use crate::config::BoardConfig;

/// Supported accelerometers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccelModel {
    /// MEMSIC MC3419 (built into the Challenger 2040)
    Mc3419,
    /// InvenSense MPU-9250
    Mpu9250,
}

/// Byte order of the accelerometer's 16-bit output words
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    Little,
    Big,
}

impl AccelModel {
    /// 7-bit bus address
    pub const fn address(self) -> u8 {
        match self {
            AccelModel::Mc3419 => 0x4C,
            AccelModel::Mpu9250 => 0x68,
        }
    }

    /// First of six X/Y/Z output registers
    pub const fn data_register(self) -> u8 {
        match self {
            AccelModel::Mc3419 => 0x0D,
            AccelModel::Mpu9250 => 0x3B,
        }
    }

    /// Byte order of each output word
    pub const fn byte_order(self) -> ByteOrder {
        match self {
            AccelModel::Mc3419 => ByteOrder::Little,
            AccelModel::Mpu9250 => ByteOrder::Big,
        }
    }
}

/// Where IMU readings come from on this host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImuSource {
    /// In-process bus reporting a level, stationary board
    Simulated,
    /// No accelerometer fitted, IMU sampling disabled
    None,
}

/// Resolved hardware description
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoardProfile {
    pub accel_model: AccelModel,
    pub accel_address: u8,
    pub accel_register: u8,
    pub byte_order: ByteOrder,
    /// Full-scale range in g (±)
    pub g_range: u8,
    pub imu_source: ImuSource,
    pub gps_port: String,
    pub gps_baud: u32,
}

impl BoardProfile {
    /// Resolve the profile for a validated board configuration
    pub fn from_config(board: &BoardConfig) -> Self {
        let model = board.accel_model;
        Self {
            accel_model: model,
            accel_address: model.address(),
            accel_register: model.data_register(),
            byte_order: model.byte_order(),
            g_range: board.g_range,
            imu_source: board.imu_source,
            gps_port: board.gps_port.clone(),
            gps_baud: board.gps_baud,
        }
    }
}
