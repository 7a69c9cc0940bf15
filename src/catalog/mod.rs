//! # Metric Catalog
//!
//! Static dataset describing every metric the unit can export.
//!
//! Descriptors are addressed by a dense index. The built-in ordering is fixed
//! by [`MetricId`] so collectors see consistent indexing across restarts. The
//! catalog is immutable once built and is shared by copy (it only holds a
//! `&'static` slice), so producers and the encoder read it without
//! synchronization.
//!
//! | Index | Name | Kind | Unit |
//! |-------|------|------|------|
//! | 0-2 | `imu.accel.{x,y,z}` | double | m/s^2 |
//! | 3-4 | `gps.{latitude,longitude}` | double | deg |
//! | 5 | `gps.altitude` | double | m |
//! | 6 | `gps.speed` | double | m/s |
//! | 7 | `gps.satellites` | int64 | 1 |
//! | 8 | `gps.fix_valid` | boolean | 1 |
//! | 9 | `system.uptime` | int64 | s |
//! | 10 | `system.buffer.occupancy` | int64 | 1 |
//! | 11 | `system.buffer.evicted` | int64 | 1 |

use crate::error::{Result, TelemetryError};

/// Value representation of a metric's data points
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Int64,
    Double,
    Boolean,
}

/// Where a metric's samples come from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    ImuX,
    ImuY,
    ImuZ,
    GpsLat,
    GpsLon,
    GpsAlt,
    GpsSpeed,
    GpsSatellites,
    GpsFixValid,
    SystemUptime,
    SystemBufferOccupancy,
    SystemBufferEvicted,
}

/// Schema entry for one metric
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricDescriptor {
    /// Identifier as it appears in the exported `Metric.name`
    pub name: &'static str,

    /// Human readable `Metric.description`
    pub description: &'static str,

    /// UCUM-style unit string
    pub unit: &'static str,

    /// Data point value kind
    pub value_kind: ValueKind,

    /// Producing sensor
    pub source: Source,

    /// Decimal places kept when encoding doubles (ignored for other kinds)
    pub precision: u8,
}

/// Built-in metric identifiers, in catalog order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum MetricId {
    ImuAccelX = 0,
    ImuAccelY = 1,
    ImuAccelZ = 2,
    GpsLatitude = 3,
    GpsLongitude = 4,
    GpsAltitude = 5,
    GpsSpeed = 6,
    GpsSatellites = 7,
    GpsFixValid = 8,
    SystemUptime = 9,
    SystemBufferOccupancy = 10,
    SystemBufferEvicted = 11,
}

impl MetricId {
    /// Dense catalog index of this metric
    pub const fn index(self) -> u16 {
        self as u16
    }
}

/// Number of built-in metrics
pub const METRIC_COUNT: usize = 12;

/// Built-in descriptor table, indexed by [`MetricId`]
pub static METRICS: [MetricDescriptor; METRIC_COUNT] = [
    MetricDescriptor {
        name: "imu.accel.x",
        description: "Acceleration along the board X axis",
        unit: "m/s^2",
        value_kind: ValueKind::Double,
        source: Source::ImuX,
        precision: 3,
    },
    MetricDescriptor {
        name: "imu.accel.y",
        description: "Acceleration along the board Y axis",
        unit: "m/s^2",
        value_kind: ValueKind::Double,
        source: Source::ImuY,
        precision: 3,
    },
    MetricDescriptor {
        name: "imu.accel.z",
        description: "Acceleration along the board Z axis",
        unit: "m/s^2",
        value_kind: ValueKind::Double,
        source: Source::ImuZ,
        precision: 3,
    },
    MetricDescriptor {
        name: "gps.latitude",
        description: "WGS84 latitude of the last valid fix",
        unit: "deg",
        value_kind: ValueKind::Double,
        source: Source::GpsLat,
        precision: 6,
    },
    MetricDescriptor {
        name: "gps.longitude",
        description: "WGS84 longitude of the last valid fix",
        unit: "deg",
        value_kind: ValueKind::Double,
        source: Source::GpsLon,
        precision: 6,
    },
    MetricDescriptor {
        name: "gps.altitude",
        description: "Altitude above mean sea level",
        unit: "m",
        value_kind: ValueKind::Double,
        source: Source::GpsAlt,
        precision: 1,
    },
    MetricDescriptor {
        name: "gps.speed",
        description: "Speed over ground",
        unit: "m/s",
        value_kind: ValueKind::Double,
        source: Source::GpsSpeed,
        precision: 2,
    },
    MetricDescriptor {
        name: "gps.satellites",
        description: "Satellites used in the fix",
        unit: "1",
        value_kind: ValueKind::Int64,
        source: Source::GpsSatellites,
        precision: 0,
    },
    MetricDescriptor {
        name: "gps.fix_valid",
        description: "Whether the receiver reports a valid fix",
        unit: "1",
        value_kind: ValueKind::Boolean,
        source: Source::GpsFixValid,
        precision: 0,
    },
    MetricDescriptor {
        name: "system.uptime",
        description: "Seconds since the unit booted",
        unit: "s",
        value_kind: ValueKind::Int64,
        source: Source::SystemUptime,
        precision: 0,
    },
    MetricDescriptor {
        name: "system.buffer.occupancy",
        description: "Samples waiting in the software buffer",
        unit: "1",
        value_kind: ValueKind::Int64,
        source: Source::SystemBufferOccupancy,
        precision: 0,
    },
    MetricDescriptor {
        name: "system.buffer.evicted",
        description: "Samples evicted by the overflow policy since boot",
        unit: "1",
        value_kind: ValueKind::Int64,
        source: Source::SystemBufferEvicted,
        precision: 0,
    },
];

/// Immutable, explicitly sized view over a descriptor table
#[derive(Debug, Clone, Copy)]
pub struct MetricCatalog {
    descriptors: &'static [MetricDescriptor],
}

impl MetricCatalog {
    /// Catalog over the built-in [`METRICS`] table
    pub fn builtin() -> Self {
        Self {
            descriptors: &METRICS,
        }
    }

    /// Build a catalog over an arbitrary static table
    ///
    /// # Errors
    ///
    /// Returns [`TelemetryError::Catalog`] if the table is empty, larger than
    /// a `u16` index can address, or contains empty or duplicate names.
    pub fn new(descriptors: &'static [MetricDescriptor]) -> Result<Self> {
        if descriptors.is_empty() {
            return Err(TelemetryError::Catalog("catalog has no descriptors".into()));
        }

        if descriptors.len() > u16::MAX as usize {
            return Err(TelemetryError::Catalog(format!(
                "catalog has {} descriptors, at most {} are addressable",
                descriptors.len(),
                u16::MAX
            )));
        }

        for (i, descriptor) in descriptors.iter().enumerate() {
            if descriptor.name.is_empty() {
                return Err(TelemetryError::Catalog(format!(
                    "descriptor {} has an empty name",
                    i
                )));
            }

            if descriptors[..i].iter().any(|d| d.name == descriptor.name) {
                return Err(TelemetryError::Catalog(format!(
                    "duplicate metric name '{}' at index {}",
                    descriptor.name, i
                )));
            }
        }

        Ok(Self { descriptors })
    }

    /// Number of metric types
    pub fn count(&self) -> usize {
        self.descriptors.len()
    }

    /// Descriptor at `index`
    ///
    /// # Errors
    ///
    /// Returns [`TelemetryError::Catalog`] if `index >= count()`.
    pub fn describe(&self, index: u16) -> Result<&'static MetricDescriptor> {
        self.descriptors.get(index as usize).ok_or_else(|| {
            TelemetryError::Catalog(format!(
                "metric index {} out of range (catalog has {})",
                index,
                self.descriptors.len()
            ))
        })
    }

    /// Startup-time lookup of the index serving `source`
    pub fn index_of(&self, source: Source) -> Option<u16> {
        self.descriptors
            .iter()
            .position(|d| d.source == source)
            .map(|i| i as u16)
    }
}

impl Default for MetricCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_count() {
        let catalog = MetricCatalog::builtin();
        assert_eq!(catalog.count(), METRIC_COUNT);
    }

    #[test]
    fn test_metric_id_matches_table_order() {
        let catalog = MetricCatalog::builtin();
        let expected = [
            (MetricId::ImuAccelX, Source::ImuX),
            (MetricId::ImuAccelY, Source::ImuY),
            (MetricId::ImuAccelZ, Source::ImuZ),
            (MetricId::GpsLatitude, Source::GpsLat),
            (MetricId::GpsLongitude, Source::GpsLon),
            (MetricId::GpsAltitude, Source::GpsAlt),
            (MetricId::GpsSpeed, Source::GpsSpeed),
            (MetricId::GpsSatellites, Source::GpsSatellites),
            (MetricId::GpsFixValid, Source::GpsFixValid),
            (MetricId::SystemUptime, Source::SystemUptime),
            (MetricId::SystemBufferOccupancy, Source::SystemBufferOccupancy),
            (MetricId::SystemBufferEvicted, Source::SystemBufferEvicted),
        ];

        for (id, source) in expected {
            let descriptor = catalog.describe(id.index()).unwrap();
            assert_eq!(descriptor.source, source, "wrong source for {:?}", id);
            assert_eq!(catalog.index_of(source), Some(id.index()));
        }
    }

    #[test]
    fn test_describe_out_of_range() {
        let catalog = MetricCatalog::builtin();
        let result = catalog.describe(METRIC_COUNT as u16);
        assert!(matches!(result, Err(TelemetryError::Catalog(_))));
        assert!(result.unwrap_err().is_fatal());
    }

    #[test]
    fn test_builtin_names_are_valid() {
        assert!(MetricCatalog::new(&METRICS).is_ok());
    }

    #[test]
    fn test_new_rejects_empty_table() {
        static EMPTY: [MetricDescriptor; 0] = [];
        assert!(MetricCatalog::new(&EMPTY).is_err());
    }

    #[test]
    fn test_new_rejects_duplicate_names() {
        static DUPLICATE: [MetricDescriptor; 2] = [
            MetricDescriptor {
                name: "a",
                description: "",
                unit: "1",
                value_kind: ValueKind::Int64,
                source: Source::SystemUptime,
                precision: 0,
            },
            MetricDescriptor {
                name: "a",
                description: "",
                unit: "1",
                value_kind: ValueKind::Int64,
                source: Source::SystemBufferEvicted,
                precision: 0,
            },
        ];
        assert!(MetricCatalog::new(&DUPLICATE).is_err());
    }

    #[test]
    fn test_doubles_declare_precision() {
        for descriptor in METRICS.iter() {
            if descriptor.value_kind == ValueKind::Double {
                assert!(descriptor.precision > 0, "{} has no precision", descriptor.name);
            }
        }
    }
}
