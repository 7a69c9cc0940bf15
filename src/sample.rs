//! # Samples
//!
//! One timestamped observation of one metric.

use crate::catalog::{MetricId, ValueKind};

/// Tagged value matching a descriptor's [`ValueKind`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SampleValue {
    Int(i64),
    Double(f64),
    Bool(bool),
}

impl SampleValue {
    /// Kind this value encodes as
    pub fn kind(&self) -> ValueKind {
        match self {
            SampleValue::Int(_) => ValueKind::Int64,
            SampleValue::Double(_) => ValueKind::Double,
            SampleValue::Bool(_) => ValueKind::Boolean,
        }
    }
}

/// A single observation, copied by value through the pipeline
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    /// Dense index into the metric catalog
    pub metric_index: u16,

    /// Monotonic device time in microseconds since boot
    pub timestamp_us: u64,

    /// Observed value
    pub value: SampleValue,
}

impl Sample {
    /// Sample for a built-in metric
    pub fn new(metric: MetricId, timestamp_us: u64, value: SampleValue) -> Self {
        Self {
            metric_index: metric.index(),
            timestamp_us,
            value,
        }
    }
}
