//! # Health Sampler
//!
//! Device health metrics derived from the pipeline's own state.

use crate::catalog::MetricId;
use crate::fifo::FifoStats;
use crate::sample::{Sample, SampleValue};

/// Uptime, buffer occupancy and eviction count at `timestamp_us`
pub fn health_samples(timestamp_us: u64, stats: &FifoStats) -> [Sample; 3] {
    let clamp = |v: u64| i64::try_from(v).unwrap_or(i64::MAX);
    [
        Sample::new(
            MetricId::SystemUptime,
            timestamp_us,
            SampleValue::Int(clamp(timestamp_us / 1_000_000)),
        ),
        Sample::new(
            MetricId::SystemBufferOccupancy,
            timestamp_us,
            SampleValue::Int(clamp(stats.occupancy as u64)),
        ),
        Sample::new(
            MetricId::SystemBufferEvicted,
            timestamp_us,
            SampleValue::Int(clamp(stats.evicted)),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_samples() {
        let stats = FifoStats {
            pushed: 100,
            evicted: 7,
            hardware_overflows: 0,
            occupancy: 42,
            in_flight: 0,
        };
        let samples = health_samples(90_500_000, &stats);

        assert_eq!(samples[0].metric_index, MetricId::SystemUptime.index());
        assert_eq!(samples[0].value, SampleValue::Int(90));
        assert_eq!(samples[1].value, SampleValue::Int(42));
        assert_eq!(samples[2].value, SampleValue::Int(7));
        assert!(samples.iter().all(|s| s.timestamp_us == 90_500_000));
    }
}
