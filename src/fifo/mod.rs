//! # Sample FIFO
//!
//! Two-tier bounded buffer between the sensor adapters and the batch encoder.
//!
//! - **Hardware tier**: 8 slots, fed by producers outside the main loop (see
//!   [`hardware::HardwareTier`]), emptied frequently by [`SampleFifo::service`].
//! - **Software tier**: a circular buffer allocated once at startup with the
//!   configured capacity, holding samples pending export.
//!
//! ## Overflow policy
//!
//! Producers run on a real-time sampling cadence and must never block. When the
//! software tier is full and another sample arrives, the **oldest** queued
//! sample is evicted to make room. This is intentional bounded loss that
//! favours recent data; every eviction is counted in [`FifoStats::evicted`].
//!
//! ## Drain / commit / restore
//!
//! [`SampleFifo::drain_up_to`] hands the oldest samples out as a [`Drained`]
//! range. The range must be given back exactly once:
//!
//! - [`SampleFifo::commit`] after the collector acknowledged the payload, which
//!   releases the samples permanently;
//! - [`SampleFifo::restore`] after an encoding or transport failure, which puts
//!   them back at the head in their original order. If new pushes filled the
//!   buffer in the meantime the overflow policy applies, and since restored
//!   samples are the oldest, they are the ones evicted.
//!
//! `Drained` is move-only, so a range can never be both committed and restored.

pub mod hardware;

use std::collections::VecDeque;

use tracing::{debug, warn};

use crate::error::Result;
use crate::sample::Sample;

pub use hardware::{HardwareTier, HARDWARE_FIFO_SLOTS};

/// Counters describing buffer health
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FifoStats {
    /// Samples accepted since boot
    pub pushed: u64,

    /// Samples dropped by the oldest-first overflow policy
    pub evicted: u64,

    /// Pushes rejected by a full hardware tier
    pub hardware_overflows: u64,

    /// Samples waiting in the software tier
    pub occupancy: usize,

    /// Samples drained but not yet committed or restored
    pub in_flight: usize,
}

/// Samples drained from the FIFO, pending commit or restore
#[derive(Debug)]
#[must_use = "a drained range must be committed or restored"]
pub struct Drained {
    id: u64,
    samples: Vec<Sample>,
}

impl Drained {
    /// Drain sequence number, for log correlation
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Samples in original FIFO order
    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Split into (kept, rest), each preserving original relative order
    ///
    /// Both halves remain owed to the FIFO and keep the drain id.
    pub fn partition<F>(self, mut keep: F) -> (Drained, Drained)
    where
        F: FnMut(usize, &Sample) -> bool,
    {
        let mut kept = Vec::with_capacity(self.samples.len());
        let mut rest = Vec::new();
        for (position, sample) in self.samples.into_iter().enumerate() {
            if keep(position, &sample) {
                kept.push(sample);
            } else {
                rest.push(sample);
            }
        }
        (
            Drained {
                id: self.id,
                samples: kept,
            },
            Drained {
                id: self.id,
                samples: rest,
            },
        )
    }
}

/// Two-tier sample buffer
#[derive(Debug)]
pub struct SampleFifo {
    hardware: HardwareTier,
    software: VecDeque<Sample>,
    capacity: usize,
    next_drain_id: u64,
    in_flight: usize,
    pushed: u64,
    evicted: u64,
}

impl SampleFifo {
    /// Create a FIFO whose software tier holds at most `capacity` samples
    ///
    /// A zero capacity is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            hardware: HardwareTier::new(),
            software: VecDeque::with_capacity(capacity),
            capacity,
            next_drain_id: 0,
            in_flight: 0,
            pushed: 0,
            evicted: 0,
        }
    }

    /// Handle for producers outside the main loop
    pub fn hardware(&self) -> HardwareTier {
        self.hardware.clone()
    }

    /// Queue a sample from the main loop
    ///
    /// Goes through the hardware tier like every other producer so ordering
    /// between producers is preserved. A full hardware tier is serviced first.
    ///
    /// # Errors
    ///
    /// Returns `BufferFull` only if another context refilled the hardware tier
    /// between the service and the retry.
    pub fn push(&mut self, sample: Sample) -> Result<()> {
        if self.hardware.push(sample).is_ok() {
            return Ok(());
        }

        self.service();
        self.hardware.push(sample)
    }

    /// Move everything from the hardware tier into the software tier
    ///
    /// Returns the number of samples moved.
    pub fn service(&mut self) -> usize {
        let mut incoming = Vec::with_capacity(HARDWARE_FIFO_SLOTS);
        let moved = self.hardware.drain_into(|sample| incoming.push(sample));
        for sample in incoming {
            self.accept(sample);
        }
        moved
    }

    fn accept(&mut self, sample: Sample) {
        if self.software.len() >= self.capacity {
            self.software.pop_front();
            self.evicted += 1;
            debug!(evicted = self.evicted, "Software tier full, evicted oldest sample");
        }
        self.software.push_back(sample);
        self.pushed += 1;
    }

    /// Take up to `n` of the oldest samples
    ///
    /// The hardware tier is serviced first so freshly acquired samples are
    /// visible. The returned range must be passed to [`commit`](Self::commit)
    /// or [`restore`](Self::restore).
    pub fn drain_up_to(&mut self, n: usize) -> Drained {
        self.service();

        let take = n.min(self.software.len());
        let samples: Vec<Sample> = self.software.drain(..take).collect();

        let id = self.next_drain_id;
        self.next_drain_id = self.next_drain_id.wrapping_add(1);
        self.in_flight += samples.len();

        Drained { id, samples }
    }

    /// Permanently release a drained range
    pub fn commit(&mut self, range: Drained) {
        self.in_flight = self.in_flight.saturating_sub(range.len());
        debug!(drain = range.id, samples = range.len(), "Committed drained range");
    }

    /// Put a drained range back at the head, oldest first
    ///
    /// Returns how many of the restored samples were evicted because the
    /// software tier filled up while they were out.
    pub fn restore(&mut self, range: Drained) -> usize {
        self.in_flight = self.in_flight.saturating_sub(range.len());

        let free = self.capacity - self.software.len();
        let overflow = range.len().saturating_sub(free);
        if overflow > 0 {
            self.evicted += overflow as u64;
            warn!(
                drain = range.id,
                evicted = overflow,
                "Buffer filled while range was out, evicting oldest restored samples"
            );
        }

        for sample in range.samples.into_iter().skip(overflow).rev() {
            self.software.push_front(sample);
        }
        overflow
    }

    /// Samples waiting in the software tier
    pub fn len(&self) -> usize {
        self.software.len()
    }

    /// Whether both tiers are empty
    pub fn is_empty(&self) -> bool {
        self.software.is_empty() && self.hardware.is_empty()
    }

    /// Software tier capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Software tier contents, oldest first
    pub fn iter(&self) -> impl Iterator<Item = &Sample> {
        self.software.iter()
    }

    /// Current counters
    pub fn stats(&self) -> FifoStats {
        FifoStats {
            pushed: self.pushed,
            evicted: self.evicted,
            hardware_overflows: self.hardware.overflows(),
            occupancy: self.software.len(),
            in_flight: self.in_flight,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::SampleValue;

    fn sample(metric_index: u16, ts: u64) -> Sample {
        Sample {
            metric_index,
            timestamp_us: ts,
            value: SampleValue::Int(ts as i64),
        }
    }

    fn timestamps(fifo: &SampleFifo) -> Vec<u64> {
        fifo.iter().map(|s| s.timestamp_us).collect()
    }

    #[test]
    fn test_drain_returns_oldest_first() {
        let mut fifo = SampleFifo::new(16);
        for ts in 0..5 {
            fifo.push(sample(0, ts)).unwrap();
        }

        let drained = fifo.drain_up_to(3);
        let ts: Vec<u64> = drained.samples().iter().map(|s| s.timestamp_us).collect();
        assert_eq!(ts, vec![0, 1, 2]);
        assert_eq!(timestamps(&fifo), vec![3, 4]);
        fifo.commit(drained);
    }

    #[test]
    fn test_order_preserved_across_many_services() {
        let mut fifo = SampleFifo::new(100);
        for ts in 0..50 {
            fifo.push(sample(0, ts)).unwrap();
        }

        let drained = fifo.drain_up_to(100);
        let ts: Vec<u64> = drained.samples().iter().map(|s| s.timestamp_us).collect();
        assert_eq!(ts, (0..50).collect::<Vec<_>>());
        fifo.commit(drained);
    }

    #[test]
    fn test_overflow_evicts_oldest() {
        let mut fifo = SampleFifo::new(8);
        for ts in 0..10 {
            fifo.push(sample(0, ts)).unwrap();
        }
        fifo.service();

        assert_eq!(timestamps(&fifo), (2..10).collect::<Vec<_>>());
        assert_eq!(fifo.stats().evicted, 2);
    }

    #[test]
    fn test_overflow_keeps_newest_capacity_samples() {
        for k in 1..20u64 {
            let mut fifo = SampleFifo::new(8);
            for ts in 0..8 + k {
                fifo.push(sample(0, ts)).unwrap();
            }
            fifo.service();
            assert_eq!(timestamps(&fifo), (k..8 + k).collect::<Vec<_>>());
            assert_eq!(fifo.stats().evicted, k);
        }
    }

    #[test]
    fn test_restore_is_identity() {
        let mut fifo = SampleFifo::new(32);
        for ts in 0..12 {
            fifo.push(sample((ts % 3) as u16, ts)).unwrap();
        }
        fifo.service();
        let before: Vec<Sample> = fifo.iter().copied().collect();

        let drained = fifo.drain_up_to(5);
        assert_eq!(fifo.stats().in_flight, 5);
        let evicted = fifo.restore(drained);

        assert_eq!(evicted, 0);
        assert_eq!(fifo.iter().copied().collect::<Vec<_>>(), before);
        assert_eq!(fifo.stats().in_flight, 0);
    }

    #[test]
    fn test_restore_goes_ahead_of_newer_pushes() {
        let mut fifo = SampleFifo::new(32);
        for ts in 0..4 {
            fifo.push(sample(0, ts)).unwrap();
        }
        let drained = fifo.drain_up_to(2);
        fifo.push(sample(0, 4)).unwrap();
        fifo.service();

        fifo.restore(drained);
        assert_eq!(timestamps(&fifo), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_restore_into_refilled_buffer_evicts_restored_oldest() {
        let mut fifo = SampleFifo::new(4);
        for ts in 0..4 {
            fifo.push(sample(0, ts)).unwrap();
        }
        let drained = fifo.drain_up_to(3);
        for ts in 4..7 {
            fifo.push(sample(0, ts)).unwrap();
        }
        fifo.service();
        assert_eq!(timestamps(&fifo), vec![3, 4, 5, 6]);

        let evicted = fifo.restore(drained);
        assert_eq!(evicted, 3);
        assert_eq!(timestamps(&fifo), vec![3, 4, 5, 6]);
        assert_eq!(fifo.stats().evicted, 3);
    }

    #[test]
    fn test_restore_partially_fits() {
        let mut fifo = SampleFifo::new(4);
        for ts in 0..4 {
            fifo.push(sample(0, ts)).unwrap();
        }
        let drained = fifo.drain_up_to(3);
        fifo.push(sample(0, 4)).unwrap();
        fifo.service();

        let evicted = fifo.restore(drained);
        assert_eq!(evicted, 1);
        assert_eq!(timestamps(&fifo), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_commit_releases_in_flight() {
        let mut fifo = SampleFifo::new(8);
        for ts in 0..3 {
            fifo.push(sample(0, ts)).unwrap();
        }
        let drained = fifo.drain_up_to(8);
        assert_eq!(drained.len(), 3);
        fifo.commit(drained);

        let stats = fifo.stats();
        assert_eq!(stats.in_flight, 0);
        assert_eq!(stats.occupancy, 0);
        assert!(fifo.is_empty());
    }

    #[test]
    fn test_drain_empty() {
        let mut fifo = SampleFifo::new(8);
        let drained = fifo.drain_up_to(10);
        assert!(drained.is_empty());
        fifo.commit(drained);
    }

    #[test]
    fn test_drain_ids_increase() {
        let mut fifo = SampleFifo::new(8);
        let first = fifo.drain_up_to(1);
        let second = fifo.drain_up_to(1);
        assert_eq!(second.id(), first.id() + 1);
        fifo.commit(first);
        fifo.commit(second);
    }

    #[test]
    fn test_partition_preserves_order() {
        let mut fifo = SampleFifo::new(16);
        for ts in 0..6 {
            fifo.push(sample((ts % 2) as u16, ts)).unwrap();
        }
        let drained = fifo.drain_up_to(6);
        let (even, odd) = drained.partition(|_, s| s.metric_index == 0);

        let even_ts: Vec<u64> = even.samples().iter().map(|s| s.timestamp_us).collect();
        let odd_ts: Vec<u64> = odd.samples().iter().map(|s| s.timestamp_us).collect();
        assert_eq!(even_ts, vec![0, 2, 4]);
        assert_eq!(odd_ts, vec![1, 3, 5]);
        assert_eq!(even.id(), odd.id());

        fifo.restore(odd);
        fifo.commit(even);
        assert_eq!(timestamps(&fifo), vec![1, 3, 5]);
        assert_eq!(fifo.stats().in_flight, 0);
    }

    #[test]
    fn test_push_services_full_hardware_tier() {
        let mut fifo = SampleFifo::new(64);
        for ts in 0..(HARDWARE_FIFO_SLOTS as u64 * 3) {
            assert!(fifo.push(sample(0, ts)).is_ok());
        }
        assert_eq!(fifo.stats().evicted, 0);
        assert!(fifo.len() >= HARDWARE_FIFO_SLOTS * 2);
    }

    #[test]
    fn test_external_producer_overflow_is_counted() {
        let fifo = SampleFifo::new(64);
        let feeder = fifo.hardware();
        for ts in 0..HARDWARE_FIFO_SLOTS as u64 {
            feeder.push(sample(0, ts)).unwrap();
        }
        assert!(feeder.push(sample(0, 99)).is_err());
        assert_eq!(fifo.stats().hardware_overflows, 1);
    }

    #[test]
    fn test_zero_capacity_is_raised() {
        let fifo = SampleFifo::new(0);
        assert_eq!(fifo.capacity(), 1);
    }
}
