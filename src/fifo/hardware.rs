//! # Hardware FIFO Tier
//!
//! Small fixed-capacity queue fed from interrupt/DMA-like contexts.
//!
//! This is the only structure touched by more than one execution context. Every
//! access holds the lock for a handful of slot copies and never blocks on I/O,
//! so it behaves as a short critical section rather than a blocking lock.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use heapless::Deque;

use crate::error::{Result, TelemetryError};
use crate::sample::Sample;

/// Hardware tier depth (8 x 32-bit slots on the RP2040 inter-core FIFO)
pub const HARDWARE_FIFO_SLOTS: usize = 8;

type Slots = Deque<Sample, HARDWARE_FIFO_SLOTS>;

/// Cloneable handle to the hardware tier
///
/// Producers running outside the main loop keep a clone and call
/// [`HardwareTier::push`]; the main loop empties it into the software tier.
#[derive(Debug, Clone)]
pub struct HardwareTier {
    slots: Arc<Mutex<Slots>>,
    overflows: Arc<AtomicU64>,
}

impl HardwareTier {
    /// Create an empty hardware tier
    pub fn new() -> Self {
        Self {
            slots: Arc::new(Mutex::new(Deque::new())),
            overflows: Arc::new(AtomicU64::new(0)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Slots> {
        // Poisoning cannot leave the deque half-written
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue a sample without blocking
    ///
    /// # Errors
    ///
    /// Returns [`TelemetryError::BufferFull`] when all slots are occupied. The
    /// caller keeps the sample (it is `Copy`) and may retry after a drain.
    pub fn push(&self, sample: Sample) -> Result<()> {
        let mut slots = self.lock();
        if slots.push_back(sample).is_err() {
            drop(slots);
            self.overflows.fetch_add(1, Ordering::Relaxed);
            return Err(TelemetryError::BufferFull(format!(
                "hardware tier full ({} slots)",
                HARDWARE_FIFO_SLOTS
            )));
        }
        Ok(())
    }

    /// Move every queued sample out, oldest first
    ///
    /// The lock is released before `sink` runs, so the callback may do
    /// arbitrary work without holding up producers.
    pub fn drain_into<F: FnMut(Sample)>(&self, mut sink: F) -> usize {
        let mut taken: Slots = {
            let mut slots = self.lock();
            let mut taken = Deque::new();
            while let Some(sample) = slots.pop_front() {
                // Same capacity on both sides
                let _ = taken.push_back(sample);
            }
            taken
        };

        let count = taken.len();
        while let Some(sample) = taken.pop_front() {
            sink(sample);
        }
        count
    }

    /// Samples currently queued
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether no samples are queued
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Pushes rejected because every slot was occupied
    pub fn overflows(&self) -> u64 {
        self.overflows.load(Ordering::Relaxed)
    }
}

impl Default for HardwareTier {
    fn default() -> Self {
        Self::new()
    }
}
