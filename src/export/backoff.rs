//! Exponential retry pacing for failed exports

use std::time::{Duration, Instant};

/// Spaces out export attempts after failures with exponential backoff.
#[derive(Debug, Clone)]
pub struct BackoffController {
    initial: Duration,
    max: Duration,
    current: Duration,
    next_retry_at: Option<Instant>,
    consecutive_failures: u32,
}

impl BackoffController {
    pub fn new(initial_ms: u64, max_ms: u64) -> Self {
        let initial = Duration::from_millis(initial_ms.max(1));
        let max = Duration::from_millis(max_ms.max(initial_ms.max(1)));
        Self {
            initial,
            max,
            current: initial,
            next_retry_at: None,
            consecutive_failures: 0,
        }
    }

    /// Record a failed attempt and push the next one into the future.
    pub fn mark_failure(&mut self, now: Instant) {
        self.next_retry_at = Some(now + self.current);
        self.current = (self.current * 2).min(self.max);
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
    }

    /// Reset after an acknowledged export.
    pub fn mark_success(&mut self) {
        self.current = self.initial;
        self.next_retry_at = None;
        self.consecutive_failures = 0;
    }

    pub fn should_retry(&self, now: Instant) -> bool {
        self.next_retry_at.map_or(true, |at| now >= at)
    }

    /// Delay that the next failure will impose
    pub fn current_delay(&self) -> Duration {
        self.current
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }
}
