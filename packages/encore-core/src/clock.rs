//! Time source abstraction.
//!
//! Every instant the coordinator persists or compares (heartbeats, token expiry,
//! position ticks) is read through [`Clock`] so tests can drive time
//! deterministically instead of depending on the wall clock.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::utils::now_millis;

/// Source of "now" as Unix epoch milliseconds.
pub trait Clock: Send + Sync {
    /// Returns the current instant in Unix epoch milliseconds.
    fn now_millis(&self) -> u64;
}

/// Wall clock. Used in production so that timestamps written to shared storage
/// are comparable between separate processes.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> u64 {
        now_millis()
    }
}

/// Clock anchored at a fixed epoch that advances with tokio's clock.
///
/// Under `tokio::time::pause()` this follows virtual time, which lets timer-driven
/// loops and the instants they persist stay in agreement during tests.
#[derive(Debug, Clone)]
pub struct TokioClock {
    epoch_ms: u64,
    origin: tokio::time::Instant,
}

impl TokioClock {
    /// Creates a clock that reads `epoch_ms` right now.
    #[must_use]
    pub fn starting_at(epoch_ms: u64) -> Self {
        Self {
            epoch_ms,
            origin: tokio::time::Instant::now(),
        }
    }
}

impl Clock for TokioClock {
    fn now_millis(&self) -> u64 {
        self.epoch_ms + self.origin.elapsed().as_millis() as u64
    }
}

/// Manually advanced clock for synchronous tests.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    #[must_use]
    pub fn new(start_ms: u64) -> Self {
        Self {
            now: AtomicU64::new(start_ms),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.now.fetch_add(by.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn set(&self, ms: u64) {
        self.now.store(ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_advances() {
        let clock = ManualClock::new(1_000);
        clock.advance(Duration::from_millis(250));
        assert_eq!(clock.now_millis(), 1_250);
        clock.set(10);
        assert_eq!(clock.now_millis(), 10);
    }

    #[tokio::test(start_paused = true)]
    async fn tokio_clock_follows_virtual_time() {
        let clock = TokioClock::starting_at(50_000);
        tokio::time::advance(Duration::from_secs(3)).await;
        assert_eq!(clock.now_millis(), 53_000);
    }
}
