//! Millisecond tick sources for ledger timestamps.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Instant;

/// A free-running millisecond counter that wraps at `u32::MAX`.
pub trait Clock: Send + Sync {
    /// Current tick in milliseconds.
    fn now_ms(&self) -> u32;
}

/// Milliseconds elapsed since the clock was created.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    /// Start counting from now.
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> u32 {
        // Truncation gives the wrapping counter the ledger expects.
        self.origin.elapsed().as_millis() as u32
    }
}

/// A clock that only moves when told to. Clones share the same counter.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    ticks: Arc<AtomicU32>,
}

impl ManualClock {
    /// Create a clock reading `start`.
    pub fn new(start: u32) -> Self {
        Self {
            ticks: Arc::new(AtomicU32::new(start)),
        }
    }

    /// Move the clock forward by `ms`, wrapping.
    pub fn advance(&self, ms: u32) {
        let _ = self
            .ticks
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |t| {
                Some(t.wrapping_add(ms))
            });
    }

    /// Set the clock to an absolute tick.
    pub fn set(&self, ms: u32) {
        self.ticks.store(ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u32 {
        self.ticks.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_wraps() {
        let clock = ManualClock::new(u32::MAX - 1);
        let shared = clock.clone();
        shared.advance(3);
        assert_eq!(clock.now_ms(), 1);
        clock.set(42);
        assert_eq!(shared.now_ms(), 42);
    }

    #[test]
    fn system_clock_is_monotonic() {
        let clock = SystemClock::new();
        let a = clock.now_ms();
        std::thread::sleep(std::time::Duration::from_millis(2));
        assert!(clock.now_ms() >= a);
    }
}
