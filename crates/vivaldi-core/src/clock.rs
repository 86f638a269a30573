//! Time sources for RTT sampling.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// A wall-clock source with nanosecond resolution.
pub trait Clock: Send + Sync {
    /// Nanoseconds since the Unix epoch.
    fn now_nanos(&self) -> i64;
}

/// The operating system's realtime clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_nanos(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos() as i64
    }
}

/// A clock that only moves when told to. Used in tests.
#[derive(Debug, Default)]
pub struct ManualClock {
    nanos: AtomicI64,
}

impl ManualClock {
    /// Create a clock frozen at `nanos`.
    pub fn new(nanos: i64) -> Self {
        Self {
            nanos: AtomicI64::new(nanos),
        }
    }

    /// Jump to an absolute time.
    pub fn set(&self, nanos: i64) {
        self.nanos.store(nanos, Ordering::SeqCst);
    }

    /// Move forward by `millis` milliseconds.
    pub fn advance_millis(&self, millis: u64) {
        self.nanos.fetch_add(millis as i64 * 1_000_000, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_nanos(&self) -> i64 {
        self.nanos.load(Ordering::SeqCst)
    }
}

/// RTT sample in milliseconds between a remote send time and local receipt.
///
/// The same convention is used for push, forward, pull and exchange: the
/// absolute difference, not halved.
pub fn rtt_millis(sent_nanos: i64, received_nanos: i64) -> f64 {
    received_nanos.abs_diff(sent_nanos) as f64 / 1_000_000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rtt_is_absolute_difference() {
        assert_eq!(rtt_millis(0, 5_000_000), 5.0);
        assert_eq!(rtt_millis(5_000_000, 0), 5.0);
        assert_eq!(rtt_millis(7, 7), 0.0);
    }

    #[test]
    fn manual_clock_advances() {
        let clock = ManualClock::new(1_000);
        clock.advance_millis(2);
        assert_eq!(clock.now_nanos(), 2_001_000);
        clock.set(0);
        assert_eq!(clock.now_nanos(), 0);
    }

    #[test]
    fn system_clock_is_after_epoch() {
        assert!(SystemClock.now_nanos() > 0);
    }
}
