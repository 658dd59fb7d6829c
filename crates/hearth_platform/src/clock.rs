//! Platform-provided time sources.

use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// Time source supplied by the platform adapter.
///
/// Two clocks on purpose: a wall-ish clock for timestamps and logging, and
/// a monotonic clock for scheduling and drift-safe measurements. Monotonic
/// values have no meaning as absolute timestamps; only differences do.
pub trait PlatformClock: Send + Sync {
    /// Current wall-ish time in epoch milliseconds.
    fn now_epoch_millis(&self) -> u64;

    /// Current monotonic time in nanoseconds.
    fn monotonic_nanos(&self) -> u64;
}

/// Clock backed by the operating system.
pub struct SystemClock {
    started: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl PlatformClock for SystemClock {
    fn now_epoch_millis(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_millis() as u64)
            .unwrap_or(0)
    }

    fn monotonic_nanos(&self) -> u64 {
        self.started.elapsed().as_nanos() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_clock_is_monotonic() {
        let clock = SystemClock::new();
        let first = clock.monotonic_nanos();
        let second = clock.monotonic_nanos();
        assert!(second >= first);
        assert!(clock.now_epoch_millis() > 0);
    }
}
