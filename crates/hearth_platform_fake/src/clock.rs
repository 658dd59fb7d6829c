//! Deterministic clock for tests and fake servers.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use hearth_platform::PlatformClock;

/// Clock that only moves when told to.
///
/// Both clocks advance together: [`advance_by`](Self::advance_by) moves the
/// epoch and monotonic readings in lockstep.
pub struct DeterministicClock {
    epoch_millis: AtomicU64,
    mono_nanos: AtomicU64,
}

impl DeterministicClock {
    pub fn new() -> Self {
        Self::starting_at(0)
    }

    pub fn starting_at(start_epoch_millis: u64) -> Self {
        Self {
            epoch_millis: AtomicU64::new(start_epoch_millis),
            mono_nanos: AtomicU64::new(0),
        }
    }

    /// Advances both clocks by `duration`.
    pub fn advance_by(&self, duration: Duration) {
        self.epoch_millis
            .fetch_add(duration.as_millis() as u64, Ordering::AcqRel);
        self.mono_nanos
            .fetch_add(duration.as_nanos() as u64, Ordering::AcqRel);
    }

    /// Sets absolute epoch millis; the monotonic clock is unaffected.
    pub fn set_epoch_millis(&self, value: u64) {
        self.epoch_millis.store(value, Ordering::Release);
    }
}

impl Default for DeterministicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl PlatformClock for DeterministicClock {
    fn now_epoch_millis(&self) -> u64 {
        self.epoch_millis.load(Ordering::Acquire)
    }

    fn monotonic_nanos(&self) -> u64 {
        self.mono_nanos.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clocks_advance_together() {
        let clock = DeterministicClock::starting_at(1_000);
        clock.advance_by(Duration::from_millis(250));

        assert_eq!(clock.now_epoch_millis(), 1_250);
        assert_eq!(clock.monotonic_nanos(), 250_000_000);

        clock.set_epoch_millis(42);
        assert_eq!(clock.now_epoch_millis(), 42);
        assert_eq!(clock.monotonic_nanos(), 250_000_000);
    }
}
