use core::sync::atomic::{AtomicU64, Ordering};

/// Count of timer interrupts since the PIT was started.
///
/// Only the IRQ0 handler advances it, by exactly one per interrupt. It wraps
/// on overflow; readers compare with [`TickSource::elapsed_since`] so a wrap
/// in the middle of a wait is harmless.
#[derive(Debug)]
pub struct TickCounter {
    ticks: AtomicU64,
}

impl TickCounter {
    pub const fn new() -> Self {
        Self::starting_at(0)
    }

    pub const fn starting_at(ticks: u64) -> Self {
        Self {
            ticks: AtomicU64::new(ticks),
        }
    }

    #[inline]
    pub fn increment(&self) {
        self.ticks.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn current(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

}

impl Default for TickCounter {
    fn default() -> Self {
        Self::new()
    }
}

/// Anything that can tell the time in ticks.
pub trait TickSource {
    fn ticks(&self) -> u64;

    fn frequency_hz(&self) -> u32;

    /// Ticks since `start`, correct across a wrap of the counter.
    fn elapsed_since(&self, start: u64) -> u64 {
        self.ticks().wrapping_sub(start)
    }

    /// Ticks covering at least `ms` milliseconds. Rounds up so a sleep never
    /// ends early when the tick period is longer than a millisecond.
    fn ms_to_ticks(&self, ms: u64) -> u64 {
        let hz = u64::from(self.frequency_hz());
        ms.saturating_mul(hz).saturating_add(999) / 1000
    }

    /// Milliseconds represented by the current tick count.
    fn uptime_ms(&self) -> u64 {
        match u64::from(self.frequency_hz()) {
            0 => 0,
            hz => self.ticks().saturating_mul(1000) / hz,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(u64, u32);

    impl TickSource for Fixed {
        fn ticks(&self) -> u64 {
            self.0
        }

        fn frequency_hz(&self) -> u32 {
            self.1
        }
    }

    #[test]
    fn increments_by_one() {
        let counter = TickCounter::new();
        let mut previous = counter.current();
        for _ in 0..100 {
            counter.increment();
            let now = counter.current();
            assert_eq!(now, previous + 1);
            previous = now;
        }
    }

    #[test]
    fn wraps_silently_and_elapsed_survives_the_wrap() {
        let start = u64::MAX - 1;
        let counter = TickCounter::starting_at(start);
        counter.increment();
        counter.increment();
        counter.increment();
        assert_eq!(counter.current(), 1);
        assert_eq!(Fixed(counter.current(), 1000).elapsed_since(start), 3);
    }

    #[test]
    fn ms_conversion_rounds_up() {
        assert_eq!(Fixed(0, 1000).ms_to_ticks(10), 10);
        assert_eq!(Fixed(0, 100).ms_to_ticks(15), 2);
        assert_eq!(Fixed(0, 100).ms_to_ticks(10), 1);
        assert_eq!(Fixed(0, 18).ms_to_ticks(1), 1);
        assert_eq!(Fixed(0, 1000).ms_to_ticks(0), 0);
    }

    #[test]
    fn uptime_follows_frequency() {
        assert_eq!(Fixed(2500, 1000).uptime_ms(), 2500);
        assert_eq!(Fixed(25, 100).uptime_ms(), 250);
        assert_eq!(Fixed(25, 0).uptime_ms(), 0);
    }
}
