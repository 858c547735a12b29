//! Waiting for the tick counter to reach a deadline.
//!
//! Both sleeps share one loop and differ only in what they do between
//! checks: [`BusyWait`] keeps the core spinning, [`HaltWait`] opens
//! interrupts and halts until the next one arrives. Neither can be cancelled.

use crate::timer::ticks::TickSource;

/// What to do while the deadline has not been reached yet.
pub trait WaitStrategy {
    fn wait_for_tick(&self);
}

/// Spin on the counter. Never yields the CPU. Interrupts must already be
/// enabled or the counter never moves.
#[derive(Debug, Clone, Copy, Default)]
pub struct BusyWait;

impl WaitStrategy for BusyWait {
    #[inline]
    fn wait_for_tick(&self) {
        core::hint::spin_loop();
    }
}

/// `sti; hlt` between checks. The CPU sleeps until the next interrupt, which
/// is at most one tick away. Leaves interrupts enabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct HaltWait;

impl WaitStrategy for HaltWait {
    #[inline]
    fn wait_for_tick(&self) {
        x86_64::instructions::interrupts::enable_and_hlt();
    }
}

/// Block until `ticks` ticks have passed since the call. Returns the ticks
/// that actually elapsed, which is `ticks` or slightly more.
pub fn sleep_ticks(source: &impl TickSource, strategy: &impl WaitStrategy, ticks: u64) -> u64 {
    let start = source.ticks();

    loop {
        let elapsed = source.elapsed_since(start);
        if elapsed >= ticks {
            return elapsed;
        }
        strategy.wait_for_tick();
    }
}

pub fn sleep_ms(source: &impl TickSource, strategy: &impl WaitStrategy, ms: u64) -> u64 {
    sleep_ticks(source, strategy, source.ms_to_ticks(ms))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::registry::IrqHandler;
    use crate::timer::pit::Pit;
    use core::cell::Cell;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    /// Stands in for the hardware: every wait is one timer interrupt.
    struct Interrupting<'a> {
        pit: &'a Pit,
        waits: Cell<u64>,
    }

    impl<'a> Interrupting<'a> {
        fn new(pit: &'a Pit) -> Self {
            Self {
                pit,
                waits: Cell::new(0),
            }
        }
    }

    impl WaitStrategy for Interrupting<'_> {
        fn wait_for_tick(&self) {
            self.waits.set(self.waits.get() + 1);
            self.pit.handle(0);
        }
    }

    #[test]
    fn sleep_of_ten_ms_at_1khz_returns_at_t_plus_ten() {
        let start = 12_345;
        let pit = Pit::starting_at(1000, start);
        let wait = Interrupting::new(&pit);

        let elapsed = sleep_ms(&pit, &wait, 10);

        assert_eq!(elapsed, 10);
        assert!(pit.current_ticks() >= start + 10);
        assert_eq!(wait.waits.get(), 10);
    }

    #[test]
    fn zero_sleep_returns_without_waiting() {
        let pit = Pit::new(1000);
        let wait = Interrupting::new(&pit);
        assert_eq!(sleep_ms(&pit, &wait, 0), 0);
        assert_eq!(wait.waits.get(), 0);
    }

    #[test]
    fn slow_timer_rounds_the_deadline_up() {
        let pit = Pit::new(100);
        let wait = Interrupting::new(&pit);
        // 15 ms at 10 ms per tick needs two ticks, not one.
        assert_eq!(sleep_ms(&pit, &wait, 15), 2);
    }

    #[test]
    fn deadline_across_counter_wrap() {
        let pit = Pit::starting_at(1000, u64::MAX - 3);
        let wait = Interrupting::new(&pit);

        assert_eq!(sleep_ms(&pit, &wait, 10), 10);
        assert_eq!(pit.current_ticks(), 6);
    }

    #[test]
    fn busy_wait_returns_once_a_background_ticker_gets_there() {
        let pit: &'static Pit = Box::leak(Box::new(Pit::new(1000)));
        let stop = Arc::new(AtomicBool::new(false));

        let ticker = {
            let stop = Arc::clone(&stop);
            thread::spawn(move || {
                while !stop.load(Ordering::Relaxed) {
                    pit.handle(0);
                    thread::sleep(Duration::from_micros(50));
                }
            })
        };

        let before = pit.current_ticks();
        let elapsed = sleep_ms(pit, &BusyWait, 20);
        let after = pit.current_ticks();

        stop.store(true, Ordering::Relaxed);
        ticker.join().unwrap();

        assert!(elapsed >= 20);
        assert!(after - before >= 20);
    }
}
