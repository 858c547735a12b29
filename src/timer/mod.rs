//! # System Timer
//!
//! PIT channel 0 drives IRQ0 at [`TIMER_FREQUENCY_HZ`]; every interrupt adds
//! one to the tick counter of [`PIT`]. On top of that sit two sleeps:
//!
//! - `sleep_busy`: spins re-reading the counter, never yields the CPU
//! - `sleep_interrupt`: halts between ticks, near zero CPU while waiting
//!
//! ## Timer Resolution
//!
//! At 1000 Hz one tick is one millisecond. Sleeps round up to whole ticks and
//! may overshoot by at most one tick period.

pub mod pit;
pub mod sleep;
pub mod ticks;

use core::fmt;

use crate::arch::pic::InterruptIndex;
use crate::arch::port::HardwarePorts;
use crate::arch::registry::RegistryError;
use crate::config::TIMER_FREQUENCY_HZ;
use crate::timer::pit::Pit;
use crate::timer::sleep::{BusyWait, HaltWait};
use crate::timer::ticks::TickSource;

pub static PIT: Pit = Pit::new(TIMER_FREQUENCY_HZ);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerError {
    InvalidFrequency(u32),
    Registration(RegistryError),
}

impl From<RegistryError> for TimerError {
    fn from(err: RegistryError) -> Self {
        TimerError::Registration(err)
    }
}

impl fmt::Display for TimerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimerError::InvalidFrequency(hz) => write!(f, "PIT cannot run at {} Hz", hz),
            TimerError::Registration(err) => write!(f, "IRQ registration failed: {}", err),
        }
    }
}

/// Program the PIT and hook it onto IRQ0.
///
/// The IDT and PIC must already be set up. Ticks start once interrupts are
/// enabled.
pub fn init() -> Result<(), TimerError> {
    // SAFETY: ring 0 during boot; nothing else drives the PIT ports.
    let mut ports = unsafe { HardwarePorts::new() };
    let divisor = PIT.program(&mut ports)?;
    crate::arch::register_irq_handler(InterruptIndex::Timer.irq(), &PIT)?;

    log::info!(
        "PIT running at {} Hz (divisor {})",
        PIT.frequency_hz(),
        divisor
    );
    Ok(())
}

pub fn current_ticks() -> u64 {
    PIT.current_ticks()
}

pub fn uptime_ms() -> u64 {
    PIT.uptime_ms()
}

/// Spin until `ms` milliseconds have passed. Returns the ticks waited.
pub fn sleep_busy(ms: u64) -> u64 {
    sleep::sleep_ms(&PIT, &BusyWait, ms)
}

/// Halt between ticks until `ms` milliseconds have passed. Returns the ticks
/// waited.
pub fn sleep_interrupt(ms: u64) -> u64 {
    sleep::sleep_ms(&PIT, &HaltWait, ms)
}
