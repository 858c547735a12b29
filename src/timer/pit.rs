//! 8253/8254 Programmable Interval Timer, channel 0.
//!
//! Channel 0 is wired to IRQ0. We run it as a square wave generator
//! (mode 3) with a 16-bit divisor of the 1.193182 MHz input clock, written
//! low byte first.

use crate::arch::port::PortIo;
use crate::arch::registry::IrqHandler;
use crate::config::PIT_BASE_FREQUENCY;
use crate::timer::ticks::{TickCounter, TickSource};
use crate::timer::TimerError;

pub const PIT_CHANNEL0: u16 = 0x40;
pub const PIT_COMMAND: u16 = 0x43;

/// Channel 0, access lobyte/hibyte, mode 3, binary counting.
pub const COMMAND_BYTE: u8 = 0x36;

/// Divisor for `hz`. The chip cannot go below ~18.2 Hz (divisor 65535) and
/// mode 3 needs a divisor of at least 2.
pub fn divisor_for(hz: u32) -> Result<u16, TimerError> {
    if hz == 0 {
        return Err(TimerError::InvalidFrequency(hz));
    }

    match u16::try_from(PIT_BASE_FREQUENCY / hz) {
        Ok(divisor) if divisor >= 2 => Ok(divisor),
        _ => Err(TimerError::InvalidFrequency(hz)),
    }
}

pub struct Pit {
    ticks: TickCounter,
    frequency_hz: u32,
}

impl Pit {
    pub const fn new(frequency_hz: u32) -> Self {
        Self::starting_at(frequency_hz, 0)
    }

    pub const fn starting_at(frequency_hz: u32, ticks: u64) -> Self {
        Self {
            ticks: TickCounter::starting_at(ticks),
            frequency_hz,
        }
    }

    pub fn divisor(&self) -> Result<u16, TimerError> {
        divisor_for(self.frequency_hz)
    }

    /// Load channel 0 with our divisor. Returns the divisor written.
    pub fn program(&self, ports: &mut impl PortIo) -> Result<u16, TimerError> {
        let divisor = self.divisor()?;
        let [low, high] = divisor.to_le_bytes();

        ports.write_u8(PIT_COMMAND, COMMAND_BYTE);
        ports.write_u8(PIT_CHANNEL0, low);
        ports.write_u8(PIT_CHANNEL0, high);

        Ok(divisor)
    }

    /// Advance by one period. Only the IRQ0 path should call this.
    #[inline]
    pub fn tick(&self) {
        self.ticks.increment();
    }

    #[inline]
    pub fn current_ticks(&self) -> u64 {
        self.ticks.current()
    }

    pub fn frequency_hz(&self) -> u32 {
        self.frequency_hz
    }
}

impl IrqHandler for Pit {
    fn handle(&self, _irq: u8) {
        self.tick();
    }
}

impl TickSource for Pit {
    fn ticks(&self) -> u64 {
        self.current_ticks()
    }

    fn frequency_hz(&self) -> u32 {
        self.frequency_hz
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::pic::InterruptIndex;
    use crate::arch::port::fake::RecordingPorts;
    use crate::arch::registry::IrqRegistry;

    #[test]
    fn divisor_for_common_rates() {
        assert_eq!(divisor_for(1000), Ok(1193));
        assert_eq!(divisor_for(100), Ok(11931));
        assert_eq!(divisor_for(19), Ok(62799));
    }

    #[test]
    fn divisor_rejects_rates_the_chip_cannot_produce() {
        assert_eq!(divisor_for(0), Err(TimerError::InvalidFrequency(0)));
        assert_eq!(divisor_for(10), Err(TimerError::InvalidFrequency(10)));
        assert_eq!(
            divisor_for(PIT_BASE_FREQUENCY),
            Err(TimerError::InvalidFrequency(PIT_BASE_FREQUENCY))
        );
    }

    #[test]
    fn program_writes_command_then_little_endian_divisor() {
        let pit = Pit::new(1000);
        let mut ports = RecordingPorts::default();

        assert_eq!(pit.program(&mut ports), Ok(1193));
        assert_eq!(
            ports.writes,
            vec![(PIT_COMMAND, 0x36), (PIT_CHANNEL0, 0xA9), (PIT_CHANNEL0, 0x04)]
        );
    }

    #[test]
    fn program_with_bad_rate_touches_nothing() {
        let pit = Pit::new(5);
        let mut ports = RecordingPorts::default();
        assert!(pit.program(&mut ports).is_err());
        assert!(ports.writes.is_empty());
    }

    #[test]
    fn installed_handler_advances_ticks_one_per_interrupt() {
        let pit: &'static Pit = Box::leak(Box::new(Pit::new(1000)));
        let registry = IrqRegistry::new();
        registry.register(InterruptIndex::Timer.irq(), pit).unwrap();

        assert_eq!(pit.current_ticks(), 0);
        for expected in 1..=5 {
            assert!(registry.dispatch(0));
            assert_eq!(pit.current_ticks(), expected);
        }
        assert!(!registry.dispatch(1));
        assert_eq!(pit.current_ticks(), 5);
    }

    #[test]
    fn ticks_never_decrease_between_observations() {
        let pit = Pit::new(1000);
        let mut last = pit.current_ticks();
        for round in 0..50 {
            if round % 3 != 0 {
                pit.handle(0);
            }
            let now = pit.current_ticks();
            assert!(now >= last);
            last = now;
        }
    }
}
