//! # Programmable Interrupt Controller (8259 PIC)
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐
//! │   PIC 1     │     │   PIC 2     │
//! │  (Master)   │◀────│  (Slave)    │
//! │ IRQ 0-7     │     │ IRQ 8-15    │
//! └─────────────┘     └─────────────┘
//!       │
//!       ▼
//!     CPU
//! ```
//!
//! IRQ 0-15 collide with the CPU exception vectors out of reset, so both chips
//! are remapped: PIC 1 to vectors 32-39, PIC 2 to vectors 40-47.
//!
//! Remapping and EOI go through `pic8259`. Masking is done here on the data
//! ports so the bit twiddling can be tested against a fake port bus.

use pic8259::ChainedPics;
use spin::Mutex;

use crate::arch::port::PortIo;

pub const PIC_1_OFFSET: u8 = 32;
pub const PIC_2_OFFSET: u8 = PIC_1_OFFSET + 8;

pub const PIC_1_DATA: u16 = 0x21;
pub const PIC_2_DATA: u16 = 0xA1;

/// Line on the master chip the slave is wired to.
pub const CASCADE_IRQ: u8 = 2;

pub const IRQ_LINES: usize = 16;

pub static PICS: Mutex<ChainedPics> =
    Mutex::new(unsafe { ChainedPics::new(PIC_1_OFFSET, PIC_2_OFFSET) });

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum InterruptIndex {
    Timer = PIC_1_OFFSET, // 32 - IRQ0
}

impl InterruptIndex {
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn irq(self) -> u8 {
        self.as_u8() - PIC_1_OFFSET
    }
}

/// Vector the CPU sees for a given IRQ line.
pub const fn irq_vector(irq: u8) -> u8 {
    PIC_1_OFFSET + irq
}

fn mask_port(irq: u8) -> (u16, u8) {
    if irq < 8 {
        (PIC_1_DATA, irq)
    } else {
        (PIC_2_DATA, irq - 8)
    }
}

/// Clear the mask bit for `irq`. Lines on the slave also need the cascade
/// line open on the master.
pub fn unmask_irq(ports: &mut impl PortIo, irq: u8) {
    let (port, bit) = mask_port(irq);
    let mask = ports.read_u8(port);
    ports.write_u8(port, mask & !(1 << bit));

    if irq >= 8 {
        unmask_irq(ports, CASCADE_IRQ);
    }
}

pub fn mask_irq(ports: &mut impl PortIo, irq: u8) {
    let (port, bit) = mask_port(irq);
    let mask = ports.read_u8(port);
    ports.write_u8(port, mask | (1 << bit));
}

/// Mask every line except the cascade; drivers open their own line when they
/// install a handler.
pub fn mask_all(ports: &mut impl PortIo) {
    ports.write_u8(PIC_1_DATA, !(1 << CASCADE_IRQ));
    ports.write_u8(PIC_2_DATA, 0xFF);
}

/// Remap both chips and leave them fully masked.
pub fn init(ports: &mut impl PortIo) {
    unsafe { PICS.lock().initialize() };
    mask_all(ports);
    log::info!("PIC remapped to vectors {}-{}", PIC_1_OFFSET, PIC_2_OFFSET + 7);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::port::fake::RecordingPorts;

    #[test]
    fn unmask_timer_clears_bit_zero_only() {
        let mut ports = RecordingPorts::default().with_register(PIC_1_DATA, 0xFF);
        unmask_irq(&mut ports, InterruptIndex::Timer.irq());
        assert_eq!(ports.writes, vec![(PIC_1_DATA, 0xFE)]);
    }

    #[test]
    fn unmask_slave_line_opens_cascade() {
        let mut ports = RecordingPorts::default()
            .with_register(PIC_1_DATA, 0xFF)
            .with_register(PIC_2_DATA, 0xFF);
        unmask_irq(&mut ports, 12);
        assert_eq!(ports.register(PIC_2_DATA), Some(0xEF));
        assert_eq!(ports.register(PIC_1_DATA), Some(0xFB));
    }

    #[test]
    fn mask_sets_bit_back() {
        let mut ports = RecordingPorts::default().with_register(PIC_1_DATA, 0x00);
        mask_irq(&mut ports, 1);
        assert_eq!(ports.register(PIC_1_DATA), Some(0x02));
    }

    #[test]
    fn mask_all_keeps_cascade_open() {
        let mut ports = RecordingPorts::default();
        mask_all(&mut ports);
        assert_eq!(ports.writes, vec![(PIC_1_DATA, 0xFB), (PIC_2_DATA, 0xFF)]);
    }

    #[test]
    fn vectors_follow_offsets() {
        assert_eq!(InterruptIndex::Timer.as_u8(), 32);
        assert_eq!(InterruptIndex::Timer.irq(), 0);
        assert_eq!(irq_vector(1), 33);
        assert_eq!(irq_vector(15), 47);
    }
}
