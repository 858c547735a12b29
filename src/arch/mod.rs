//! # x86_64 Interrupt Plumbing
//!
//! - **GDT**: flat kernel segments plus a TSS with a double fault stack
//! - **IDT**: exception handlers and IRQ trampolines
//! - **PIC**: 8259 remap, masking and EOI
//! - **Registry**: per-line IRQ handlers the trampolines dispatch to
//! - **Port**: byte-wide port I/O behind a trait
//!
//! ## Interrupt Vector Layout
//!
//! | Vector | Type                   | Handler                    |
//! |--------|------------------------|----------------------------|
//! | 0-31   | CPU Exceptions         | divide, page fault, etc.   |
//! | 32     | Timer (IRQ0)           | PIT tick                   |
//! | 33-47  | IRQ 1-15               | whatever is registered     |
//!
//! ## Usage
//!
//! ```ignore
//! arch::init(); // GDT, IDT, PIC
//! timer::init()?; // registers IRQ0 and unmasks it
//! x86_64::instructions::interrupts::enable();
//! ```

pub mod gdt;
pub mod idt;
pub mod pic;
pub mod port;
pub mod registry;

use crate::arch::idt::IRQ_HANDLERS;
use crate::arch::port::HardwarePorts;
use crate::arch::registry::{IrqHandler, RegistryError};

/// GDT, then IDT, then the PIC. Interrupts stay disabled.
pub fn init() {
    gdt::init();
    idt::init_idt();
    // SAFETY: called once during boot at ring 0, before anyone else owns the
    // PIC data ports.
    let mut ports = unsafe { HardwarePorts::new() };
    pic::init(&mut ports);
}

/// Install a handler on the live registry and open its PIC line.
///
/// The registry lock is taken with interrupts off so a trampoline can never
/// spin on it while this holds it.
pub fn register_irq_handler(irq: u8, handler: &'static dyn IrqHandler) -> Result<(), RegistryError> {
    x86_64::instructions::interrupts::without_interrupts(|| {
        if IRQ_HANDLERS.register(irq, handler)?.is_some() {
            log::warn!("IRQ{} handler replaced", irq);
        }
        // SAFETY: the PIC data ports are only touched with interrupts off.
        let mut ports = unsafe { HardwarePorts::new() };
        pic::unmask_irq(&mut ports, irq);
        Ok(())
    })
}
