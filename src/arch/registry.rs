//! IRQ handler registry.
//!
//! One slot per PIC line. The IDT trampolines look the line up here and call
//! whatever is installed; drivers register during initialization. A slot holds
//! at most one handler and a later registration replaces the earlier one
//! without complaint.

use core::fmt;

use spin::Mutex;

use crate::arch::pic::IRQ_LINES;

/// Something that reacts to a hardware interrupt line.
///
/// Runs with interrupts disabled, so implementations must be short and must
/// not wait on another interrupt being delivered.
pub trait IrqHandler: Sync {
    fn handle(&self, irq: u8);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryError {
    InvalidIrq(u8),
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryError::InvalidIrq(irq) => write!(f, "IRQ {} is out of range", irq),
        }
    }
}

type Slot = Option<&'static dyn IrqHandler>;

pub struct IrqRegistry {
    slots: Mutex<[Slot; IRQ_LINES]>,
}

impl IrqRegistry {
    pub const fn new() -> Self {
        Self {
            slots: Mutex::new([None; IRQ_LINES]),
        }
    }

    fn index(irq: u8) -> Result<usize, RegistryError> {
        let index = usize::from(irq);
        if index < IRQ_LINES {
            Ok(index)
        } else {
            Err(RegistryError::InvalidIrq(irq))
        }
    }

    /// Install `handler` for `irq`, returning whatever it replaced.
    ///
    /// On the live table the caller must have interrupts disabled, otherwise
    /// a trampoline on this core can spin on the held slot lock. Go through
    /// `arch::register_irq_handler`, which does.
    pub fn register(
        &self,
        irq: u8,
        handler: &'static dyn IrqHandler,
    ) -> Result<Slot, RegistryError> {
        let index = Self::index(irq)?;
        Ok(self.slots.lock()[index].replace(handler))
    }

    /// Run the handler for `irq`. Returns `false` when the line has none.
    ///
    /// The slot lock is released before the handler runs, so a handler may
    /// itself look at the registry.
    pub fn dispatch(&self, irq: u8) -> bool {
        let handler = match Self::index(irq) {
            Ok(index) => self.slots.lock()[index],
            Err(_) => return false,
        };

        match handler {
            Some(handler) => {
                handler.handle(irq);
                true
            }
            None => false,
        }
    }
}

impl Default for IrqRegistry {
    fn default() -> Self {
        Self::new()
    }
}
