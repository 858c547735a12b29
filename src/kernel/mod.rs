//! # Kernel Initialization Module
//!
//! Provides kernel bootstrap and status tracking infrastructure.
//!
//! ## Submodules
//!
//! - `init`: Kernel initialization sequence
//! - `status`: Component status tracking
//!
//! ## Status Tracking
//!
//! Every init phase registers itself and moves through `NotStarted`,
//! `InProgress` and then `Completed` or `Failed`. The table is logged once
//! boot finishes.

pub mod init;
pub mod status;

use core::fmt;

use crate::memory::allocators::HeapError;
use crate::timer::TimerError;

pub use init::init_kernel;
pub use status::{register_component, update_component_status, InitStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelError {
    Heap(HeapError),
    Timer(TimerError),
}

impl KernelError {
    /// Short static label for the status table.
    pub fn summary(&self) -> &'static str {
        match self {
            KernelError::Heap(_) => "heap setup failed",
            KernelError::Timer(TimerError::InvalidFrequency(_)) => "unsupported PIT frequency",
            KernelError::Timer(TimerError::Registration(_)) => "IRQ0 registration failed",
        }
    }
}

impl From<HeapError> for KernelError {
    fn from(err: HeapError) -> Self {
        KernelError::Heap(err)
    }
}

impl From<TimerError> for KernelError {
    fn from(err: TimerError) -> Self {
        KernelError::Timer(err)
    }
}

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KernelError::Heap(err) => write!(f, "heap: {}", err),
            KernelError::Timer(err) => write!(f, "timer: {}", err),
        }
    }
}
