//! # tickheap
//!
//! Kernel library for a small x86_64 teaching kernel: a first-fit heap over a
//! static arena, a PIT-driven tick counter with busy and halt based sleeping,
//! and the GDT/IDT/PIC plumbing that delivers the timer interrupt.
//!
//! Everything that does not touch hardware is built as plain `std` code under
//! `cfg(test)`, so the allocator, tick accounting, IRQ registry and port
//! programming can be exercised with `cargo test --lib` on the host.
//!
//! ## Initialization Order
//!
//! 1. `logging::init()` - COM1 and the `log` backend
//! 2. `memory::init_heap()` - first-fit arena and page pool
//! 3. `kernel::init_kernel()` - GDT, IDT, PIC, then the PIT on IRQ0

#![cfg_attr(not(test), no_std)]
#![feature(abi_x86_interrupt)]

pub mod arch;
pub mod config;
pub mod format;
pub mod kernel;
pub mod logging;
pub mod memory;
pub mod timer;

/// Park the CPU forever. Used as the fail-stop path for exceptions and panics.
pub fn hlt_loop() -> ! {
    loop {
        x86_64::instructions::hlt();
    }
}
