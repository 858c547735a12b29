//! Compile-time kernel configuration.
//!
//! There is no command line or filesystem to read settings from, so every
//! tunable lives here as a constant.

use log::LevelFilter;

/// Bytes handed to the first-fit heap.
pub const HEAP_SIZE: usize = 1024 * 1024; // 1 MiB

/// Granularity and alignment of the page pool.
pub const PAGE_SIZE: usize = 4096;

/// Number of page-aligned slots reserved above the first-fit arena.
pub const PAGE_POOL_PAGES: usize = 32;

/// Total backing storage reserved in the kernel image for dynamic memory.
pub const ARENA_SIZE: usize = HEAP_SIZE + PAGE_POOL_PAGES * PAGE_SIZE;

/// Input clock of the 8253/8254 PIT.
pub const PIT_BASE_FREQUENCY: u32 = 1_193_182;

/// Tick rate programmed into PIT channel 0 (1 ms per tick).
pub const TIMER_FREQUENCY_HZ: u32 = 1000;

/// COM1
pub const SERIAL_PORT: u16 = 0x3F8;

/// Most verbose level forwarded to the serial console.
pub const LOG_LEVEL: LevelFilter = LevelFilter::Info;
