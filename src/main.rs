#![no_std]
#![no_main]

extern crate alloc;
extern crate rlibc;

use alloc::vec::Vec;
use bootloader_api::{entry_point, BootInfo};
use core::panic::PanicInfo;

use tickheap::memory::{self, ALLOCATOR};
use tickheap::{format_no_std, hlt_loop, kernel, logging, println, timer};

entry_point!(kernel_main);

fn kernel_main(boot_info: &'static mut BootInfo) -> ! {
    logging::init();
    log::info!("tickheap booting");
    memory::log_memory_map(boot_info);

    if let Err(e) = memory::init_heap() {
        log::error!("failed to init heap: {}", e);
        hlt_loop();
    }

    if let Err(e) = kernel::init_kernel() {
        log::error!("kernel initialization failed: {}", e);
        hlt_loop();
    }

    heap_demo();
    timer_demo();

    log::info!("demo finished, idling");
    hlt_loop();
}

/// Exercise reuse and splitting, then the global allocator on top of it.
fn heap_demo() {
    log::info!("--- heap ---");

    let first = ALLOCATOR.allocate(100);
    let second = ALLOCATOR.allocate(100);
    if let Some(block) = first {
        if let Err(e) = ALLOCATOR.deallocate(block.as_ptr()) {
            log::warn!("free failed: {}", e);
        }
    }
    let reused = ALLOCATOR.allocate(50);
    log::info!(
        "first={:?} second={:?} reused={:?}",
        first.map(|p| p.as_ptr()),
        second.map(|p| p.as_ptr()),
        reused.map(|p| p.as_ptr())
    );

    let squares: Vec<u64> = (0..16u64).map(|n| n * n).collect();
    log::info!("Vec of {} squares, last = {}", squares.len(), squares[15]);

    let page = ALLOCATOR.allocate_page();
    log::info!("page at {:?}", page.map(|p| p.as_ptr()));

    memory::print_memory_layout();

    for block in [second, reused].into_iter().flatten() {
        let _ = ALLOCATOR.deallocate(block.as_ptr());
    }
    if let Some(page) = page {
        let _ = ALLOCATOR.free_page(page.as_ptr());
    }
}

fn timer_demo() {
    log::info!("--- timer ---");

    let start = timer::current_ticks();
    let waited = timer::sleep_busy(100);
    log::info!("busy sleep 100 ms: {} ticks", waited);

    let waited = timer::sleep_interrupt(250);
    log::info!("halting sleep 250 ms: {} ticks", waited);

    let mut buf = [0u8; 64];
    match format_no_std!(
        &mut buf,
        "uptime {} ms, {} ticks since demo start",
        timer::uptime_ms(),
        timer::current_ticks().wrapping_sub(start)
    ) {
        Ok(line) => println!("{}", line),
        Err(_) => log::warn!("uptime line did not fit"),
    }
}

#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    println!("PANIC: {} | {:?}", info.message(), info.location());
    hlt_loop()
}
