use core::fmt;
use core::ptr::{self, NonNull};
use core::sync::atomic::{AtomicUsize, Ordering};

use crate::memory::allocators::common::{
    checked_align_up, validate_region, HeapError, HeapStats, KernelHeap,
};
use crate::memory::allocators::first_fit::BLOCK_ALIGN;

// ============================================================================
// BUMP HEAP (never reclaims)
// ============================================================================

/// A heap that only ever moves its high-water mark forward.
/// Best for: boot-time allocations that live forever
///
/// # Safety
/// - Must call `init()` before use
/// - Thread-safe through atomic operations
/// - Never reuses memory until reset
pub struct BumpHeap {
    heap_start: AtomicUsize,
    heap_end: AtomicUsize,
    next: AtomicUsize,
    allocations: AtomicUsize,
    initialized: AtomicUsize,
}

impl BumpHeap {
    pub const fn new() -> Self {
        Self {
            heap_start: AtomicUsize::new(0),
            heap_end: AtomicUsize::new(0),
            next: AtomicUsize::new(0),
            allocations: AtomicUsize::new(0),
            initialized: AtomicUsize::new(0),
        }
    }

    /// # Safety
    /// - `heap_start` must point to valid, unused memory
    /// - `heap_size` must not exceed available memory
    pub unsafe fn init(&self, heap_start: usize, heap_size: usize) -> Result<(), HeapError> {
        validate_region(heap_start, heap_size)?;
        let start = checked_align_up(heap_start, BLOCK_ALIGN).ok_or(HeapError::Overflow)?;
        let end = heap_start + heap_size;
        if start >= end {
            return Err(HeapError::InvalidSize);
        }

        if self.initialized.swap(1, Ordering::SeqCst) != 0 {
            return Err(HeapError::AlreadyInitialized);
        }

        self.heap_start.store(start, Ordering::Release);
        self.heap_end.store(end, Ordering::Release);
        self.next.store(start, Ordering::Release);
        Ok(())
    }

    fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire) != 0
    }

    /// Hand out `size` bytes (rounded to `BLOCK_ALIGN`) past the high-water mark.
    pub fn bump(&self, size: usize) -> Option<NonNull<u8>> {
        if !self.is_initialized() || size == 0 {
            return None;
        }

        let size = checked_align_up(size, BLOCK_ALIGN)?;
        let heap_end = self.heap_end.load(Ordering::Acquire);

        loop {
            let current = self.next.load(Ordering::Acquire);
            let new_next = current.checked_add(size)?;
            if new_next > heap_end {
                return None;
            }

            if self
                .next
                .compare_exchange_weak(current, new_next, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                self.allocations.fetch_add(1, Ordering::Relaxed);
                // SAFETY: [current, new_next) was just claimed by this call.
                unsafe { ptr::write_bytes(current as *mut u8, 0, size) };
                return NonNull::new(current as *mut u8);
            }
        }
    }

    /// Reset the heap, invalidating all previous allocations
    ///
    /// # Safety
    /// - Caller must ensure no references to allocated memory exist
    pub unsafe fn reset(&self) {
        if self.is_initialized() {
            let start = self.heap_start.load(Ordering::Acquire);
            self.next.store(start, Ordering::Release);
            self.allocations.store(0, Ordering::Release);
        }
    }

    pub fn used(&self) -> usize {
        if !self.is_initialized() {
            return 0;
        }
        let start = self.heap_start.load(Ordering::Acquire);
        let next = self.next.load(Ordering::Acquire);
        next.saturating_sub(start)
    }

    pub fn remaining(&self) -> usize {
        if !self.is_initialized() {
            return 0;
        }
        let end = self.heap_end.load(Ordering::Acquire);
        let next = self.next.load(Ordering::Acquire);
        end.saturating_sub(next)
    }
}

impl Default for BumpHeap {
    fn default() -> Self {
        Self::new()
    }
}

impl KernelHeap for BumpHeap {
    fn allocate(&mut self, size: usize) -> Option<NonNull<u8>> {
        self.bump(size)
    }

    /// Nothing is reclaimed; only checks that `ptr` came from this arena.
    fn deallocate(&mut self, ptr: *mut u8) -> Result<(), HeapError> {
        if ptr.is_null() {
            return Ok(());
        }
        if !self.is_initialized() {
            return Err(HeapError::Uninitialized);
        }

        let addr = ptr as usize;
        let start = self.heap_start.load(Ordering::Acquire);
        let next = self.next.load(Ordering::Acquire);
        if addr < start || addr >= next {
            return Err(HeapError::InvalidPointer);
        }
        Ok(())
    }

    fn describe_layout(&self, out: &mut dyn fmt::Write) -> fmt::Result {
        if !self.is_initialized() {
            return writeln!(out, "bump heap: not initialized");
        }
        let stats = self.stats();
        writeln!(
            out,
            "bump heap {:#x}-{:#x}: {} allocations, {} used, {} left",
            stats.start, stats.end, stats.blocks, stats.used, stats.free
        )
    }

    fn stats(&self) -> HeapStats {
        HeapStats {
            start: self.heap_start.load(Ordering::Acquire),
            end: self.heap_end.load(Ordering::Acquire),
            high_water: self.next.load(Ordering::Acquire),
            used: self.used(),
            free: self.remaining(),
            blocks: self.allocations.load(Ordering::Relaxed),
            free_blocks: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn heap_over(words: &mut Vec<u64>) -> BumpHeap {
        let heap = BumpHeap::new();
        unsafe { heap.init(words.as_mut_ptr() as usize, words.len() * 8).unwrap() };
        heap
    }

    #[test]
    fn allocations_are_consecutive_and_rounded() {
        let mut backing = vec![0u64; 32];
        let mut heap = heap_over(&mut backing);

        let a = heap.allocate(3).unwrap().as_ptr() as usize;
        let b = heap.allocate(9).unwrap().as_ptr() as usize;
        assert_eq!(b - a, 8);
        assert_eq!(heap.used(), 8 + 16);
    }

    #[test]
    fn zero_and_oversized_requests_fail() {
        let mut backing = vec![0u64; 8];
        let mut heap = heap_over(&mut backing);

        assert!(heap.allocate(0).is_none());
        assert!(heap.allocate(65).is_none());
        assert_eq!(heap.used(), 0);
        assert!(heap.allocate(64).is_some());
        assert_eq!(heap.remaining(), 0);
        assert!(heap.allocate(1).is_none());
    }

    #[test]
    fn free_never_reclaims() {
        let mut backing = vec![0u64; 8];
        let mut heap = heap_over(&mut backing);

        let a = heap.allocate(16).unwrap();
        assert_eq!(heap.deallocate(a.as_ptr()), Ok(()));
        let b = heap.allocate(16).unwrap();
        assert_ne!(a, b);
        assert_eq!(heap.used(), 32);
    }

    #[test]
    fn free_outside_handed_out_range_is_rejected() {
        let mut backing = vec![0u64; 8];
        let mut heap = heap_over(&mut backing);
        heap.allocate(8).unwrap();

        let beyond = unsafe { (backing.as_mut_ptr() as *mut u8).add(32) };
        assert_eq!(heap.deallocate(beyond), Err(HeapError::InvalidPointer));
        assert_eq!(heap.deallocate(ptr::null_mut()), Ok(()));
    }

    #[test]
    fn reset_starts_over() {
        let mut backing = vec![0xFFu64; 8];
        let mut heap = heap_over(&mut backing);
        let first = heap.allocate(24).unwrap();

        unsafe { heap.reset() };
        assert_eq!(heap.used(), 0);
        assert_eq!(heap.stats().blocks, 0);
        assert_eq!(heap.allocate(8), Some(first));
    }

    #[test]
    fn init_is_guarded() {
        let mut backing = vec![0u64; 8];
        let mut other = vec![0u64; 8];
        let heap = heap_over(&mut backing);
        let start = heap.stats().start;

        let again = unsafe { heap.init(other.as_mut_ptr() as usize, 64) };
        assert_eq!(again, Err(HeapError::AlreadyInitialized));
        assert_eq!(heap.stats().start, start);
    }
}
