//! Shared pieces of the heap allocators: alignment helpers, errors, stats and
//! the [`KernelHeap`] interface.

use core::fmt;
use core::ptr::NonNull;

// ============================================================================
// KERNEL HEAP INTERFACE
// ============================================================================

/// Byte-granular allocator over a fixed arena.
///
/// `allocate` signals exhaustion with `None`; callers are expected to check.
pub trait KernelHeap {
    fn allocate(&mut self, size: usize) -> Option<NonNull<u8>>;

    /// Give back a pointer obtained from `allocate`. Null is a no-op.
    fn deallocate(&mut self, ptr: *mut u8) -> Result<(), HeapError>;

    /// Human-readable dump of the arena. Never changes allocator state.
    fn describe_layout(&self, out: &mut dyn fmt::Write) -> fmt::Result;

    fn stats(&self) -> HeapStats;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HeapStats {
    pub start: usize,
    pub end: usize,
    /// First byte never handed out yet.
    pub high_water: usize,
    /// Payload plus header bytes of live allocations.
    pub used: usize,
    pub free: usize,
    pub blocks: usize,
    pub free_blocks: usize,
}

impl HeapStats {
    pub fn size(&self) -> usize {
        self.end - self.start
    }
}

// ============================================================================
// UTILITY FUNCTIONS
// ============================================================================

#[inline]
pub const fn align_up(addr: usize, align: usize) -> usize {
    (addr + align - 1) & !(align - 1)
}

#[inline]
pub const fn align_down(addr: usize, align: usize) -> usize {
    addr & !(align - 1)
}

/// `align_up` that reports overflow instead of wrapping.
#[inline]
pub fn checked_align_up(addr: usize, align: usize) -> Option<usize> {
    addr.checked_add(align - 1).map(|a| a & !(align - 1))
}

#[inline]
pub fn is_aligned(addr: usize, align: usize) -> bool {
    addr & (align - 1) == 0
}

/// Validates that a memory region is safe to use
pub fn validate_region(start: usize, size: usize) -> Result<(), HeapError> {
    if start == 0 {
        return Err(HeapError::InvalidAddress);
    }
    if size == 0 {
        return Err(HeapError::InvalidSize);
    }
    start.checked_add(size).ok_or(HeapError::Overflow)?;
    Ok(())
}

// ============================================================================
// ERROR TYPES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeapError {
    InvalidAddress,
    InvalidSize,
    Overflow,
    Uninitialized,
    AlreadyInitialized,
    /// Not an address this allocator handed out.
    InvalidPointer,
    DoubleFree,
}

impl fmt::Display for HeapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            HeapError::InvalidAddress => "invalid arena address",
            HeapError::InvalidSize => "invalid arena size",
            HeapError::Overflow => "address arithmetic overflow",
            HeapError::Uninitialized => "heap not initialized",
            HeapError::AlreadyInitialized => "heap already initialized",
            HeapError::InvalidPointer => "pointer was not allocated by this heap",
            HeapError::DoubleFree => "block is already free",
        };
        f.write_str(msg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alignment_helpers() {
        assert_eq!(align_up(13, 8), 16);
        assert_eq!(align_up(16, 8), 16);
        assert_eq!(align_down(4097, 4096), 4096);
        assert!(is_aligned(0x2000, 4096));
        assert!(!is_aligned(0x2004, 4096));
        assert_eq!(checked_align_up(usize::MAX - 2, 8), None);
    }

    #[test]
    fn region_validation() {
        assert_eq!(validate_region(0, 16), Err(HeapError::InvalidAddress));
        assert_eq!(validate_region(0x1000, 0), Err(HeapError::InvalidSize));
        assert_eq!(validate_region(usize::MAX, 2), Err(HeapError::Overflow));
        assert_eq!(validate_region(0x1000, 0x1000), Ok(()));
    }
}
