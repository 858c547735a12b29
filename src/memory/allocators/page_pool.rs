use core::fmt;
use core::ptr::{self, NonNull};

use crate::config::PAGE_SIZE;
use crate::memory::allocators::common::{is_aligned, validate_region, HeapError};

// ============================================================================
// PAGE POOL (fixed number of whole pages)
// ============================================================================

/// `PAGES` page-aligned slots of `PAGE_SIZE` bytes each, one used flag per
/// slot. Lives next to the byte heap and serves page-sized, page-aligned
/// requests the heap cannot.
pub struct PagePool<const PAGES: usize> {
    base: usize,
    used: [bool; PAGES],
    initialized: bool,
}

impl<const PAGES: usize> PagePool<PAGES> {
    pub const BYTES: usize = PAGES * PAGE_SIZE;

    pub const fn new() -> Self {
        Self {
            base: 0,
            used: [false; PAGES],
            initialized: false,
        }
    }

    /// # Safety
    /// `[base, base + Self::BYTES)` must be valid, writable and owned by the
    /// pool from now on.
    pub unsafe fn init(&mut self, base: usize) -> Result<(), HeapError> {
        if self.initialized {
            return Err(HeapError::AlreadyInitialized);
        }
        validate_region(base, Self::BYTES)?;
        if !is_aligned(base, PAGE_SIZE) {
            return Err(HeapError::InvalidAddress);
        }

        self.base = base;
        self.used = [false; PAGES];
        self.initialized = true;

        log::info!(
            "page pool: {} pages at {:#x} - {:#x}",
            PAGES,
            base,
            base + Self::BYTES
        );
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn contains(&self, addr: usize) -> bool {
        self.initialized && addr >= self.base && addr < self.base + Self::BYTES
    }

    /// First free page, zeroed.
    pub fn allocate_page(&mut self) -> Option<NonNull<u8>> {
        if !self.initialized {
            return None;
        }

        let index = self.used.iter().position(|used| !used)?;
        self.used[index] = true;

        let page = (self.base + index * PAGE_SIZE) as *mut u8;
        // SAFETY: the slot is inside the pool and was just marked used.
        unsafe { ptr::write_bytes(page, 0, PAGE_SIZE) };
        log::debug!("page pool: page {} at {:#x}", index, page as usize);
        NonNull::new(page)
    }

    pub fn free_page(&mut self, ptr: *mut u8) -> Result<(), HeapError> {
        if !self.initialized {
            return Err(HeapError::Uninitialized);
        }

        let addr = ptr as usize;
        if !self.contains(addr) || !is_aligned(addr - self.base, PAGE_SIZE) {
            log::warn!("page pool: free of {:#x} which is not a page start", addr);
            return Err(HeapError::InvalidPointer);
        }

        let index = (addr - self.base) / PAGE_SIZE;
        if !self.used[index] {
            log::warn!("page pool: double free of page {}", index);
            return Err(HeapError::DoubleFree);
        }
        self.used[index] = false;
        Ok(())
    }

    pub fn used_pages(&self) -> usize {
        self.used.iter().filter(|&&used| used).count()
    }

    pub fn free_pages(&self) -> usize {
        PAGES - self.used_pages()
    }

    /// One character per page, `#` used and `.` free.
    pub fn describe(&self, out: &mut dyn fmt::Write) -> fmt::Result {
        write!(out, "pages {:#x} [", self.base)?;
        for &used in &self.used {
            out.write_char(if used { '#' } else { '.' })?;
        }
        writeln!(out, "] {}/{} used", self.used_pages(), PAGES)
    }
}

impl<const PAGES: usize> Default for PagePool<PAGES> {
    fn default() -> Self {
        Self::new()
    }
}
