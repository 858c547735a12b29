use core::fmt;
use core::mem;
use core::ptr::{self, NonNull};

use crate::memory::allocators::common::{
    align_up, checked_align_up, validate_region, HeapError, HeapStats, KernelHeap,
};

// ============================================================================
// FIRST-FIT FREE-LIST HEAP
// ============================================================================

/// Header written in the arena right before every payload.
///
/// Blocks are contiguous: `next` is always the address just past this
/// block's payload, or `None` for the block at the high-water mark.
#[repr(C)]
struct BlockHeader {
    size: usize,
    free: bool,
    next: Option<NonNull<BlockHeader>>,
}

impl BlockHeader {
    fn start_addr(&self) -> usize {
        self as *const Self as usize
    }

    fn payload_addr(&self) -> usize {
        self.start_addr() + HEADER_SIZE
    }
}

pub const HEADER_SIZE: usize = mem::size_of::<BlockHeader>();

/// Every payload size is rounded to this, which also keeps every header and
/// payload aligned for `usize`.
pub const BLOCK_ALIGN: usize = mem::align_of::<BlockHeader>();

/// Smallest payload worth splitting off into its own free block.
const MIN_SPLIT_PAYLOAD: usize = BLOCK_ALIGN;

/// One entry of [`FirstFitHeap::blocks`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
    pub header: usize,
    pub payload: usize,
    pub size: usize,
    pub free: bool,
}

/// First-fit allocator over a single arena.
///
/// The arena is filled bottom-up. Blocks below the high-water mark form an
/// address-ordered chain; a request is served by the first free block large
/// enough (split if the rest is worth keeping), otherwise a new block is
/// appended at the high-water mark. Freeing flips the block's flag and
/// nothing else: neighbours are never merged, so fragmentation only grows.
///
/// # Safety
/// - Must call `init()` before use
/// - Not synchronized; wrap it in a lock to share it
pub struct FirstFitHeap {
    start: usize,
    end: usize,
    high_water: usize,
    head: Option<NonNull<BlockHeader>>,
    tail: Option<NonNull<BlockHeader>>,
    initialized: bool,
}

// Safety: the heap exclusively owns the block chain inside its arena; sharing
// across cores goes through `LockedHeap`'s mutex.
unsafe impl Send for FirstFitHeap {}

impl FirstFitHeap {
    pub const fn new() -> Self {
        Self {
            start: 0,
            end: 0,
            high_water: 0,
            head: None,
            tail: None,
            initialized: false,
        }
    }

    /// Take ownership of `[heap_start, heap_start + heap_size)`.
    ///
    /// A second call is ignored: it returns `AlreadyInitialized` and the arena
    /// bounds stay what the first call set.
    ///
    /// # Safety
    /// - The region must be valid, writable and unused by anything else for
    ///   as long as the heap lives
    pub unsafe fn init(&mut self, heap_start: usize, heap_size: usize) -> Result<(), HeapError> {
        if self.initialized {
            log::warn!("heap already initialized at {:#x}, ignoring re-init", self.start);
            return Err(HeapError::AlreadyInitialized);
        }

        validate_region(heap_start, heap_size)?;
        let end = heap_start + heap_size;
        let start = checked_align_up(heap_start, BLOCK_ALIGN).ok_or(HeapError::Overflow)?;

        if start >= end || end - start < HEADER_SIZE + BLOCK_ALIGN {
            return Err(HeapError::InvalidSize);
        }

        self.start = start;
        self.end = end;
        self.high_water = start;
        self.head = None;
        self.tail = None;
        self.initialized = true;

        log::info!("heap: {:#x} - {:#x} ({} KB)", start, end, (end - start) / 1024);
        Ok(())
    }

    /// Place the arena right after the kernel image, `HEAP_SIZE` bytes long.
    ///
    /// For loaders that report where the image ends. `bootloader_api` does
    /// not, so [`crate::memory::init_heap`] hands over a static arena that
    /// is part of the image instead.
    ///
    /// # Safety
    /// Same as [`FirstFitHeap::init`].
    pub unsafe fn init_after_kernel(&mut self, kernel_end: usize) -> Result<(), HeapError> {
        self.init(kernel_end, crate::config::HEAP_SIZE)
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Arena bounds, `None` before `init`.
    pub fn bounds(&self) -> Option<(usize, usize)> {
        self.initialized.then_some((self.start, self.end))
    }

    pub fn high_water(&self) -> usize {
        self.high_water
    }

    /// Walk the chain in address order.
    pub fn blocks(&self) -> Blocks<'_> {
        Blocks {
            next: self.head,
            _heap: self,
        }
    }

    /// `allocate` for alignments above `BLOCK_ALIGN`.
    ///
    /// Over-allocates `size + align` bytes and hands out the first `align`
    /// boundary at least one word past the block payload. The word right
    /// before the returned pointer holds the block payload address, which
    /// [`FirstFitHeap::deallocate_aligned`] follows back.
    pub fn allocate_aligned(&mut self, size: usize, align: usize) -> Option<NonNull<u8>> {
        if !align.is_power_of_two() {
            return None;
        }
        if align <= BLOCK_ALIGN {
            return self.allocate(size);
        }
        if size == 0 {
            return None;
        }

        let padded = size.checked_add(align)?;
        let payload = self.allocate(padded)?.as_ptr() as usize;
        let aligned = align_up(payload + BLOCK_ALIGN, align);

        // SAFETY: payload is 8-aligned, so aligned - payload is between 8 and
        // align, and the back pointer and `size` bytes stay inside the block.
        unsafe { ((aligned - BLOCK_ALIGN) as *mut usize).write(payload) };
        NonNull::new(aligned as *mut u8)
    }

    /// Free a pointer returned by [`FirstFitHeap::allocate_aligned`] with the
    /// same `align`.
    pub fn deallocate_aligned(&mut self, ptr: *mut u8, align: usize) -> Result<(), HeapError> {
        if align <= BLOCK_ALIGN || ptr.is_null() {
            return self.deallocate(ptr);
        }
        if !self.initialized {
            return Err(HeapError::Uninitialized);
        }

        let addr = ptr as usize;
        if addr < self.start + HEADER_SIZE + BLOCK_ALIGN
            || addr >= self.high_water
            || !align.is_power_of_two()
            || addr & (align - 1) != 0
        {
            log::warn!("heap: aligned free of {:#x} outside the arena", addr);
            return Err(HeapError::InvalidPointer);
        }

        // SAFETY: the word lies inside the arena below the high-water mark.
        let payload = unsafe { ((addr - BLOCK_ALIGN) as *const usize).read() };
        if payload >= addr || addr - payload > align {
            log::warn!("heap: aligned free of {:#x} has no back pointer", addr);
            return Err(HeapError::InvalidPointer);
        }
        self.deallocate(payload as *mut u8)
    }

    fn find_fit(&self, size: usize) -> Option<NonNull<BlockHeader>> {
        let mut cursor = self.head;
        while let Some(node_ptr) = cursor {
            let node = unsafe { node_ptr.as_ref() };
            if node.free && node.size >= size {
                return Some(node_ptr);
            }
            cursor = node.next;
        }
        None
    }

    /// Cut `block` down to `size` if the remainder can carry a header and a
    /// minimal payload; the remainder becomes a free block right behind it.
    unsafe fn split(&mut self, mut block_ptr: NonNull<BlockHeader>, size: usize) {
        let block = block_ptr.as_mut();
        let remainder = block.size - size;
        if remainder < HEADER_SIZE + MIN_SPLIT_PAYLOAD {
            return;
        }

        let rest_ptr = (block.payload_addr() + size) as *mut BlockHeader;
        rest_ptr.write(BlockHeader {
            size: remainder - HEADER_SIZE,
            free: true,
            next: block.next,
        });

        block.size = size;
        block.next = NonNull::new(rest_ptr);

        if self.tail == Some(block_ptr) {
            self.tail = block.next;
        }
    }

    /// Append a fresh allocated block at the high-water mark.
    unsafe fn extend(&mut self, size: usize) -> Option<NonNull<BlockHeader>> {
        let block_start = self.high_water;
        let block_end = block_start.checked_add(HEADER_SIZE)?.checked_add(size)?;
        if block_end > self.end {
            return None;
        }

        let block_ptr = block_start as *mut BlockHeader;
        block_ptr.write(BlockHeader {
            size,
            free: false,
            next: None,
        });
        let block_ptr = NonNull::new(block_ptr)?;

        match self.tail {
            Some(mut tail) => tail.as_mut().next = Some(block_ptr),
            None => self.head = Some(block_ptr),
        }
        self.tail = Some(block_ptr);
        self.high_water = block_end;

        Some(block_ptr)
    }

    fn block_for_payload(&self, addr: usize) -> Option<NonNull<BlockHeader>> {
        let mut cursor = self.head;
        while let Some(node_ptr) = cursor {
            let node = unsafe { node_ptr.as_ref() };
            if node.payload_addr() == addr {
                return Some(node_ptr);
            }
            if node.payload_addr() > addr {
                return None;
            }
            cursor = node.next;
        }
        None
    }
}

impl Default for FirstFitHeap {
    fn default() -> Self {
        Self::new()
    }
}

impl KernelHeap for FirstFitHeap {
    fn allocate(&mut self, size: usize) -> Option<NonNull<u8>> {
        if !self.initialized || size == 0 {
            return None;
        }

        let size = checked_align_up(size, BLOCK_ALIGN)?;

        let block_ptr = match self.find_fit(size) {
            Some(mut block_ptr) => unsafe {
                self.split(block_ptr, size);
                block_ptr.as_mut().free = false;
                block_ptr
            },
            None => match unsafe { self.extend(size) } {
                Some(block_ptr) => block_ptr,
                None => {
                    log::warn!(
                        "heap: cannot allocate {} bytes, {} of {} left",
                        size,
                        self.end - self.high_water,
                        self.end - self.start
                    );
                    return None;
                }
            },
        };

        let block = unsafe { block_ptr.as_ref() };
        let payload = block.payload_addr() as *mut u8;
        // Hand out zeroed memory, whether the block is fresh or recycled.
        unsafe { ptr::write_bytes(payload, 0, block.size) };

        log::debug!("heap: allocated {} bytes at {:#x}", block.size, payload as usize);
        NonNull::new(payload)
    }

    fn deallocate(&mut self, ptr: *mut u8) -> Result<(), HeapError> {
        if ptr.is_null() {
            return Ok(());
        }
        if !self.initialized {
            return Err(HeapError::Uninitialized);
        }

        let addr = ptr as usize;
        if addr < self.start + HEADER_SIZE || addr >= self.high_water {
            log::warn!("heap: free of {:#x} outside the arena", addr);
            return Err(HeapError::InvalidPointer);
        }

        let mut block_ptr = self.block_for_payload(addr).ok_or_else(|| {
            log::warn!("heap: free of {:#x} which is not a block start", addr);
            HeapError::InvalidPointer
        })?;

        let block = unsafe { block_ptr.as_mut() };
        if block.free {
            log::warn!("heap: double free of {:#x}", addr);
            return Err(HeapError::DoubleFree);
        }

        block.free = true;
        log::debug!("heap: freed {} bytes at {:#x}", block.size, addr);
        Ok(())
    }

    fn describe_layout(&self, out: &mut dyn fmt::Write) -> fmt::Result {
        if !self.initialized {
            return writeln!(out, "heap: not initialized");
        }

        writeln!(
            out,
            "heap {:#x}-{:#x}, high water {:#x}",
            self.start, self.end, self.high_water
        )?;
        for (index, block) in self.blocks().enumerate() {
            writeln!(
                out,
                "  block {}: {:#x} size={} {}",
                index,
                block.payload,
                block.size,
                if block.free { "free" } else { "allocated" }
            )?;
        }

        let stats = self.stats();
        writeln!(
            out,
            "  used={} free={} blocks={} ({} free)",
            stats.used, stats.free, stats.blocks, stats.free_blocks
        )
    }

    fn stats(&self) -> HeapStats {
        let mut stats = HeapStats {
            start: self.start,
            end: self.end,
            high_water: self.high_water,
            ..HeapStats::default()
        };

        for block in self.blocks() {
            stats.blocks += 1;
            if block.free {
                stats.free_blocks += 1;
            } else {
                stats.used += HEADER_SIZE + block.size;
            }
        }
        stats.free = (self.end - self.start) - stats.used;
        stats
    }
}

/// Address-ordered iterator over the block chain.
pub struct Blocks<'a> {
    next: Option<NonNull<BlockHeader>>,
    _heap: &'a FirstFitHeap,
}

impl Iterator for Blocks<'_> {
    type Item = BlockInfo;

    fn next(&mut self) -> Option<BlockInfo> {
        let node_ptr = self.next?;
        // SAFETY: every pointer in the chain was written by the heap and
        // stays valid while the heap is borrowed.
        let node = unsafe { node_ptr.as_ref() };
        self.next = node.next;
        Some(BlockInfo {
            header: node.start_addr(),
            payload: node.payload_addr(),
            size: node.size,
            free: node.free,
        })
    }
}

/// Room for `payload` bytes including the header, for sizing test arenas and
/// static buffers.
pub const fn block_footprint(payload: usize) -> usize {
    HEADER_SIZE + align_up(payload, BLOCK_ALIGN)
}
