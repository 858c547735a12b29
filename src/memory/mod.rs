//! # Kernel Heap
//!
//! A static, page-aligned arena embedded in the kernel image backs all
//! dynamic memory. The low part is a [`FirstFitHeap`]; the top
//! [`PAGE_POOL_PAGES`] pages form a [`PagePool`]. Both sit behind one spin
//! lock in [`LockedHeap`], which is also the `#[global_allocator]`.
//!
//! Routing by layout:
//!
//! | Alignment        | Size        | Served by                              |
//! |------------------|-------------|----------------------------------------|
//! | <= 8             | any         | first-fit heap                         |
//! | 4096             | <= 4096     | page pool, heap when the pool is empty |
//! | 16 ..= 4096      | other       | first-fit heap, over-allocated         |
//! | > 4096           | any         | nothing (null)                         |
//!
//! Interrupt handlers must not allocate: the lock is not taken with
//! interrupts disabled.

pub mod allocators;

use core::alloc::{GlobalAlloc, Layout};
use core::fmt;
use core::ptr::{self, addr_of_mut, NonNull};

use bootloader_api::info::MemoryRegionKind;
use bootloader_api::BootInfo;
use spin::Mutex;

use crate::config::{ARENA_SIZE, PAGE_POOL_PAGES, PAGE_SIZE};
use crate::logging::SerialWriter;
use crate::memory::allocators::{
    align_down, FirstFitHeap, HeapError, HeapStats, KernelHeap, PagePool, BLOCK_ALIGN,
};

type KernelPagePool = PagePool<PAGE_POOL_PAGES>;

#[repr(align(4096))]
struct HeapBuffer([u8; ARENA_SIZE]);
static mut HEAP_BUFFER: HeapBuffer = HeapBuffer([0; ARENA_SIZE]);

#[cfg_attr(not(test), global_allocator)]
pub static ALLOCATOR: LockedHeap = LockedHeap::new();

struct Heaps {
    heap: FirstFitHeap,
    pages: KernelPagePool,
}

pub struct LockedHeap {
    inner: Mutex<Heaps>,
}

impl LockedHeap {
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(Heaps {
                heap: FirstFitHeap::new(),
                pages: KernelPagePool::new(),
            }),
        }
    }

    /// Split `[arena_start, arena_start + arena_size)` into the byte heap and
    /// the page pool on top of it.
    ///
    /// # Safety
    /// The region must be valid, writable and used by nothing else.
    pub unsafe fn init(&self, arena_start: usize, arena_size: usize) -> Result<(), HeapError> {
        let arena_end = arena_start
            .checked_add(arena_size)
            .ok_or(HeapError::Overflow)?;
        let pool_base = align_down(
            arena_end
                .checked_sub(KernelPagePool::BYTES)
                .ok_or(HeapError::InvalidSize)?,
            PAGE_SIZE,
        );
        if pool_base <= arena_start {
            return Err(HeapError::InvalidSize);
        }

        let mut inner = self.inner.lock();
        inner.heap.init(arena_start, pool_base - arena_start)?;
        inner.pages.init(pool_base)
    }

    pub fn allocate(&self, size: usize) -> Option<NonNull<u8>> {
        self.inner.lock().heap.allocate(size)
    }

    pub fn deallocate(&self, ptr: *mut u8) -> Result<(), HeapError> {
        self.inner.lock().heap.deallocate(ptr)
    }

    pub fn allocate_page(&self) -> Option<NonNull<u8>> {
        self.inner.lock().pages.allocate_page()
    }

    pub fn free_page(&self, ptr: *mut u8) -> Result<(), HeapError> {
        self.inner.lock().pages.free_page(ptr)
    }

    pub fn stats(&self) -> HeapStats {
        self.inner.lock().heap.stats()
    }

    /// Pages currently handed out by the pool.
    pub fn pages_in_use(&self) -> usize {
        self.inner.lock().pages.used_pages()
    }

    pub fn describe_layout(&self, out: &mut dyn fmt::Write) -> fmt::Result {
        let inner = self.inner.lock();
        inner.heap.describe_layout(out)?;
        inner.pages.describe(out)
    }
}

impl Default for LockedHeap {
    fn default() -> Self {
        Self::new()
    }
}

/// Largest alignment the first-fit heap serves by over-allocating.
const MAX_HEAP_ALIGN: usize = PAGE_SIZE;

/// Page-aligned requests of at most one page go to the pool.
fn wants_page(layout: &Layout) -> bool {
    layout.align() == PAGE_SIZE && layout.size() <= PAGE_SIZE
}

unsafe impl GlobalAlloc for LockedHeap {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let mut inner = self.inner.lock();
        let block = if layout.align() <= BLOCK_ALIGN {
            inner.heap.allocate(layout.size())
        } else if layout.align() <= MAX_HEAP_ALIGN {
            let page = if wants_page(&layout) {
                inner.pages.allocate_page()
            } else {
                None
            };
            page.or_else(|| inner.heap.allocate_aligned(layout.size(), layout.align()))
        } else {
            log::warn!(
                "no allocator for size={} align={}",
                layout.size(),
                layout.align()
            );
            None
        };
        block.map_or(ptr::null_mut(), NonNull::as_ptr)
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        let mut inner = self.inner.lock();
        let result = if inner.pages.contains(ptr as usize) {
            inner.pages.free_page(ptr)
        } else {
            inner.heap.deallocate_aligned(ptr, layout.align())
        };
        if let Err(err) = result {
            log::warn!("dealloc of {:#x} failed: {}", ptr as usize, err);
        }
    }
}

/// Hand the static arena to [`ALLOCATOR`]. A second call fails with
/// `AlreadyInitialized` and changes nothing.
///
/// The arena is a page-aligned static inside the kernel image, since the
/// boot info carries no end-of-image address to place it after. Loaders that
/// do report one can use [`FirstFitHeap::init_after_kernel`].
pub fn init_heap() -> Result<(), HeapError> {
    // SAFETY: HEAP_BUFFER is only ever touched through ALLOCATOR, and the
    // allocator refuses to initialize twice.
    unsafe {
        let start = addr_of_mut!(HEAP_BUFFER) as usize;
        ALLOCATOR.init(start, ARENA_SIZE)
    }
}

/// Dump heap bounds, every block and the page pool to the serial console.
pub fn print_memory_layout() {
    let _ = ALLOCATOR.describe_layout(&mut SerialWriter);
}

/// Log the firmware memory map handed over by the bootloader.
pub fn log_memory_map(boot_info: &BootInfo) {
    let mut total_usable = 0u64;
    let mut total_reserved = 0u64;

    for region in boot_info.memory_regions.iter() {
        let size = region.end - region.start;
        let kind = match region.kind {
            MemoryRegionKind::Usable => "usable",
            MemoryRegionKind::Bootloader => "bootloader",
            MemoryRegionKind::UnknownBios(_) => "bios",
            MemoryRegionKind::UnknownUefi(_) => "uefi",
            _ => "reserved",
        };
        if region.kind == MemoryRegionKind::Usable {
            total_usable += size;
        } else {
            total_reserved += size;
        }

        log::debug!(
            "  {:#018x} - {:#018x} ({:>8} KB) [{}]",
            region.start,
            region.end,
            size / 1024,
            kind
        );
    }

    log::info!(
        "memory map: {} MB usable, {} MB reserved",
        total_usable / (1024 * 1024),
        total_reserved / (1024 * 1024)
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::FmtBuf;
    use crate::memory::allocators::HEADER_SIZE;

    #[repr(C, align(4096))]
    struct Page([u8; PAGE_SIZE]);

    /// Arena with `heap_pages` pages for the byte heap plus the page pool.
    fn arena(heap_pages: usize) -> Vec<Page> {
        (0..heap_pages + PAGE_POOL_PAGES)
            .map(|_| Page([0; PAGE_SIZE]))
            .collect()
    }

    fn locked_over(pages: &mut [Page]) -> LockedHeap {
        let heap = LockedHeap::new();
        unsafe {
            heap.init(pages.as_mut_ptr() as usize, pages.len() * PAGE_SIZE)
                .unwrap()
        };
        heap
    }

    #[test]
    fn small_alignments_go_to_the_first_fit_heap() {
        let mut pages = arena(2);
        let base = pages.as_mut_ptr() as usize;
        let heap = locked_over(&mut pages);

        let layout = Layout::from_size_align(24, 8).unwrap();
        let p = unsafe { heap.alloc(layout) };
        assert_eq!(p as usize, base + HEADER_SIZE);
        assert_eq!(heap.stats().blocks, 1);

        unsafe { heap.dealloc(p, layout) };
        assert_eq!(heap.stats().free_blocks, 1);
    }

    #[test]
    fn page_aligned_requests_go_to_the_pool() {
        let mut pages = arena(2);
        let pool_base = pages.as_mut_ptr() as usize + 2 * PAGE_SIZE;
        let heap = locked_over(&mut pages);

        let layout = Layout::from_size_align(PAGE_SIZE, PAGE_SIZE).unwrap();
        let p = unsafe { heap.alloc(layout) };
        assert_eq!(p as usize, pool_base);
        assert_eq!(heap.pages_in_use(), 1);
        assert_eq!(heap.stats().blocks, 0);

        unsafe { heap.dealloc(p, layout) };
        assert_eq!(heap.pages_in_use(), 0);
    }

    #[test]
    fn sixteen_byte_alignment_uses_the_heap_not_whole_pages() {
        let mut pages = arena(4);
        let heap = locked_over(&mut pages);
        let small = Layout::from_size_align(16, 16).unwrap();

        let served: Vec<*mut u8> = (0..40).map(|_| unsafe { heap.alloc(small) }).collect();
        assert!(served.iter().all(|p| !p.is_null() && *p as usize % 16 == 0));
        assert_eq!(heap.pages_in_use(), 0);
        assert_eq!(heap.stats().blocks, 40);

        let wide = Layout::from_size_align(4800, 16).unwrap();
        let big = unsafe { heap.alloc(wide) };
        assert!(!big.is_null());
        assert_eq!(big as usize % 16, 0);
        assert_eq!(heap.pages_in_use(), 0);

        for p in served {
            unsafe { heap.dealloc(p, small) };
        }
        unsafe { heap.dealloc(big, wide) };
        let stats = heap.stats();
        assert_eq!(stats.free_blocks, stats.blocks);
    }

    #[test]
    fn page_requests_fall_back_to_the_heap_when_the_pool_is_empty() {
        let mut pages = arena(4);
        let heap = locked_over(&mut pages);
        let page = Layout::from_size_align(PAGE_SIZE, PAGE_SIZE).unwrap();

        let from_pool: Vec<*mut u8> = (0..PAGE_POOL_PAGES)
            .map(|_| unsafe { heap.alloc(page) })
            .collect();
        assert_eq!(heap.pages_in_use(), PAGE_POOL_PAGES);

        let extra = unsafe { heap.alloc(page) };
        assert!(!extra.is_null());
        assert_eq!(extra as usize % PAGE_SIZE, 0);
        assert_eq!(heap.stats().blocks, 1);

        unsafe { heap.dealloc(extra, page) };
        assert_eq!(heap.stats().free_blocks, 1);
        for p in from_pool {
            unsafe { heap.dealloc(p, page) };
        }
        assert_eq!(heap.pages_in_use(), 0);
    }

    #[test]
    fn unserviceable_layouts_return_null() {
        let mut pages = arena(1);
        let heap = locked_over(&mut pages);

        let huge_align = Layout::from_size_align(64, 2 * PAGE_SIZE).unwrap();
        assert!(unsafe { heap.alloc(huge_align) }.is_null());

        let too_big = Layout::from_size_align(8 * PAGE_SIZE, 8).unwrap();
        assert!(unsafe { heap.alloc(too_big) }.is_null());
    }

    #[test]
    fn arena_too_small_for_pool_is_rejected() {
        let mut pages = arena(0);
        let heap = LockedHeap::new();
        let result = unsafe { heap.init(pages.as_mut_ptr() as usize, pages.len() * PAGE_SIZE) };
        assert_eq!(result, Err(HeapError::InvalidSize));
        assert!(heap.allocate(8).is_none());
    }

    #[test]
    fn second_init_is_refused() {
        let mut pages = arena(1);
        let mut other = arena(1);
        let heap = locked_over(&mut pages);
        let before = heap.stats();

        let again =
            unsafe { heap.init(other.as_mut_ptr() as usize, other.len() * PAGE_SIZE) };
        assert_eq!(again, Err(HeapError::AlreadyInitialized));
        assert_eq!(heap.stats(), before);
    }

    #[test]
    fn layout_dump_covers_heap_and_pool() {
        let mut pages = arena(1);
        let heap = locked_over(&mut pages);
        heap.allocate(16).unwrap();
        heap.allocate_page().unwrap();

        let mut buf = [0u8; 512];
        let mut out = FmtBuf::new(&mut buf);
        heap.describe_layout(&mut out).unwrap();

        let text = out.as_str();
        assert!(text.contains("block 0:"));
        assert!(text.contains("size=16 allocated"));
        assert!(text.contains("1/32 used"));
    }
}
