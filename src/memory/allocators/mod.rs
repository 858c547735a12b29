//! # Memory Allocators
//!
//! Byte and page allocators over fixed arenas. None of them map memory;
//! they only carve up a region they are handed at `init`.
//!
//! ## Allocator Types
//!
//! ### FirstFitHeap
//! - Contiguous blocks, each prefixed by a `{ size, free, next }` header
//! - First-fit reuse of freed blocks, splitting off the unused tail
//! - Grows at the high-water mark when nothing fits
//! - No coalescing
//!
//! ### BumpHeap
//! - Only moves the high-water mark, frees are ignored
//! - Good for: boot-time data that lives forever
//!
//! ### PagePool
//! - Fixed count of page-aligned pages with a used flag each
//!
//! ## Common Utilities
//!
//! - `KernelHeap`: what every byte allocator offers
//! - `HeapError`: allocation and free failure types
//! - Alignment helpers: `align_up`, `align_down`

pub mod bump;
pub mod common;
pub mod first_fit;
pub mod page_pool;

pub use bump::BumpHeap;
pub use common::{align_down, align_up, HeapError, HeapStats, KernelHeap};
pub use first_fit::{BlockInfo, FirstFitHeap, BLOCK_ALIGN, HEADER_SIZE};
pub use page_pool::PagePool;
