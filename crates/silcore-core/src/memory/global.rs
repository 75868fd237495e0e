//! `GlobalAlloc` adapter over the tracked allocator.
//!
//! ```ignore
//! #[global_allocator]
//! static GLOBAL: silcore_core::memory::TrackedAllocator = silcore_core::memory::TrackedAllocator;
//! ```
//!
//! Every Rust allocation then carries a block header and, in debug builds,
//! shows up in [`debug_report_allocs`](super::debug_report_allocs) and the
//! byte counters.

use core::alloc::{GlobalAlloc, Layout};
use core::panic::Location;
use core::ptr::{self, NonNull};

use super::MemFlags;

/// Routes the Rust global allocator through the tracked allocator.
#[derive(Debug, Clone, Copy, Default)]
pub struct TrackedAllocator;

fn to_raw(block: Option<NonNull<u8>>) -> *mut u8 {
    block.map_or(ptr::null_mut(), NonNull::as_ptr)
}

// SAFETY: blocks honour the layout's size and alignment, and are only
// released through the same allocator.
unsafe impl GlobalAlloc for TrackedAllocator {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        to_raw(super::alloc_at(
            layout.size(),
            layout.align(),
            MemFlags::empty(),
            Location::caller(),
        ))
    }

    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        to_raw(super::alloc_at(
            layout.size(),
            layout.align(),
            MemFlags::CLEAR,
            Location::caller(),
        ))
    }

    unsafe fn dealloc(&self, ptr: *mut u8, _layout: Layout) {
        // SAFETY: `ptr` came from this allocator per the `GlobalAlloc` contract.
        unsafe { super::free(NonNull::new(ptr)) };
    }

    unsafe fn realloc(&self, ptr: *mut u8, _layout: Layout, new_size: usize) -> *mut u8 {
        // SAFETY: `ptr` is live; the stored alignment is kept across resizes.
        to_raw(unsafe { super::realloc(NonNull::new(ptr), new_size, MemFlags::empty()) })
    }
}
