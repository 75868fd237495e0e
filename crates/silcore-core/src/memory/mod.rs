//! Tracked allocator.
//!
//! Every block carries a [`BlockHeader`](header::BlockHeader) just below
//! the user pointer recording the platform base, requested alignment, size
//! and flags. Debug builds additionally link each header into a global
//! list so live allocations can be counted, reported and mapped by tag.
//!
//! Failures return `None` and log a line at the caller's site; nothing
//! here retries.

mod header;
#[cfg(feature = "debug")]
mod list;
#[cfg(feature = "include-tests")]
mod fault;
mod global;
mod string;

use core::panic::Location;
use core::ptr::{self, NonNull};

use silcore_platform::mem as plat;

use crate::debug::Site;
use crate::error::SilError;
use header::{BlockHeader, header_of};

#[cfg(feature = "include-tests")]
pub use fault::{test_mem_fail_after, test_mem_fail_platform, test_mem_use};
pub use global::TrackedAllocator;
pub use string::MemString;

/// Returned by [`avail`]/[`contig`] when the platform cannot tell.
pub const MEM_UNKNOWN: i64 = -1;

/// Allocation flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MemFlags(u8);

impl MemFlags {
    /// Zero-fill new bytes.
    pub const CLEAR: MemFlags = MemFlags(1 << 0);
    /// Place at the top of the heap (long-lived).
    pub const TOP: MemFlags = MemFlags(1 << 1);
    /// Short-lived block; a placement hint.
    pub const TEMP: MemFlags = MemFlags(1 << 2);

    const PLACEMENT: MemFlags = MemFlags(Self::TOP.0 | Self::TEMP.0);

    #[must_use]
    pub const fn empty() -> Self {
        MemFlags(0)
    }

    #[must_use]
    pub const fn bits(self) -> u8 {
        self.0
    }

    #[must_use]
    pub const fn contains(self, other: MemFlags) -> bool {
        self.0 & other.0 == other.0
    }

    #[must_use]
    pub const fn union(self, other: MemFlags) -> Self {
        MemFlags(self.0 | other.0)
    }

    const fn placement(self) -> MemFlags {
        MemFlags(self.0 & Self::PLACEMENT.0)
    }
}

impl core::ops::BitOr for MemFlags {
    type Output = MemFlags;

    fn bitor(self, rhs: MemFlags) -> MemFlags {
        self.union(rhs)
    }
}

/// Coarse owner classification recorded for debug reports and maps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum MemTag {
    #[default]
    Unknown,
    Manage,
    Font,
    Texture,
    Sound,
    Buffer,
    Handle,
    Sync,
}

impl MemTag {
    pub const COUNT: usize = 8;

    const ALL: [MemTag; Self::COUNT] = [
        MemTag::Unknown,
        MemTag::Manage,
        MemTag::Font,
        MemTag::Texture,
        MemTag::Sound,
        MemTag::Buffer,
        MemTag::Handle,
        MemTag::Sync,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            MemTag::Unknown => "unknown",
            MemTag::Manage => "manage",
            MemTag::Font => "font",
            MemTag::Texture => "texture",
            MemTag::Sound => "sound",
            MemTag::Buffer => "buffer",
            MemTag::Handle => "handle",
            MemTag::Sync => "sync",
        }
    }

    #[must_use]
    pub fn from_index(index: usize) -> Option<MemTag> {
        Self::ALL.get(index).copied()
    }
}

fn report(err: SilError, site: &'static Location<'static>) {
    err.report(&Site::from_location(site));
}

#[inline]
fn fault_fires(shrinking: bool) -> bool {
    #[cfg(feature = "include-tests")]
    {
        fault::should_fail(shrinking)
    }
    #[cfg(not(feature = "include-tests"))]
    {
        let _ = shrinking;
        false
    }
}

/// Fill byte for fresh, uncleared memory.
const FRESH_FILL: Option<u8> = if cfg!(feature = "memory-debug-fill") { Some(0xBB) } else { None };
/// Fill byte for freed memory.
const FREED_FILL: Option<u8> =
    if cfg!(any(feature = "debug", feature = "memory-debug-fill")) { Some(0xDD) } else { None };

/// # Safety
///
/// `[user + from, user + to)` lies inside a live block.
unsafe fn init_fresh(user: *mut u8, from: usize, to: usize, flags: MemFlags) {
    if to <= from {
        return;
    }
    // SAFETY: per contract.
    unsafe {
        if flags.contains(MemFlags::CLEAR) {
            ptr::write_bytes(user.add(from), 0, to - from);
        } else if let Some(fill) = FRESH_FILL {
            ptr::write_bytes(user.add(from), fill, to - from);
        }
    }
}

/// Allocate `size` bytes aligned to `align` (a power of two; 0 selects the
/// platform's strongest default alignment).
///
/// `MemFlags::CLEAR` zero-fills the block. Returns `None` for a zero size,
/// a bad alignment, or when memory is exhausted.
#[must_use]
#[track_caller]
pub fn alloc(size: usize, align: usize, flags: MemFlags) -> Option<NonNull<u8>> {
    alloc_at(size, align, flags, Location::caller())
}

pub(crate) fn alloc_at(
    size: usize,
    align: usize,
    flags: MemFlags,
    site: &'static Location<'static>,
) -> Option<NonNull<u8>> {
    if size == 0 {
        report(SilError::InvalidArgument("zero-size allocation"), site);
        return None;
    }
    if align != 0 && !align.is_power_of_two() {
        crate::debug::precondition_violated(
            &Site::from_location(site),
            SilError::InvalidArgument("alignment is not a power of two"),
        );
        return None;
    }
    if fault_fires(false) {
        report(SilError::OutOfMemory, site);
        return None;
    }
    #[cfg(feature = "include-tests")]
    if let Some(block) = fault::take_use_next() {
        // SAFETY: `test_mem_use` requires a live block from this allocator.
        if let Some(user) = unsafe { reuse_block(block, size, align, flags, site) } {
            return Some(user);
        }
    }
    alloc_raw(size, align, flags, MemTag::Unknown, site)
}

fn alloc_raw(
    size: usize,
    align: usize,
    flags: MemFlags,
    tag: MemTag,
    site: &'static Location<'static>,
) -> Option<NonNull<u8>> {
    let Some(plan) = header::plan(size, align) else {
        report(SilError::InvalidArgument("allocation size overflows"), site);
        return None;
    };
    let base = plat::sys_alloc(plan.total, plan.plat_align);
    if base.is_null() {
        report(SilError::OutOfMemory, site);
        return None;
    }
    let offset = header::user_offset(base as usize, align);
    // SAFETY: `plan` reserves room for the header, the alignment slack and
    // `size` bytes past `offset`.
    unsafe {
        let user = base.add(offset);
        let hdr = header_of(user);
        hdr.write(BlockHeader::new(base, align, size, flags, user, site, tag));
        init_fresh(user, 0, size, flags);
        #[cfg(feature = "debug")]
        list::track(hdr);
        #[cfg(feature = "memory-log-allocs")]
        crate::dlog!("alloc %p size %zu align %zu", user.cast_const(), size, align);
        NonNull::new(user)
    }
}

/// Hand an abandoned live block to a new request (fault-injection hook).
///
/// # Safety
///
/// `block` is a live allocation from this allocator.
#[cfg(feature = "include-tests")]
unsafe fn reuse_block(
    block: NonNull<u8>,
    size: usize,
    align: usize,
    flags: MemFlags,
    site: &'static Location<'static>,
) -> Option<NonNull<u8>> {
    let user = block.as_ptr();
    let hdr = header_of(user);
    // SAFETY: live block per contract.
    unsafe {
        let fits = size <= (*hdr).size && (user as usize) % header::effective_align(align) == 0;
        if !fits {
            crate::dlog!("test_mem_use block %p does not fit; ignored", user.cast_const());
            return None;
        }
        // `include-tests` implies `debug`, so the block is tracked.
        list::resize(hdr, size);
        list::set_tag(hdr, MemTag::Unknown);
        (*hdr).site = Some(site);
        (*hdr).flags = flags;
        init_fresh(user, 0, size, flags);
    }
    Some(block)
}

/// In pointer-check builds, log and reject pointers that are not live.
fn pointer_is_live(user: *mut u8, site: &'static Location<'static>) -> bool {
    #[cfg(feature = "memory-check-pointers")]
    if !list::contains(user) {
        report(SilError::InvalidArgument("pointer is not a live allocation"), site);
        return false;
    }
    let _ = (user, site);
    true
}

/// Resize a block, preserving `min(old, new)` bytes.
///
/// `None` in `ptr` behaves as [`alloc`] with default alignment; a zero
/// `size` frees the block and returns `None`. On failure the original
/// block is untouched. Growth zero-fills the new tail when `flags`
/// contains `CLEAR`. The block's alignment and debug tag are preserved.
///
/// # Safety
///
/// `ptr` must be `None` or a live block from this allocator. On success
/// the old pointer must no longer be used.
#[must_use]
#[track_caller]
pub unsafe fn realloc(ptr: Option<NonNull<u8>>, size: usize, flags: MemFlags) -> Option<NonNull<u8>> {
    let site = Location::caller();
    let Some(block) = ptr else {
        return alloc_at(size, 0, flags, site);
    };
    if size == 0 {
        // SAFETY: forwarded contract.
        unsafe { free_at(block, site) };
        return None;
    }
    let user = block.as_ptr();
    if !pointer_is_live(user, site) {
        return None;
    }
    let hdr = header_of(user);
    // SAFETY: live block per contract.
    let (old_size, align, old_flags, base) =
        unsafe { ((*hdr).size, (*hdr).align, (*hdr).flags, (*hdr).base) };
    if fault_fires(size <= old_size) {
        report(SilError::OutOfMemory, site);
        return None;
    }
    let placement_moved =
        plat::honours_placement() && old_flags.placement() != flags.placement();
    if placement_moved || header::effective_align(align) > plat::MAX_ALIGN {
        // SAFETY: forwarded contract.
        return unsafe { move_block(block, size, flags, site) };
    }
    let Some(plan) = header::plan(size, align) else {
        report(SilError::InvalidArgument("allocation size overflows"), site);
        return None;
    };
    #[cfg(feature = "debug")]
    // SAFETY: header of a live, linked block.
    let (tag, origin) = unsafe {
        list::untrack(hdr);
        ((*hdr).tag, (*hdr).site)
    };
    let old_offset = user as usize - base as usize;
    // SAFETY: `base` came from the platform allocator with `plat_align`.
    let new_base = unsafe { plat::sys_realloc(base, plan.total, plan.plat_align) };
    if new_base.is_null() {
        // SAFETY: the old block is untouched on failure.
        #[cfg(feature = "debug")]
        unsafe {
            list::track(hdr);
        }
        report(SilError::OutOfMemory, site);
        return None;
    }
    let new_offset = header::user_offset(new_base as usize, align);
    // SAFETY: `plan` covers `new_offset + size`; the old user bytes live at
    // `old_offset` in the resized block.
    unsafe {
        let new_user = new_base.add(new_offset);
        if new_offset != old_offset {
            ptr::copy(new_base.add(old_offset), new_user, old_size.min(size));
        }
        let new_hdr = header_of(new_user);
        #[cfg(feature = "debug")]
        let (tag, origin) = (tag, origin.unwrap_or(site));
        #[cfg(not(feature = "debug"))]
        let (tag, origin) = (MemTag::Unknown, site);
        new_hdr.write(BlockHeader::new(new_base, align, size, flags, new_user, origin, tag));
        init_fresh(new_user, old_size, size, flags);
        #[cfg(feature = "debug")]
        list::track(new_hdr);
        NonNull::new(new_user)
    }
}

/// Alloc-copy-free path for blocks the platform cannot resize in place.
///
/// # Safety
///
/// `block` is a live allocation.
unsafe fn move_block(
    block: NonNull<u8>,
    size: usize,
    flags: MemFlags,
    site: &'static Location<'static>,
) -> Option<NonNull<u8>> {
    let hdr = header_of(block.as_ptr());
    // SAFETY: live block per contract.
    let (old_size, align) = unsafe { ((*hdr).size, (*hdr).align) };
    #[cfg(feature = "debug")]
    // SAFETY: live block per contract.
    let tag = unsafe { (*hdr).tag };
    #[cfg(not(feature = "debug"))]
    let tag = MemTag::Unknown;
    let fresh = alloc_raw(size, align, flags, tag, site)?;
    // SAFETY: both blocks are live and distinct.
    unsafe {
        ptr::copy_nonoverlapping(block.as_ptr(), fresh.as_ptr(), old_size.min(size));
        free_at(block, site);
    }
    Some(fresh)
}

/// Release a block. `None` is a no-op.
///
/// # Safety
///
/// `ptr` must be `None` or a live block from this allocator, not used
/// afterwards.
#[track_caller]
pub unsafe fn free(ptr: Option<NonNull<u8>>) {
    if let Some(block) = ptr {
        // SAFETY: forwarded contract.
        unsafe { free_at(block, Location::caller()) };
    }
}

unsafe fn free_at(block: NonNull<u8>, site: &'static Location<'static>) {
    let user = block.as_ptr();
    if !pointer_is_live(user, site) {
        return;
    }
    let hdr = header_of(user);
    // SAFETY: live block per contract.
    unsafe {
        let (size, base) = ((*hdr).size, (*hdr).base);
        #[cfg(feature = "debug")]
        list::untrack(hdr);
        if let Some(fill) = FREED_FILL {
            ptr::write_bytes(user, fill, size);
        }
        #[cfg(feature = "memory-log-allocs")]
        crate::dlog!("free %p size %zu", user.cast_const(), size);
        plat::sys_free(base);
    }
}

/// Copy `s` into a new NUL-terminated block.
#[must_use]
#[track_caller]
pub fn strdup(s: &str, flags: MemFlags) -> Option<NonNull<u8>> {
    let copy = alloc_at(s.len() + 1, 0, flags, Location::caller())?;
    // SAFETY: the block holds `len + 1` bytes.
    unsafe {
        ptr::copy_nonoverlapping(s.as_ptr(), copy.as_ptr(), s.len());
        *copy.as_ptr().add(s.len()) = 0;
    }
    Some(copy)
}

fn advisory(bytes: Option<u64>, overhead: u64) -> i64 {
    match bytes {
        Some(b) => i64::try_from(b.saturating_sub(overhead)).unwrap_or(i64::MAX),
        None => MEM_UNKNOWN,
    }
}

/// Advisory free-byte count, or [`MEM_UNKNOWN`].
#[must_use]
pub fn avail(flags: MemFlags) -> i64 {
    let _ = flags;
    advisory(plat::sys_avail(), 0)
}

/// Advisory largest single request, net of header overhead, or
/// [`MEM_UNKNOWN`].
#[must_use]
pub fn contig(flags: MemFlags) -> i64 {
    let _ = flags;
    advisory(plat::sys_contig(), header::overhead() as u64)
}

/// Attach a debug tag to a live block. No-op without `debug`.
///
/// # Safety
///
/// `ptr` must be a live block from this allocator.
#[track_caller]
pub unsafe fn debug_set_info(ptr: NonNull<u8>, tag: MemTag) {
    #[cfg(feature = "debug")]
    if pointer_is_live(ptr.as_ptr(), Location::caller()) {
        // SAFETY: live block per contract.
        unsafe { list::set_tag(header_of(ptr.as_ptr()), tag) };
    }
    #[cfg(not(feature = "debug"))]
    let _ = (ptr, tag);
}

/// Debug tag of a live block; `None` without `debug`.
///
/// # Safety
///
/// `ptr` must be a live block from this allocator.
#[must_use]
pub unsafe fn debug_get_info(ptr: NonNull<u8>) -> Option<MemTag> {
    #[cfg(feature = "debug")]
    {
        let _guard = list::lock();
        // SAFETY: live block per contract; lock held.
        Some(unsafe { (*header_of(ptr.as_ptr())).tag })
    }
    #[cfg(not(feature = "debug"))]
    {
        let _ = ptr;
        None
    }
}

/// Requested size of a live block.
///
/// # Safety
///
/// `ptr` must be a live block from this allocator.
#[must_use]
pub unsafe fn block_size(ptr: NonNull<u8>) -> usize {
    // SAFETY: live block per contract.
    unsafe { (*header_of(ptr.as_ptr())).size }
}

/// Total user bytes currently allocated (0 without `debug`).
#[must_use]
pub fn debug_bytes_allocated() -> usize {
    #[cfg(feature = "debug")]
    {
        list::bytes_allocated()
    }
    #[cfg(not(feature = "debug"))]
    {
        0
    }
}

/// Number of live blocks (0 without `debug`).
#[must_use]
pub fn debug_live_allocations() -> usize {
    #[cfg(feature = "debug")]
    {
        list::live_allocations()
    }
    #[cfg(not(feature = "debug"))]
    {
        0
    }
}

/// Log every live allocation with its site and tag; returns the count.
pub fn debug_report_allocs() -> usize {
    #[cfg(feature = "debug")]
    {
        list::report()
    }
    #[cfg(not(feature = "debug"))]
    {
        crate::dlog!("allocation tracking is compiled out");
        0
    }
}

/// Summarise `[base, base + size)` into `out.len()` equal chunks: each
/// entry is `None` when no live block touches the chunk, otherwise the tag
/// covering the most bytes of it.
pub fn debug_get_map(base: usize, size: usize, out: &mut [Option<MemTag>]) {
    #[cfg(feature = "debug")]
    list::map(base, size, out);
    #[cfg(not(feature = "debug"))]
    {
        let _ = (base, size);
        out.fill(None);
    }
}
