//! Block header layout and placement arithmetic.
//!
//! ```text
//! base                                   user (aligned to `align`)
//! |<- slack ->|<------ BlockHeader ----->|<-------- size -------->|
//!             ^ round_down(user, PTR_ALIGN) - HEADER_SIZE
//! ```
//!
//! Invariants: `user >= base + HEADER_SIZE`, `user + size <= base + total`,
//! and the header is pointer-aligned.

use core::panic::Location;

use silcore_platform::mem::MAX_ALIGN;

use super::{MemFlags, MemTag};

pub(crate) const PTR_ALIGN: usize = core::mem::align_of::<usize>();

#[repr(C)]
pub(crate) struct BlockHeader {
    /// Pointer returned by the platform allocator.
    pub(crate) base: *mut u8,
    /// Requested alignment; zero means the default.
    pub(crate) align: usize,
    pub(crate) size: usize,
    pub(crate) flags: MemFlags,
    #[cfg(feature = "debug")]
    pub(crate) next: *mut BlockHeader,
    #[cfg(feature = "debug")]
    pub(crate) prev: *mut BlockHeader,
    #[cfg(feature = "debug")]
    pub(crate) user: *mut u8,
    #[cfg(feature = "debug")]
    pub(crate) site: Option<&'static Location<'static>>,
    #[cfg(feature = "debug")]
    pub(crate) tag: MemTag,
}

pub(crate) const HEADER_SIZE: usize = core::mem::size_of::<BlockHeader>();

const _: () = assert!(HEADER_SIZE % PTR_ALIGN == 0);

impl BlockHeader {
    /// Zeroed header used for the tracking-list fenceposts.
    #[cfg(feature = "debug")]
    pub(crate) const FENCEPOST: BlockHeader = BlockHeader {
        base: core::ptr::null_mut(),
        align: 0,
        size: 0,
        flags: MemFlags::empty(),
        next: core::ptr::null_mut(),
        prev: core::ptr::null_mut(),
        user: core::ptr::null_mut(),
        site: None,
        tag: MemTag::Unknown,
    };

    pub(crate) fn new(
        base: *mut u8,
        align: usize,
        size: usize,
        flags: MemFlags,
        user: *mut u8,
        site: &'static Location<'static>,
        tag: MemTag,
    ) -> Self {
        #[cfg(not(feature = "debug"))]
        let _ = (user, site, tag);
        Self {
            base,
            align,
            size,
            flags,
            #[cfg(feature = "debug")]
            next: core::ptr::null_mut(),
            #[cfg(feature = "debug")]
            prev: core::ptr::null_mut(),
            #[cfg(feature = "debug")]
            user,
            #[cfg(feature = "debug")]
            site: Some(site),
            #[cfg(feature = "debug")]
            tag,
        }
    }
}

/// Platform request for one block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Plan {
    pub(crate) total: usize,
    pub(crate) plat_align: usize,
}

#[inline]
pub(crate) const fn effective_align(requested: usize) -> usize {
    if requested == 0 { MAX_ALIGN } else { requested }
}

#[inline]
const fn round_up(value: usize, align: usize) -> usize {
    (value + align - 1) & !(align - 1)
}

/// Whether the debug misalignment bump applies to this request.
#[inline]
const fn bumps(requested: usize) -> bool {
    cfg!(feature = "debug") && requested != 0
}

/// Platform size and alignment for `size` bytes at `requested` alignment.
/// `None` on arithmetic overflow.
pub(crate) fn plan(size: usize, requested: usize) -> Option<Plan> {
    let align = effective_align(requested);
    let plat_align = align.min(MAX_ALIGN);
    let padded = HEADER_SIZE.checked_add(plat_align - 1)? & !(plat_align - 1);
    let over = align.saturating_sub(MAX_ALIGN);
    let bump = if bumps(requested) { align } else { 0 };
    let total = size.checked_add(padded)?.checked_add(over)?.checked_add(bump)?;
    Some(Plan { total, plat_align })
}

/// Offset of the user pointer from `base`.
pub(crate) fn user_offset(base: usize, requested: usize) -> usize {
    let align = effective_align(requested);
    let mut user = round_up(base + HEADER_SIZE, align);
    // Aligned to `align` but deliberately not to `2 * align`.
    if bumps(requested) && user & align == 0 {
        user += align;
    }
    user - base
}

/// Header address for a user pointer.
#[inline]
pub(crate) fn header_of(user: *mut u8) -> *mut BlockHeader {
    let aligned = (user as usize) & !(PTR_ALIGN - 1);
    (aligned - HEADER_SIZE) as *mut BlockHeader
}

/// Header overhead charged against contiguous-space queries.
pub(crate) const fn overhead() -> usize {
    HEADER_SIZE + MAX_ALIGN
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placement_stays_inside_the_block() {
        for requested in [0usize, 1, 2, 4, 8, 16, 32, 64, 1000usize.next_power_of_two(), 4096] {
            for base in [0x1000usize, 0x1010, 0x2000] {
                // Platform returns `plat_align`-aligned bases (malloc: MAX_ALIGN).
                let plan = plan(100, requested).unwrap();
                let off = user_offset(base, requested);
                let user = base + off;
                assert!(user >= base + HEADER_SIZE, "requested={requested}");
                assert!(off + 100 <= plan.total, "requested={requested}");
                assert_eq!(user % effective_align(requested), 0);
                let header = header_of(user as *mut u8) as usize;
                assert!(header >= base);
                assert_eq!(header % PTR_ALIGN, 0);
            }
        }
    }

    #[cfg(feature = "debug")]
    #[test]
    fn debug_bump_avoids_double_alignment() {
        for requested in [1usize, 8, 64, 256] {
            let user = 0x10000 + user_offset(0x10000, requested);
            assert_ne!(user % (2 * requested), 0, "requested={requested}");
        }
        // Default alignment is not bumped.
        assert_eq!(user_offset(0x10000, 0), round_up(HEADER_SIZE, MAX_ALIGN));
    }

    #[test]
    fn overflow_is_rejected() {
        assert!(plan(usize::MAX, 8).is_none());
        assert!(plan(usize::MAX - 8, 0).is_none());
    }
}
