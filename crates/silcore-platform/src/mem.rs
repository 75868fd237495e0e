//! Low-level host allocator.
//!
//! Thin wrappers over `malloc`/`realloc`/`free` (and `posix_memalign` for
//! over-aligned requests). The tracked allocator in `silcore-core` is the
//! only intended caller.

use std::ffi::c_void;
#[cfg(any(test, feature = "include-tests"))]
use std::sync::atomic::{AtomicBool, Ordering};

/// Strongest alignment the host allocator guarantees for every block.
#[cfg(any(target_arch = "x86_64", target_arch = "aarch64"))]
pub const MAX_ALIGN: usize = 16;
/// Strongest alignment the host allocator guarantees for every block.
#[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
pub const MAX_ALIGN: usize = core::mem::size_of::<usize>();

#[cfg(any(test, feature = "include-tests"))]
static FORCE_FAILURE: AtomicBool = AtomicBool::new(false);

/// Test hook: make every subsequent host allocation fail until cleared.
#[cfg(any(test, feature = "include-tests"))]
pub fn set_force_failure(fail: bool) {
    FORCE_FAILURE.store(fail, Ordering::SeqCst);
}

#[inline]
fn forced_failure() -> bool {
    #[cfg(any(test, feature = "include-tests"))]
    {
        FORCE_FAILURE.load(Ordering::SeqCst)
    }
    #[cfg(not(any(test, feature = "include-tests")))]
    {
        false
    }
}

/// Allocate `size` bytes aligned to `align` (a power of two).
///
/// Returns null on failure, on `size == 0`, or on an invalid alignment.
#[must_use]
pub fn sys_alloc(size: usize, align: usize) -> *mut u8 {
    if size == 0 || !align.is_power_of_two() || forced_failure() {
        return std::ptr::null_mut();
    }
    if align <= MAX_ALIGN {
        // SAFETY: plain malloc call; result is checked by the caller.
        return unsafe { libc::malloc(size) }.cast::<u8>();
    }
    let align = align.max(core::mem::size_of::<*mut c_void>());
    let mut out: *mut c_void = std::ptr::null_mut();
    // SAFETY: `out` is a valid out-pointer; `align` is a power of two and a
    // multiple of the pointer size.
    let rc = unsafe { libc::posix_memalign(&mut out, align, size) };
    if rc != 0 {
        return std::ptr::null_mut();
    }
    out.cast::<u8>()
}

/// Resize a block obtained from [`sys_alloc`] with `align <= MAX_ALIGN`.
///
/// On failure the original block is untouched and null is returned.
///
/// # Safety
///
/// `ptr` must be null or a live block from [`sys_alloc`]/[`sys_realloc`].
#[must_use]
pub unsafe fn sys_realloc(ptr: *mut u8, size: usize, align: usize) -> *mut u8 {
    if size == 0 || align > MAX_ALIGN || forced_failure() {
        return std::ptr::null_mut();
    }
    // SAFETY: caller guarantees `ptr` provenance; realloc preserves the
    // malloc alignment, which covers every `align <= MAX_ALIGN`.
    unsafe { libc::realloc(ptr.cast::<c_void>(), size) }.cast::<u8>()
}

/// Release a block obtained from this module. Null is ignored.
///
/// # Safety
///
/// `ptr` must be null or a live block from [`sys_alloc`]/[`sys_realloc`].
pub unsafe fn sys_free(ptr: *mut u8) {
    if ptr.is_null() {
        return;
    }
    // SAFETY: caller guarantees `ptr` came from malloc/posix_memalign/realloc.
    unsafe { libc::free(ptr.cast::<c_void>()) }
}

/// True when the host allocator honours pool placement hints (TOP/TEMP).
///
/// Hosted platforms hand out blocks from a virtual address space and ignore
/// placement, so a flag change never forces a move.
#[must_use]
pub const fn honours_placement() -> bool {
    false
}

/// Advisory count of free bytes, `None` when the host cannot answer.
#[must_use]
pub fn sys_avail() -> Option<u64> {
    #[cfg(target_os = "linux")]
    {
        // SAFETY: zeroed sysinfo is a valid out-parameter.
        let mut info: libc::sysinfo = unsafe { std::mem::zeroed() };
        // SAFETY: `info` is a valid out-pointer.
        if unsafe { libc::sysinfo(&mut info) } != 0 {
            return None;
        }
        Some((info.freeram as u64).saturating_mul(u64::from(info.mem_unit.max(1))))
    }
    #[cfg(not(target_os = "linux"))]
    {
        None
    }
}

/// Advisory size of the largest contiguous free region, `None` if unknown.
///
/// A virtual-memory host can map any single request up to the free total,
/// so this reports the same figure as [`sys_avail`].
#[must_use]
pub fn sys_contig() -> Option<u64> {
    sys_avail()
}

#[cfg(test)]
mod tests {
    use super::*;

    // Host allocation tests share the process-wide failure knob.
    static SERIAL: parking_lot::Mutex<()> = parking_lot::Mutex::new(());

    #[test]
    fn zero_size_and_bad_alignment_fail() {
        assert!(sys_alloc(0, 8).is_null());
        assert!(sys_alloc(16, 3).is_null());
    }

    #[test]
    fn alignment_is_honoured() {
        let _serial = SERIAL.lock();
        for align in [1usize, 2, 8, MAX_ALIGN, 64, 4096] {
            let p = sys_alloc(100, align);
            assert!(!p.is_null());
            assert_eq!(p as usize % align, 0, "align={align}");
            // SAFETY: block from sys_alloc.
            unsafe { sys_free(p) };
        }
    }

    #[test]
    fn realloc_preserves_prefix() {
        let _serial = SERIAL.lock();
        let p = sys_alloc(16, 8);
        assert!(!p.is_null());
        // SAFETY: p is valid for 16 bytes.
        unsafe {
            for i in 0..16 {
                *p.add(i) = i as u8;
            }
            let q = sys_realloc(p, 4096, 8);
            assert!(!q.is_null());
            for i in 0..16 {
                assert_eq!(*q.add(i), i as u8);
            }
            sys_free(q);
        }
    }

    #[test]
    fn forced_failure_blocks_allocation() {
        let _serial = SERIAL.lock();
        set_force_failure(true);
        let p = sys_alloc(32, 8);
        set_force_failure(false);
        assert!(p.is_null());
    }

    #[test]
    fn free_null_is_noop() {
        // SAFETY: null is explicitly allowed.
        unsafe { sys_free(std::ptr::null_mut()) };
    }
}
