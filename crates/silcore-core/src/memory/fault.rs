//! Allocation fault injection for tests.
//!
//! The knobs are process-wide atomics so they can be consulted from inside
//! the allocator without taking its lock.

use core::ptr::NonNull;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicPtr, AtomicU32, Ordering};

// Negative: disarmed. Zero: the next counted call fails.
static REMAINING: AtomicI64 = AtomicI64::new(-1);
static EVERY: AtomicU32 = AtomicU32::new(0);
static ON_SHRINK: AtomicBool = AtomicBool::new(false);
static USE_NEXT: AtomicPtr<u8> = AtomicPtr::new(core::ptr::null_mut());

/// Fail the allocation after `calls` more successful ones.
///
/// After a failure, `every == 0` disarms; otherwise another failure is
/// injected every `every` calls. Shrinking reallocs are counted only when
/// `fail_on_shrink` is set. A negative `calls` disarms.
pub fn test_mem_fail_after(calls: i64, every: u32, fail_on_shrink: bool) {
    EVERY.store(every, Ordering::SeqCst);
    ON_SHRINK.store(fail_on_shrink, Ordering::SeqCst);
    REMAINING.store(if calls < 0 { -1 } else { calls }, Ordering::SeqCst);
}

/// Make the platform allocator itself fail (or recover).
pub fn test_mem_fail_platform(fail: bool) {
    silcore_platform::mem::set_force_failure(fail);
}

/// Satisfy the next allocation from `block`, a live block the caller is
/// abandoning. `None` clears a pending override.
///
/// The override applies only if the next request fits the block's size
/// and alignment; otherwise it is discarded and the request proceeds
/// normally.
///
/// # Safety
///
/// `block` must be a live allocation from this allocator that the caller
/// no longer uses or frees.
pub unsafe fn test_mem_use(block: Option<NonNull<u8>>) {
    let raw = block.map_or(core::ptr::null_mut(), NonNull::as_ptr);
    USE_NEXT.store(raw, Ordering::SeqCst);
}

/// Consult the countdown. True when this call must fail.
pub(crate) fn should_fail(shrinking: bool) -> bool {
    if shrinking && !ON_SHRINK.load(Ordering::SeqCst) {
        return false;
    }
    let mut fire = false;
    let _ = REMAINING.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |remaining| {
        fire = remaining == 0;
        match remaining {
            r if r < 0 => None,
            0 => match EVERY.load(Ordering::SeqCst) {
                0 => Some(-1),
                every => Some(i64::from(every) - 1),
            },
            r => Some(r - 1),
        }
    });
    fire
}

pub(crate) fn take_use_next() -> Option<NonNull<u8>> {
    if USE_NEXT.load(Ordering::Relaxed).is_null() {
        return None;
    }
    NonNull::new(USE_NEXT.swap(core::ptr::null_mut(), Ordering::SeqCst))
}
