//! Counting semaphores.

use core::panic::Location;

use silcore_platform::{SysSemaphore, Timeout};

use super::{Handle, alloc_object, free_object};
use crate::debug::Site;
use crate::error::SilError;

/// A semaphore object; reach it through a [`SemaphoreHandle`].
pub struct SemaphoreObject {
    sem: SysSemaphore,
}

pub type SemaphoreHandle = Handle<SemaphoreObject>;

/// Create a semaphore holding `initial` tokens, capped at `max`.
///
/// `None` (logged) when `max` is zero or `initial > max`.
#[must_use]
#[track_caller]
pub fn semaphore_create(initial: u32, max: u32) -> Option<SemaphoreHandle> {
    let site = Location::caller();
    let Some(sem) = SysSemaphore::new(initial, max) else {
        SilError::InvalidArgument("semaphore needs 0 <= initial <= max and max > 0")
            .report(&Site::from_location(site));
        return None;
    };
    alloc_object(SemaphoreObject { sem }, site)
}

/// Destroy a semaphore and free its memory.
///
/// # Safety
///
/// No thread may be waiting, and `handle` must not be used again.
pub unsafe fn semaphore_destroy(handle: SemaphoreHandle) {
    // SAFETY: forwarded contract.
    unsafe { free_object(handle) };
}

/// Take one token, waiting up to `timeout`. `false` on timeout.
pub fn semaphore_wait(handle: SemaphoreHandle, timeout: Timeout) -> bool {
    handle.object().sem.wait(timeout)
}

/// Return one token and wake at most one waiter. `false` (logged) when the
/// semaphore is already at its maximum.
#[track_caller]
pub fn semaphore_signal(handle: SemaphoreHandle) -> bool {
    let signalled = handle.object().sem.signal();
    if !signalled {
        SilError::InvalidArgument("semaphore already at its maximum").report(&Site::caller());
    }
    signalled
}

/// Tokens currently available.
#[must_use]
pub fn semaphore_value(handle: SemaphoreHandle) -> u32 {
    handle.object().sem.value()
}
