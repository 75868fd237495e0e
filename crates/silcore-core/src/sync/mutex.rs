//! Plain and recursive mutexes.
//!
//! Native variants wrap a host mutex. The semaphore-only variant builds a
//! plain mutex from a binary semaphore and a recursive one from a binary
//! semaphore plus owner and lock-count fields.

use core::panic::Location;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use silcore_platform::{
    DEFAULT_VARIANT, PlatformVariant, SysMutex, SysSemaphore, TimedLockPolicy, Timeout,
    current_id,
};

use super::{Handle, alloc_object, free_object};
use crate::debug::Site;
use crate::error::SilError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutexKind {
    Plain,
    /// The owner may lock again; each lock needs a matching unlock.
    Recursive,
}

/// Recursive mutex emulated over a binary semaphore.
struct SemRecursive {
    sem: SysSemaphore,
    // Thread id of the holder, 0 when free.
    owner: AtomicU64,
    // Touched only by the owner.
    count: AtomicU32,
}

impl SemRecursive {
    fn lock(&self, timeout: Timeout) -> bool {
        let me = current_id();
        if self.owner.load(Ordering::Acquire) == me {
            self.count.fetch_add(1, Ordering::Relaxed);
            return true;
        }
        if !self.sem.wait(timeout) {
            return false;
        }
        self.owner.store(me, Ordering::Release);
        self.count.store(1, Ordering::Relaxed);
        true
    }

    fn unlock(&self) -> bool {
        if self.owner.load(Ordering::Acquire) != current_id() {
            return false;
        }
        if self.count.fetch_sub(1, Ordering::Relaxed) == 1 {
            self.owner.store(0, Ordering::Release);
            self.sem.signal();
        }
        true
    }
}

enum Repr {
    Native {
        mutex: SysMutex,
        policy: TimedLockPolicy,
    },
    Binary(SysSemaphore),
    SemRecursive(SemRecursive),
}

/// A mutex object; reach it through a [`MutexHandle`].
pub struct MutexObject {
    repr: Repr,
    kind: MutexKind,
}

pub type MutexHandle = Handle<MutexObject>;

impl MutexObject {
    pub(super) fn native(&self) -> Option<&SysMutex> {
        match &self.repr {
            Repr::Native { mutex, .. } => Some(mutex),
            Repr::Binary(_) | Repr::SemRecursive(_) => None,
        }
    }
}

/// Create a mutex on the compiled-in platform variant.
#[must_use]
#[track_caller]
pub fn mutex_create(kind: MutexKind) -> Option<MutexHandle> {
    create(DEFAULT_VARIANT, kind, Location::caller())
}

/// Create a mutex on an explicit platform variant.
#[must_use]
#[track_caller]
pub fn mutex_create_on(variant: PlatformVariant, kind: MutexKind) -> Option<MutexHandle> {
    create(variant, kind, Location::caller())
}

fn create(
    variant: PlatformVariant,
    kind: MutexKind,
    site: &'static Location<'static>,
) -> Option<MutexHandle> {
    let repr = if variant.has_native_sync() {
        SysMutex::new(kind == MutexKind::Recursive).map(|mutex| Repr::Native {
            mutex,
            policy: variant.timed_lock_policy(),
        })
    } else {
        SysSemaphore::new(1, 1).map(|sem| match kind {
            MutexKind::Plain => Repr::Binary(sem),
            MutexKind::Recursive => Repr::SemRecursive(SemRecursive {
                sem,
                owner: AtomicU64::new(0),
                count: AtomicU32::new(0),
            }),
        })
    };
    let Some(repr) = repr else {
        SilError::NotSupported("host refused to create a mutex").report(&Site::from_location(site));
        return None;
    };
    alloc_object(MutexObject { repr, kind }, site)
}

/// Destroy a mutex and free its memory.
///
/// # Safety
///
/// The mutex must be unlocked, without waiters, and `handle` (and every
/// copy of it) must not be used again.
pub unsafe fn mutex_destroy(handle: MutexHandle) {
    // SAFETY: forwarded contract.
    unsafe { free_object(handle) };
}

#[must_use]
pub fn mutex_kind(handle: MutexHandle) -> MutexKind {
    handle.object().kind
}

/// Acquire within `timeout`. `false` on timeout.
pub fn mutex_lock(handle: MutexHandle, timeout: Timeout) -> bool {
    match &handle.object().repr {
        Repr::Native { mutex, policy } => mutex.lock_timeout(timeout, *policy),
        Repr::Binary(sem) => sem.wait(timeout),
        Repr::SemRecursive(rec) => rec.lock(timeout),
    }
}

/// Acquire within `timeout`, reporting a timeout as an error.
pub fn mutex_lock_for(handle: MutexHandle, timeout: Timeout) -> Result<(), SilError> {
    if mutex_lock(handle, timeout) {
        Ok(())
    } else {
        Err(SilError::TimedOut)
    }
}

/// Release a held mutex. Unlocking a mutex the caller does not hold is
/// logged and returns `false`.
#[track_caller]
pub fn mutex_unlock(handle: MutexHandle) -> bool {
    let released = match &handle.object().repr {
        Repr::Native { mutex, .. } => mutex.unlock(),
        Repr::Binary(sem) => sem.signal(),
        Repr::SemRecursive(rec) => rec.unlock(),
    };
    if !released {
        crate::debug::precondition_violated(
            &Site::caller(),
            SilError::InvalidArgument("unlock of a mutex the caller does not hold"),
        );
    }
    released
}

/// Lock `handle` until the guard drops.
///
/// `None` (logged) when the lock cannot be taken, e.g. a plain native
/// mutex relocked by its holder; nothing is unlocked in that case.
#[must_use]
#[track_caller]
pub fn mutex_guard(handle: MutexHandle) -> Option<MutexGuard> {
    if mutex_lock(handle, Timeout::Forever) {
        Some(MutexGuard { handle })
    } else {
        SilError::Internal("mutex could not be locked").report(&Site::caller());
        None
    }
}

/// Holds a mutex locked; unlocks on drop, including during unwinding.
#[derive(Debug)]
#[must_use = "the mutex unlocks as soon as the guard is dropped"]
pub struct MutexGuard {
    handle: MutexHandle,
}

impl MutexGuard {
    #[must_use]
    pub fn handle(&self) -> MutexHandle {
        self.handle
    }
}

impl Drop for MutexGuard {
    fn drop(&mut self) {
        mutex_unlock(self.handle);
    }
}
