//! Synchronisation objects: mutexes, semaphores and condition variables.
//!
//! Objects live in tracked blocks tagged [`MemTag::Sync`] and are referred
//! to by copyable [`Handle`]s. A handle stays valid until the matching
//! `*_destroy` call, which is why destruction is `unsafe`: the caller
//! promises no other copy of the handle is used afterwards.
//!
//! How an object is built depends on the [`PlatformVariant`]; objects
//! created with `*_create` use [`DEFAULT_VARIANT`], the `*_create_on`
//! forms pick one explicitly.
//!
//! [`PlatformVariant`]: silcore_platform::PlatformVariant
//! [`DEFAULT_VARIANT`]: silcore_platform::DEFAULT_VARIANT

mod condvar;
mod mutex;
mod semaphore;

use core::fmt;
use core::hash::{Hash, Hasher};
use core::marker::PhantomData;
use core::num::NonZeroUsize;
use core::panic::Location;
use core::ptr::NonNull;

use crate::memory::{self, MemFlags, MemTag};

pub use condvar::{
    CondVarHandle, CondVarObject, condvar_create, condvar_create_on, condvar_destroy,
    condvar_signal, condvar_wait,
};
#[cfg(feature = "include-tests")]
pub use condvar::condvar_pending_wakeups;
pub use mutex::{
    MutexGuard, MutexHandle, MutexKind, MutexObject, mutex_create, mutex_create_on,
    mutex_destroy, mutex_guard, mutex_kind, mutex_lock, mutex_lock_for, mutex_unlock,
};
pub use semaphore::{
    SemaphoreHandle, SemaphoreObject, semaphore_create, semaphore_destroy, semaphore_signal,
    semaphore_value, semaphore_wait,
};

/// Opaque single-word reference to a sync object of type `T`.
pub struct Handle<T> {
    raw: NonZeroUsize,
    _kind: PhantomData<fn() -> T>,
}

impl<T> Handle<T> {
    /// Word form, for storing in an atomic or crossing an FFI boundary.
    #[must_use]
    pub fn into_raw(self) -> usize {
        self.raw.get()
    }

    /// Rebuild a handle from [`into_raw`](Self::into_raw). Zero yields `None`.
    ///
    /// # Safety
    ///
    /// `raw` must come from `into_raw` on a handle of the same type whose
    /// object has not been destroyed.
    #[must_use]
    pub unsafe fn from_raw(raw: usize) -> Option<Self> {
        NonZeroUsize::new(raw).map(|raw| Self {
            raw,
            _kind: PhantomData,
        })
    }

    fn object(&self) -> &T {
        // SAFETY: handles are minted by `alloc_object` and only invalidated
        // by the unsafe `*_destroy` functions.
        unsafe { &*(self.raw.get() as *const T) }
    }
}

impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Handle<T> {}

impl<T> PartialEq for Handle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl<T> Eq for Handle<T> {}

impl<T> Hash for Handle<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.raw.hash(state);
    }
}

impl<T> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handle({:#x})", self.raw)
    }
}

/// Move `value` into a fresh tracked block.
fn alloc_object<T>(value: T, site: &'static Location<'static>) -> Option<Handle<T>> {
    let size = core::mem::size_of::<T>().max(1);
    let block = memory::alloc_at(size, core::mem::align_of::<T>(), MemFlags::empty(), site)?;
    let object = block.cast::<T>();
    // SAFETY: the block is sized and aligned for `T`.
    unsafe {
        object.as_ptr().write(value);
        memory::debug_set_info(block, MemTag::Sync);
    }
    NonZeroUsize::new(object.as_ptr() as usize).map(|raw| Handle {
        raw,
        _kind: PhantomData,
    })
}

/// Drop the object and return its block.
///
/// # Safety
///
/// `handle` is live and unused afterwards.
unsafe fn free_object<T>(handle: Handle<T>) {
    let object = handle.raw.get() as *mut T;
    // SAFETY: per contract the object is live and exclusively ours now.
    unsafe {
        core::ptr::drop_in_place(object);
        memory::free(NonNull::new(object.cast::<u8>()));
    }
}
