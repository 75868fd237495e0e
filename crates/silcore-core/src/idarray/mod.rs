//! Handle tables ("ID arrays").
//!
//! A table maps small positive integers to object pointers. Id `i` lives
//! in slot `i - 1`; id 0 is never issued and means "no object". Tables
//! grow by `expand_by` slots at a time, never move existing entries, and
//! never invalidate an id that is still registered.
//!
//! Two representations share [`IdTable`]:
//! - [`CompactIdArray`]: one contiguous block, single-threaded (`!Sync`);
//!   its storage is released as soon as the last id is.
//! - [`SharedIdArray`]: a chain of fixed-size segments; any thread may
//!   register and release (under a lazily created mutex) while `get` stays
//!   lock-free.
//!
//! Tables store pointers only; they never own or drop the objects.

mod compact;
mod shared;

use core::ptr::NonNull;
use std::sync::atomic::{AtomicUsize, Ordering};

pub use compact::CompactIdArray;
pub use shared::SharedIdArray;
#[cfg(feature = "include-tests")]
pub use shared::TableMetadata;

use crate::error::SilError;

pub trait IdTable<T> {
    /// Store `obj` and return its id, or 0 (logged) when the table cannot
    /// grow.
    fn register(&self, obj: NonNull<T>) -> usize;

    /// Id under which `obj` is stored, 0 if absent. Linear in capacity.
    fn find(&self, obj: NonNull<T>) -> usize;

    /// Overwrite the slot for `id`. `false` (logged) when `id` is out of
    /// range.
    fn set(&self, id: usize, obj: NonNull<T>) -> bool;

    /// Object stored under `id`; `None` for a free or out-of-range id.
    fn get(&self, id: usize) -> Option<NonNull<T>>;

    /// Clear the slot for `id`. Out-of-range ids are logged and ignored.
    fn release(&self, id: usize);

    /// Drop trailing free slots and any storage they occupied.
    fn clean(&mut self);

    /// Slots currently backed by storage.
    fn capacity(&self) -> usize;

    /// Registered entries.
    fn num_used(&self) -> usize;
}

static LOST_MUTEX_RACES: AtomicUsize = AtomicUsize::new(0);

/// How many times two threads raced to create a shared table's mutex and
/// one had to throw its mutex away. Process-wide and monotonic.
#[must_use]
pub fn lost_mutex_races() -> usize {
    LOST_MUTEX_RACES.load(Ordering::Relaxed)
}

fn note_lost_race() {
    LOST_MUTEX_RACES.fetch_add(1, Ordering::Relaxed);
}

fn check_expand_by(expand_by: usize) -> Result<usize, SilError> {
    if expand_by < 2 {
        return Err(SilError::InvalidArgument("expand_by must be at least 2"));
    }
    Ok(expand_by)
}

/// Slot index for `id`, or `None` when `id` is 0 or beyond `capacity`.
#[inline]
fn slot_of(id: usize, capacity: usize) -> Option<usize> {
    let slot = id.wrapping_sub(1);
    (slot < capacity).then_some(slot)
}
