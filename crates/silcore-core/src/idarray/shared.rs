//! Segmented, thread-safe handle table.
//!
//! ```text
//! head -> [ s0 | s1 | ... | s(e-1) | next ] -> [ ... | next ] -> null
//! ```
//!
//! Each segment holds `expand_by` entry slots plus one link slot. Writers
//! serialise on a mutex created lazily by the first `register`; readers
//! walk the chain with acquire loads. Segments are published (link store,
//! then capacity bump) with release stores, so a reader that sees an id
//! in range also sees the segment that holds it.

use core::marker::PhantomData;
use core::ptr::{self, NonNull};
use std::sync::atomic::{AtomicPtr, AtomicUsize, Ordering};

use super::{IdTable, check_expand_by, note_lost_race, slot_of};
use crate::debug::{Site, precondition_violated};
use crate::error::SilError;
use crate::memory::{self, MemFlags, MemTag};
use crate::sync::{self, MutexGuard, MutexHandle, MutexKind};

type Slot = AtomicPtr<()>;

/// Thread-safe handle table built from linked segments.
pub struct SharedIdArray<T> {
    expand_by: usize,
    head: AtomicPtr<Slot>,
    // Written under the table mutex; read lock-free.
    capacity: AtomicUsize,
    num_used: AtomicUsize,
    first_free: AtomicUsize,
    tail: AtomicPtr<Slot>,
    // Raw `MutexHandle`, 0 until the first `register`.
    mutex: AtomicUsize,
    _entries: PhantomData<*mut T>,
}

// SAFETY: slot and link words are atomics; metadata writes happen under
// the table mutex. The table never dereferences the stored pointers.
unsafe impl<T> Send for SharedIdArray<T> {}
// SAFETY: see above.
unsafe impl<T> Sync for SharedIdArray<T> {}

/// Metadata snapshot taken under the table lock.
#[cfg(feature = "include-tests")]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableMetadata {
    pub capacity: usize,
    pub num_used: usize,
    pub first_free: usize,
    pub segments: usize,
    pub has_mutex: bool,
}

impl<T> SharedIdArray<T> {
    /// Empty table growing by `expand_by` (at least 2) slots per segment.
    pub fn new(expand_by: usize) -> Result<Self, SilError> {
        Ok(Self {
            expand_by: check_expand_by(expand_by)?,
            head: AtomicPtr::new(ptr::null_mut()),
            capacity: AtomicUsize::new(0),
            num_used: AtomicUsize::new(0),
            first_free: AtomicUsize::new(0),
            tail: AtomicPtr::new(ptr::null_mut()),
            mutex: AtomicUsize::new(0),
            _entries: PhantomData,
        })
    }

    #[must_use]
    pub fn expand_by(&self) -> usize {
        self.expand_by
    }

    fn existing_mutex(&self) -> Option<MutexHandle> {
        // SAFETY: the word only ever holds 0 or a live handle from
        // `into_raw`; it is cleared before the mutex is destroyed.
        unsafe { MutexHandle::from_raw(self.mutex.load(Ordering::Acquire)) }
    }

    /// The table mutex, created on first use. Two racing creators both
    /// build one; the loser destroys its own.
    fn mutex(&self) -> Option<MutexHandle> {
        if let Some(existing) = self.existing_mutex() {
            return Some(existing);
        }
        let fresh = sync::mutex_create(MutexKind::Plain)?;
        match self
            .mutex
            .compare_exchange(0, fresh.into_raw(), Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => Some(fresh),
            Err(winner) => {
                // SAFETY: `fresh` was never shared.
                unsafe { sync::mutex_destroy(fresh) };
                note_lost_race();
                // SAFETY: `winner` was published by the successful CAS.
                unsafe { MutexHandle::from_raw(winner) }
            }
        }
    }

    /// Lock the metadata when a mutex exists (no mutex means nothing was
    /// ever registered).
    fn lock_existing(&self) -> Option<MutexGuard> {
        self.existing_mutex().and_then(sync::mutex_guard)
    }

    /// Entry slot `index`, walking the chain. `index < capacity`.
    fn slot(&self, index: usize) -> &Slot {
        let (mut segment, offset) = (index / self.expand_by, index % self.expand_by);
        let mut seg = self.head.load(Ordering::Acquire);
        // SAFETY: `index < capacity` and capacity is published after the
        // links, so every segment on the way is linked and live.
        unsafe {
            while segment > 0 {
                seg = (*seg.add(self.expand_by)).load(Ordering::Acquire).cast::<Slot>();
                segment -= 1;
            }
            &*seg.add(offset)
        }
    }

    /// Append one zeroed segment. Caller holds the lock.
    #[track_caller]
    fn grow(&self) -> bool {
        let Some(bytes) = (self.expand_by + 1).checked_mul(core::mem::size_of::<Slot>()) else {
            return false;
        };
        let Some(block) = memory::alloc(
            bytes,
            core::mem::align_of::<Slot>(),
            MemFlags::CLEAR | MemFlags::TEMP | MemFlags::TOP,
        ) else {
            return false;
        };
        // SAFETY: fresh live block.
        unsafe { memory::debug_set_info(block, MemTag::Handle) };
        let seg = block.as_ptr().cast::<Slot>();
        let tail = self.tail.load(Ordering::Relaxed);
        if tail.is_null() {
            self.head.store(seg, Ordering::Release);
        } else {
            // SAFETY: `tail` is the live last segment.
            unsafe { (*tail.add(self.expand_by)).store(seg.cast(), Ordering::Release) };
        }
        self.tail.store(seg, Ordering::Relaxed);
        self.capacity.fetch_add(self.expand_by, Ordering::Release);
        true
    }

    fn segments(&self) -> usize {
        self.capacity.load(Ordering::Acquire) / self.expand_by
    }

    /// Run `f` on a metadata snapshot while holding the table lock.
    #[cfg(feature = "include-tests")]
    pub fn with_metadata_locked<R>(&self, f: impl FnOnce(&TableMetadata) -> R) -> R {
        let _guard = self.lock_existing();
        f(&TableMetadata {
            capacity: self.capacity.load(Ordering::Acquire),
            num_used: self.num_used.load(Ordering::Relaxed),
            first_free: self.first_free.load(Ordering::Relaxed),
            segments: self.segments(),
            has_mutex: self.existing_mutex().is_some(),
        })
    }

    /// Free every segment after the first `keep`. Exclusive access.
    fn free_segments_after(&mut self, keep: usize) {
        let mut seg = self.head.load(Ordering::Relaxed);
        let mut last_kept: *mut Slot = ptr::null_mut();
        for _ in 0..keep {
            last_kept = seg;
            // SAFETY: `keep` never exceeds the linked segment count.
            seg = unsafe { (*seg.add(self.expand_by)).load(Ordering::Relaxed).cast() };
        }
        if last_kept.is_null() {
            self.head.store(ptr::null_mut(), Ordering::Relaxed);
        } else {
            // SAFETY: live kept segment.
            unsafe { (*last_kept.add(self.expand_by)).store(ptr::null_mut(), Ordering::Relaxed) };
        }
        while !seg.is_null() {
            // SAFETY: `seg` is a live segment no longer reachable.
            let next = unsafe { (*seg.add(self.expand_by)).load(Ordering::Relaxed).cast::<Slot>() };
            // SAFETY: the segment block came from `memory::alloc`.
            unsafe { memory::free(NonNull::new(seg.cast::<u8>())) };
            seg = next;
        }
        self.tail.store(last_kept, Ordering::Relaxed);
        self.capacity.store(keep * self.expand_by, Ordering::Release);
    }
}

impl<T> IdTable<T> for SharedIdArray<T> {
    #[track_caller]
    fn register(&self, obj: NonNull<T>) -> usize {
        let Some(mutex) = self.mutex() else {
            return 0;
        };
        let Some(_guard) = sync::mutex_guard(mutex) else {
            return 0;
        };
        let capacity = self.capacity.load(Ordering::Relaxed);
        let mut index = self.first_free.load(Ordering::Relaxed);
        while index < capacity && !self.slot(index).load(Ordering::Relaxed).is_null() {
            index += 1;
        }
        if index == capacity && !self.grow() {
            SilError::OutOfMemory.report(&Site::caller());
            return 0;
        }
        self.slot(index).store(obj.as_ptr().cast(), Ordering::Release);
        self.num_used.fetch_add(1, Ordering::Relaxed);
        self.first_free.store(index + 1, Ordering::Relaxed);
        index + 1
    }

    fn find(&self, obj: NonNull<T>) -> usize {
        let _guard = self.lock_existing();
        let target = obj.as_ptr().cast::<()>();
        (0..self.capacity.load(Ordering::Acquire))
            .find(|&index| self.slot(index).load(Ordering::Acquire) == target)
            .map_or(0, |index| index + 1)
    }

    #[track_caller]
    fn set(&self, id: usize, obj: NonNull<T>) -> bool {
        let _guard = self.lock_existing();
        let Some(index) = slot_of(id, self.capacity.load(Ordering::Acquire)) else {
            precondition_violated(&Site::caller(), SilError::InvalidArgument("id out of range"));
            return false;
        };
        let previous = self.slot(index).swap(obj.as_ptr().cast(), Ordering::AcqRel);
        if previous.is_null() {
            self.num_used.fetch_add(1, Ordering::Relaxed);
        }
        true
    }

    fn get(&self, id: usize) -> Option<NonNull<T>> {
        let index = slot_of(id, self.capacity.load(Ordering::Acquire))?;
        NonNull::new(self.slot(index).load(Ordering::Acquire).cast::<T>())
    }

    #[track_caller]
    fn release(&self, id: usize) {
        let _guard = self.lock_existing();
        let Some(index) = slot_of(id, self.capacity.load(Ordering::Acquire)) else {
            precondition_violated(&Site::caller(), SilError::InvalidArgument("id out of range"));
            return;
        };
        let previous = self.slot(index).swap(ptr::null_mut(), Ordering::AcqRel);
        if previous.is_null() {
            return;
        }
        self.num_used.fetch_sub(1, Ordering::Relaxed);
        if index < self.first_free.load(Ordering::Relaxed) {
            self.first_free.store(index, Ordering::Relaxed);
        }
    }

    fn clean(&mut self) {
        let mut last_used = self.capacity.load(Ordering::Relaxed);
        while last_used > 0 && self.slot(last_used - 1).load(Ordering::Relaxed).is_null() {
            last_used -= 1;
        }
        let keep = last_used.div_ceil(self.expand_by);
        if keep < self.segments() {
            self.free_segments_after(keep);
        }
        let capacity = self.capacity.load(Ordering::Relaxed);
        if self.first_free.load(Ordering::Relaxed) > capacity {
            self.first_free.store(capacity, Ordering::Relaxed);
        }
        if self.num_used.load(Ordering::Relaxed) == 0 {
            let raw = self.mutex.swap(0, Ordering::AcqRel);
            // SAFETY: exclusive access; nobody else holds the handle.
            if let Some(mutex) = unsafe { MutexHandle::from_raw(raw) } {
                // SAFETY: unlocked (exclusive access) and now unreachable.
                unsafe { sync::mutex_destroy(mutex) };
            }
        }
    }

    fn capacity(&self) -> usize {
        self.capacity.load(Ordering::Acquire)
    }

    fn num_used(&self) -> usize {
        self.num_used.load(Ordering::Relaxed)
    }
}

impl<T> Drop for SharedIdArray<T> {
    fn drop(&mut self) {
        self.free_segments_after(0);
        let raw = self.mutex.swap(0, Ordering::AcqRel);
        // SAFETY: exclusive access during drop.
        if let Some(mutex) = unsafe { MutexHandle::from_raw(raw) } {
            // SAFETY: unlocked and unreachable.
            unsafe { sync::mutex_destroy(mutex) };
        }
    }
}

impl<T> core::fmt::Debug for SharedIdArray<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SharedIdArray")
            .field("capacity", &self.capacity.load(Ordering::Acquire))
            .field("num_used", &self.num_used.load(Ordering::Relaxed))
            .field("expand_by", &self.expand_by)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn objects(storage: &mut [u64]) -> Vec<NonNull<u64>> {
        storage.iter_mut().map(NonNull::from).collect()
    }

    #[test]
    fn ids_span_segments() {
        let mut storage = [0u64; 7];
        let objs = objects(&mut storage);
        let table = SharedIdArray::new(3).unwrap();
        for (i, obj) in objs.iter().enumerate() {
            assert_eq!(table.register(*obj), i + 1);
        }
        assert_eq!(table.capacity(), 9);
        for (i, obj) in objs.iter().enumerate() {
            assert_eq!(table.get(i + 1), Some(*obj));
            assert_eq!(table.find(*obj), i + 1);
        }
        assert_eq!(table.get(8), None);
        assert_eq!(table.get(10), None);
    }

    #[cfg(feature = "debug")]
    #[test]
    #[should_panic(expected = "id out of range")]
    fn out_of_range_release_panics_in_debug_builds() {
        let mut value = 1u64;
        let table = SharedIdArray::new(2).unwrap();
        table.register(NonNull::from(&mut value));
        table.release(3);
    }

    #[cfg(feature = "include-tests")]
    #[test]
    fn mutex_is_lazy() {
        let table = SharedIdArray::<u64>::new(4).unwrap();
        assert!(!table.with_metadata_locked(|m| m.has_mutex));
        assert_eq!(table.get(1), None);
        let mut value = 5u64;
        assert_eq!(table.register(NonNull::from(&mut value)), 1);
        assert!(table.with_metadata_locked(|m| m.has_mutex));
    }

    #[cfg(feature = "include-tests")]
    #[test]
    fn clean_frees_trailing_segments_and_mutex() {
        let mut storage = [0u64; 6];
        let objs = objects(&mut storage);
        let mut table = SharedIdArray::new(2).unwrap();
        for obj in &objs {
            table.register(*obj);
        }
        for id in 3..=6 {
            table.release(id);
        }
        table.clean();
        let meta = table.with_metadata_locked(|m| *m);
        assert_eq!(meta.segments, 1);
        assert_eq!(meta.capacity, 2);
        assert!(meta.has_mutex);
        table.release(1);
        table.release(2);
        table.clean();
        let meta = table.with_metadata_locked(|m| *m);
        assert_eq!((meta.segments, meta.capacity, meta.has_mutex), (0, 0, false));
        assert_eq!(table.register(objs[0]), 1);
    }

    #[cfg(feature = "include-tests")]
    #[test]
    fn release_lowers_first_free() {
        let mut storage = [0u64; 4];
        let objs = objects(&mut storage);
        let table = SharedIdArray::new(4).unwrap();
        for obj in &objs {
            table.register(*obj);
        }
        table.release(2);
        assert_eq!(table.with_metadata_locked(|m| m.first_free), 1);
        assert_eq!(table.register(objs[1]), 2);
        assert_eq!(table.num_used(), 4);
    }
}
