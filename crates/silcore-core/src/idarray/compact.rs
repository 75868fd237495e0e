use core::cell::Cell;
use core::marker::PhantomData;
use core::ptr::{self, NonNull};

use super::{IdTable, check_expand_by, slot_of};
use crate::debug::{Site, precondition_violated};
use crate::error::SilError;
use crate::memory::{self, MemFlags, MemTag};

const SLOT: usize = core::mem::size_of::<*mut ()>();

/// Single-threaded handle table backed by one contiguous block.
pub struct CompactIdArray<T> {
    slots: Cell<Option<NonNull<*mut T>>>,
    capacity: Cell<usize>,
    num_used: Cell<usize>,
    first_free: Cell<usize>,
    expand_by: usize,
    _owns: PhantomData<*mut T>,
}

impl<T> CompactIdArray<T> {
    /// Empty table growing by `expand_by` (at least 2) slots at a time.
    pub fn new(expand_by: usize) -> Result<Self, SilError> {
        Ok(Self {
            slots: Cell::new(None),
            capacity: Cell::new(0),
            num_used: Cell::new(0),
            first_free: Cell::new(0),
            expand_by: check_expand_by(expand_by)?,
            _owns: PhantomData,
        })
    }

    fn slot(&self, index: usize) -> *mut *mut T {
        match self.slots.get() {
            // SAFETY: callers pass `index < capacity`.
            Some(base) => unsafe { base.as_ptr().add(index) },
            None => ptr::null_mut(),
        }
    }

    fn read(&self, index: usize) -> *mut T {
        // SAFETY: `index < capacity`, so the slot is inside the block.
        unsafe { *self.slot(index) }
    }

    fn write(&self, index: usize, value: *mut T) {
        // SAFETY: as in `read`.
        unsafe { *self.slot(index) = value };
    }

    /// Resize the block to `capacity` slots; new slots are zeroed.
    #[track_caller]
    fn resize(&self, capacity: usize) -> bool {
        let old = self.slots.get().map(NonNull::cast::<u8>);
        if capacity == 0 {
            // SAFETY: the block belongs to this table.
            unsafe { memory::free(old) };
            self.slots.set(None);
            self.capacity.set(0);
            return true;
        }
        let Some(bytes) = capacity.checked_mul(SLOT) else {
            return false;
        };
        // SAFETY: the block belongs to this table; it is replaced on success.
        let Some(block) = (unsafe { memory::realloc(old, bytes, MemFlags::CLEAR) }) else {
            return false;
        };
        if old.is_none() {
            // SAFETY: fresh live block.
            unsafe { memory::debug_set_info(block, MemTag::Handle) };
        }
        self.slots.set(Some(block.cast()));
        self.capacity.set(capacity);
        true
    }
}

impl<T> IdTable<T> for CompactIdArray<T> {
    #[track_caller]
    fn register(&self, obj: NonNull<T>) -> usize {
        let capacity = self.capacity.get();
        let mut index = self.first_free.get();
        while index < capacity && !self.read(index).is_null() {
            index += 1;
        }
        if index == capacity && !self.resize(capacity + self.expand_by) {
            SilError::OutOfMemory.report(&Site::caller());
            return 0;
        }
        self.write(index, obj.as_ptr());
        self.num_used.set(self.num_used.get() + 1);
        self.first_free.set(index + 1);
        index + 1
    }

    fn find(&self, obj: NonNull<T>) -> usize {
        (0..self.capacity.get())
            .find(|&index| self.read(index) == obj.as_ptr())
            .map_or(0, |index| index + 1)
    }

    #[track_caller]
    fn set(&self, id: usize, obj: NonNull<T>) -> bool {
        let Some(index) = slot_of(id, self.capacity.get()) else {
            precondition_violated(&Site::caller(), SilError::InvalidArgument("id out of range"));
            return false;
        };
        if self.read(index).is_null() {
            self.num_used.set(self.num_used.get() + 1);
        }
        self.write(index, obj.as_ptr());
        true
    }

    fn get(&self, id: usize) -> Option<NonNull<T>> {
        let index = slot_of(id, self.capacity.get())?;
        NonNull::new(self.read(index))
    }

    #[track_caller]
    fn release(&self, id: usize) {
        let Some(index) = slot_of(id, self.capacity.get()) else {
            precondition_violated(&Site::caller(), SilError::InvalidArgument("id out of range"));
            return;
        };
        if self.read(index).is_null() {
            return;
        }
        self.write(index, ptr::null_mut());
        let used = self.num_used.get() - 1;
        self.num_used.set(used);
        self.first_free.set(self.first_free.get().min(index));
        if used == 0 {
            self.resize(0);
            self.first_free.set(0);
        }
    }

    fn clean(&mut self) {
        let mut keep = self.capacity.get();
        while keep > 0 && self.read(keep - 1).is_null() {
            keep -= 1;
        }
        if keep < self.capacity.get() {
            // Shrinking keeps the old block on failure; capacity then stays.
            self.resize(keep);
        }
        self.first_free.set(self.first_free.get().min(self.capacity.get()));
    }

    fn capacity(&self) -> usize {
        self.capacity.get()
    }

    fn num_used(&self) -> usize {
        self.num_used.get()
    }
}

impl<T> Drop for CompactIdArray<T> {
    fn drop(&mut self) {
        // SAFETY: the block belongs to this table.
        unsafe { memory::free(self.slots.get().map(NonNull::cast::<u8>)) };
    }
}

impl<T> core::fmt::Debug for CompactIdArray<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CompactIdArray")
            .field("capacity", &self.capacity.get())
            .field("num_used", &self.num_used.get())
            .field("first_free", &self.first_free.get())
            .field("expand_by", &self.expand_by)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn objects<const N: usize>(storage: &mut [u32; N]) -> Vec<NonNull<u32>> {
        storage.iter_mut().map(NonNull::from).collect()
    }

    #[test]
    fn ids_start_at_one() {
        let mut storage = [0u32; 3];
        let objs = objects(&mut storage);
        let table = CompactIdArray::new(2).unwrap();
        assert_eq!(table.register(objs[0]), 1);
        assert_eq!(table.register(objs[1]), 2);
        assert_eq!(table.register(objs[2]), 3);
        assert_eq!(table.capacity(), 4);
        assert_eq!(table.get(0), None);
        assert_eq!(table.get(2), Some(objs[1]));
        assert_eq!(table.get(5), None);
        assert_eq!(table.find(objs[2]), 3);
    }

    #[test]
    fn released_ids_are_reused_lowest_first() {
        let mut storage = [0u32; 4];
        let objs = objects(&mut storage);
        let table = CompactIdArray::new(4).unwrap();
        for obj in &objs {
            table.register(*obj);
        }
        table.release(3);
        table.release(2);
        assert_eq!(table.num_used(), 2);
        assert_eq!(table.register(objs[1]), 2);
        assert_eq!(table.register(objs[2]), 3);
    }

    #[test]
    fn storage_freed_at_zero() {
        let mut storage = [0u32; 2];
        let objs = objects(&mut storage);
        let table = CompactIdArray::new(8).unwrap();
        let a = table.register(objs[0]);
        let b = table.register(objs[1]);
        table.release(a);
        assert_eq!(table.capacity(), 8);
        table.release(b);
        assert_eq!(table.capacity(), 0);
        assert_eq!(table.get(b), None);
        assert_eq!(table.register(objs[0]), 1);
    }

    #[test]
    fn clean_truncates_trailing_slots() {
        let mut storage = [0u32; 5];
        let objs = objects(&mut storage);
        let mut table = CompactIdArray::new(2).unwrap();
        for obj in &objs {
            table.register(*obj);
        }
        assert_eq!(table.capacity(), 6);
        table.release(5);
        table.release(4);
        table.clean();
        assert_eq!(table.capacity(), 3);
        assert_eq!(table.get(3), Some(objs[2]));
    }

    #[test]
    fn set_checks_range() {
        let mut storage = [0u32; 2];
        let objs = objects(&mut storage);
        let table = CompactIdArray::new(2).unwrap();
        let id = table.register(objs[0]);
        assert!(table.set(id, objs[1]));
        assert_eq!(table.get(id), Some(objs[1]));
        assert_eq!(table.get(3), None);
    }

    #[cfg(feature = "debug")]
    #[test]
    #[should_panic(expected = "precondition failed: invalid argument: id out of range")]
    fn out_of_range_set_panics_in_debug_builds() {
        let mut storage = [0u32; 1];
        let objs = objects(&mut storage);
        let table = CompactIdArray::new(2).unwrap();
        table.register(objs[0]);
        table.set(3, objs[0]);
    }

    #[cfg(feature = "debug")]
    #[test]
    #[should_panic(expected = "id out of range")]
    fn release_of_id_zero_panics_in_debug_builds() {
        let table = CompactIdArray::<u32>::new(2).unwrap();
        table.release(0);
    }

    #[cfg(not(feature = "debug"))]
    #[test]
    fn out_of_range_ids_are_logged_and_ignored() {
        let mut storage = [0u32; 1];
        let objs = objects(&mut storage);
        let table = CompactIdArray::new(2).unwrap();
        let id = table.register(objs[0]);
        crate::debug::capture::start();
        assert!(!table.set(3, objs[0]));
        table.release(0);
        let lines = crate::debug::capture::take();
        assert_eq!(lines.len(), 2);
        assert!(lines.iter().all(|l| l.contains("id out of range")));
        assert_eq!(table.get(id), Some(objs[0]));
        assert_eq!(table.num_used(), 1);
    }

    #[test]
    fn expand_by_must_be_at_least_two() {
        assert!(matches!(
            CompactIdArray::<u32>::new(1),
            Err(SilError::InvalidArgument(_))
        ));
    }
}
