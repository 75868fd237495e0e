//! Growable UTF-8 string stored in a tracked block.
//!
//! The buffer always keeps a NUL after the last byte so [`MemString::as_c_ptr`]
//! can be handed to C-style consumers.

use core::fmt;
use core::ptr::NonNull;

use super::{MemFlags, MemTag};

pub struct MemString {
    ptr: Option<NonNull<u8>>,
    len: usize,
    // Usable bytes, excluding the terminator slot.
    cap: usize,
}

// SAFETY: the block is uniquely owned.
unsafe impl Send for MemString {}
// SAFETY: shared access is read-only.
unsafe impl Sync for MemString {}

impl MemString {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            ptr: None,
            len: 0,
            cap: 0,
        }
    }

    /// Copy `s` into a fresh block.
    #[must_use]
    pub fn from_text(s: &str) -> Option<Self> {
        let mut out = Self::new();
        out.push_str(s).then_some(out)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        match self.ptr {
            // SAFETY: `len` bytes of UTF-8 live at `ptr`.
            Some(p) => unsafe {
                core::str::from_utf8_unchecked(core::slice::from_raw_parts(p.as_ptr(), self.len))
            },
            None => "",
        }
    }

    /// NUL-terminated bytes; null while nothing was ever stored.
    #[must_use]
    pub fn as_c_ptr(&self) -> *const u8 {
        self.ptr.map_or(core::ptr::null(), |p| p.as_ptr().cast_const())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.cap
    }

    /// Truncate to empty, keeping the block.
    pub fn clear(&mut self) {
        self.len = 0;
        if let Some(p) = self.ptr {
            // SAFETY: the terminator slot always exists.
            unsafe { *p.as_ptr() = 0 };
        }
    }

    /// Ensure room for `additional` more bytes, allocating the block if
    /// there is none yet. `false` if the block could not grow; the string
    /// is unchanged then.
    pub fn reserve(&mut self, additional: usize) -> bool {
        let Some(needed) = self.len.checked_add(additional) else {
            return false;
        };
        if needed <= self.cap && self.ptr.is_some() {
            return true;
        }
        let target = needed.max(self.cap.saturating_mul(2)).max(15);
        let Some(bytes) = target.checked_add(1) else {
            return false;
        };
        // SAFETY: `ptr` is this string's live block or `None`.
        let Some(grown) = (unsafe { super::realloc(self.ptr, bytes, MemFlags::empty()) }) else {
            return false;
        };
        if self.ptr.is_none() {
            // SAFETY: fresh live block.
            unsafe {
                super::debug_set_info(grown, MemTag::Buffer);
                *grown.as_ptr() = 0;
            }
        }
        self.ptr = Some(grown);
        self.cap = target;
        true
    }

    /// Append `s`; `false` (and no change) when growth fails.
    pub fn push_str(&mut self, s: &str) -> bool {
        let Some(spare) = self.spare_for(s.len()) else {
            return false;
        };
        spare[..s.len()].copy_from_slice(s.as_bytes());
        // SAFETY: complete UTF-8 copied into the spare capacity.
        unsafe { self.commit(s.len()) };
        true
    }

    /// Spare capacity of exactly `extra + 1` bytes (room for a terminator).
    pub(crate) fn spare_for(&mut self, extra: usize) -> Option<&mut [u8]> {
        if !self.reserve(extra) {
            return None;
        }
        let p = self.ptr?;
        // SAFETY: `reserve` guaranteed `len + extra + 1` bytes in the block.
        Some(unsafe { core::slice::from_raw_parts_mut(p.as_ptr().add(self.len), extra + 1) })
    }

    /// Extend the length over bytes written into [`spare_for`](Self::spare_for).
    ///
    /// # Safety
    ///
    /// The first `written` spare bytes hold complete UTF-8 and fit the
    /// capacity.
    pub(crate) unsafe fn commit(&mut self, written: usize) {
        debug_assert!(self.len + written <= self.cap);
        self.len += written;
        if let Some(p) = self.ptr {
            // SAFETY: the terminator slot follows the capacity.
            unsafe { *p.as_ptr().add(self.len) = 0 };
        }
    }
}

impl Default for MemString {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for MemString {
    fn drop(&mut self) {
        // SAFETY: the block is owned by this string.
        unsafe { super::free(self.ptr.take()) };
    }
}

impl core::ops::Deref for MemString {
    type Target = str;

    fn deref(&self) -> &str {
        self.as_str()
    }
}

impl PartialEq<str> for MemString {
    fn eq(&self, other: &str) -> bool {
        self.as_str() == other
    }
}

impl PartialEq<&str> for MemString {
    fn eq(&self, other: &&str) -> bool {
        self.as_str() == *other
    }
}

impl fmt::Display for MemString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Debug for MemString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self.as_str(), f)
    }
}
