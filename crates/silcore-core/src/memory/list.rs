//! Live-allocation tracking list (debug builds).
//!
//! Every live block's header is linked between two static fenceposts. The
//! list is guarded by a platform mutex that is itself created lazily on
//! first use. Creating that mutex may allocate, which may re-enter the
//! allocator (when it is installed as the global allocator), so creation
//! is announced with a sentinel value and the creating thread proceeds
//! unlocked while every other thread waits for the real mutex.

use core::cell::{Cell, UnsafeCell};
use core::panic::Location;
use core::ptr;
use std::sync::atomic::{AtomicUsize, Ordering};

use silcore_platform::SysMutex;

use super::MemTag;
use super::header::BlockHeader;
use crate::error::SilError;

const MUTEX_NONE: usize = 0;
const MUTEX_CREATING: usize = usize::MAX;

static LIST_MUTEX: AtomicUsize = AtomicUsize::new(MUTEX_NONE);

thread_local! {
    static CREATING_HERE: Cell<bool> = const { Cell::new(false) };
    // Set while a relock is being logged, so a sink that allocates cannot
    // recurse into another report.
    static REPORTING_RELOCK: Cell<bool> = const { Cell::new(false) };
}

struct Fencepost(UnsafeCell<BlockHeader>);

// SAFETY: only touched while holding the list lock (or by the lone
// creating thread before the lock exists).
unsafe impl Sync for Fencepost {}

static HEAD: Fencepost = Fencepost(UnsafeCell::new(BlockHeader::FENCEPOST));
static TAIL: Fencepost = Fencepost(UnsafeCell::new(BlockHeader::FENCEPOST));

// Read lock-free by the statistics queries; written under the lock.
static BYTES: AtomicUsize = AtomicUsize::new(0);
static LIVE: AtomicUsize = AtomicUsize::new(0);

/// Held while the list is manipulated. Unlocks on drop.
pub(crate) struct ListGuard {
    mutex: Option<&'static SysMutex>,
}

impl Drop for ListGuard {
    fn drop(&mut self) {
        if let Some(mutex) = self.mutex {
            mutex.unlock();
        }
    }
}

pub(crate) fn lock() -> ListGuard {
    loop {
        match LIST_MUTEX.load(Ordering::SeqCst) {
            MUTEX_NONE => {
                if LIST_MUTEX
                    .compare_exchange(MUTEX_NONE, MUTEX_CREATING, Ordering::SeqCst, Ordering::SeqCst)
                    .is_err()
                {
                    continue;
                }
                CREATING_HERE.set(true);
                let created = SysMutex::new(false).map(|m| Box::into_raw(Box::new(m)) as usize);
                CREATING_HERE.set(false);
                match created {
                    Some(addr) => LIST_MUTEX.store(addr, Ordering::SeqCst),
                    None => {
                        LIST_MUTEX.store(MUTEX_NONE, Ordering::SeqCst);
                        SilError::Internal("allocation list mutex unavailable")
                            .report(&crate::site!());
                        return ListGuard { mutex: None };
                    }
                }
            }
            MUTEX_CREATING => {
                if CREATING_HERE.get() {
                    return ListGuard { mutex: None };
                }
                silcore_platform::yield_now();
            }
            addr => {
                // SAFETY: published once from `Box::into_raw` and never freed.
                let mutex = unsafe { &*(addr as *const SysMutex) };
                if !mutex.lock() {
                    // Relocked by its holder. The outer guard owns the unlock.
                    if !REPORTING_RELOCK.replace(true) {
                        SilError::Internal("allocation list relocked by its holder")
                            .report(&crate::site!());
                        REPORTING_RELOCK.set(false);
                    }
                    return ListGuard { mutex: None };
                }
                return ListGuard { mutex: Some(mutex) };
            }
        }
    }
}

fn head() -> *mut BlockHeader {
    HEAD.0.get()
}

fn tail() -> *mut BlockHeader {
    TAIL.0.get()
}

/// First real node, linking the fenceposts on first use.
///
/// # Safety
///
/// Caller holds the list lock.
unsafe fn first(_guard: &ListGuard) -> *mut BlockHeader {
    // SAFETY: fenceposts are static; exclusive under the lock.
    unsafe {
        if (*head()).next.is_null() {
            (*head()).next = tail();
            (*tail()).prev = head();
        }
        (*head()).next
    }
}

/// # Safety
///
/// `node` and `before` are valid headers; `before` is linked; lock held.
unsafe fn insert_before(before: *mut BlockHeader, node: *mut BlockHeader) {
    // SAFETY: per contract.
    unsafe {
        let prev = (*before).prev;
        (*node).prev = prev;
        (*node).next = before;
        (*prev).next = node;
        (*before).prev = node;
    }
}

/// # Safety
///
/// `node` is linked; lock held.
unsafe fn detach(node: *mut BlockHeader) {
    // SAFETY: per contract.
    unsafe {
        (*(*node).prev).next = (*node).next;
        (*(*node).next).prev = (*node).prev;
        (*node).next = ptr::null_mut();
        (*node).prev = ptr::null_mut();
    }
}

/// Link a freshly written header and account for its bytes.
///
/// # Safety
///
/// `node` is a valid, unlinked header.
pub(crate) unsafe fn track(node: *mut BlockHeader) {
    let guard = lock();
    // SAFETY: lock held; `node` valid per contract.
    unsafe {
        first(&guard);
        insert_before(tail(), node);
        BYTES.fetch_add((*node).size, Ordering::Relaxed);
    }
    LIVE.fetch_add(1, Ordering::Relaxed);
}

/// Unlink a header and remove its bytes from the total.
///
/// # Safety
///
/// `node` is a linked header.
pub(crate) unsafe fn untrack(node: *mut BlockHeader) {
    let _guard = lock();
    // SAFETY: lock held; `node` linked per contract.
    unsafe {
        detach(node);
        BYTES.fetch_sub((*node).size, Ordering::Relaxed);
    }
    LIVE.fetch_sub(1, Ordering::Relaxed);
}

/// Update a linked header's size in place.
///
/// # Safety
///
/// `node` is a linked header.
pub(crate) unsafe fn resize(node: *mut BlockHeader, new_size: usize) {
    let _guard = lock();
    // SAFETY: lock held.
    unsafe {
        BYTES.fetch_sub((*node).size, Ordering::Relaxed);
        (*node).size = new_size;
    }
    BYTES.fetch_add(new_size, Ordering::Relaxed);
}

/// Whether `user` is the user pointer of a live block. O(n).
#[cfg(feature = "memory-check-pointers")]
pub(crate) fn contains(user: *mut u8) -> bool {
    let guard = lock();
    // SAFETY: lock held; walk ends at the tail fencepost.
    unsafe {
        let mut node = first(&guard);
        while node != tail() {
            if (*node).user == user {
                return true;
            }
            node = (*node).next;
        }
    }
    false
}

/// # Safety
///
/// `node` is the header of a live block.
pub(crate) unsafe fn set_tag(node: *mut BlockHeader, tag: MemTag) {
    let _guard = lock();
    // SAFETY: per contract; lock held.
    unsafe { (*node).tag = tag };
}

pub(crate) fn bytes_allocated() -> usize {
    BYTES.load(Ordering::Relaxed)
}

pub(crate) fn live_allocations() -> usize {
    LIVE.load(Ordering::Relaxed)
}

// Rows copied out per lock hold by `report`.
const REPORT_BATCH: usize = 32;

#[derive(Clone, Copy)]
struct ReportRow {
    user: *const u8,
    size: usize,
    tag: MemTag,
    site: Option<&'static Location<'static>>,
}

impl ReportRow {
    const EMPTY: ReportRow = ReportRow {
        user: ptr::null(),
        size: 0,
        tag: MemTag::Unknown,
        site: None,
    };
}

/// Copy up to `rows.len()` blocks, starting at list position `skip`.
fn snapshot(skip: usize, rows: &mut [ReportRow]) -> usize {
    let guard = lock();
    let mut taken = 0;
    // SAFETY: lock held; walk ends at the tail fencepost.
    unsafe {
        let mut node = first(&guard);
        for _ in 0..skip {
            if node == tail() {
                return 0;
            }
            node = (*node).next;
        }
        while taken < rows.len() && node != tail() {
            rows[taken] = ReportRow {
                user: (*node).user.cast_const(),
                size: (*node).size,
                tag: (*node).tag,
                site: (*node).site,
            };
            taken += 1;
            node = (*node).next;
        }
    }
    taken
}

/// Log every live block; returns how many were reported.
///
/// Rows are copied out in batches and logged with the lock released, since
/// the log sink may allocate. Only blocks live when the report starts are
/// counted; blocks allocated while it runs may push later ones out.
pub(crate) fn report() -> usize {
    let limit = LIVE.load(Ordering::Relaxed);
    let mut rows = [ReportRow::EMPTY; REPORT_BATCH];
    let mut reported = 0usize;
    while reported < limit {
        let wanted = REPORT_BATCH.min(limit - reported);
        let taken = snapshot(reported, &mut rows[..wanted]);
        for row in &rows[..taken] {
            let (file, line) = row.site.map_or(("?", 0), |loc| (loc.file(), loc.line()));
            crate::dlog!(
                "  %p: %zu bytes, tag %s, allocated at %s:%u",
                row.user,
                row.size,
                row.tag.as_str(),
                crate::debug::strip_prefix(file),
                line
            );
        }
        reported += taken;
        if taken < wanted {
            break;
        }
    }
    crate::dlog!(
        "%zu live allocations, %zu bytes",
        reported,
        BYTES.load(Ordering::Relaxed)
    );
    reported
}

/// Insertion-sort the list into ascending user-address order.
///
/// # Safety
///
/// Lock held.
unsafe fn sort_by_address(guard: &ListGuard) {
    // SAFETY: lock held; every node between the fenceposts is valid.
    unsafe {
        let mut node = first(guard);
        while node != tail() {
            let next = (*node).next;
            let mut pos = (*node).prev;
            if pos != head() && (*pos).user > (*node).user {
                detach(node);
                while (*pos).prev != head() && (*(*pos).prev).user > (*node).user {
                    pos = (*pos).prev;
                }
                insert_before(pos, node);
            }
            node = next;
        }
    }
}

/// Fill `out` with the dominant tag of each equal chunk of
/// `[base, base + size)`; `None` marks a chunk with no live block.
pub(crate) fn map(base: usize, size: usize, out: &mut [Option<MemTag>]) {
    out.fill(None);
    let chunks = out.len();
    if chunks == 0 || size == 0 {
        return;
    }
    let bound = |i: usize| -> usize {
        let offset = (size as u128 * i as u128 / chunks as u128) as usize;
        base.saturating_add(offset)
    };
    let guard = lock();
    // SAFETY: lock held for the sort and the sweep.
    unsafe {
        sort_by_address(&guard);
        let mut cursor = first(&guard);
        for (i, slot) in out.iter_mut().enumerate() {
            let (lo, hi) = (bound(i), bound(i + 1));
            if lo == hi {
                continue;
            }
            // Live blocks never overlap, so sorted starts imply sorted ends.
            while cursor != tail() && (*cursor).user as usize + (*cursor).size <= lo {
                cursor = (*cursor).next;
            }
            let mut coverage = [0usize; MemTag::COUNT];
            let mut block = cursor;
            while block != tail() && ((*block).user as usize) < hi {
                let start = ((*block).user as usize).max(lo);
                let end = ((*block).user as usize + (*block).size).min(hi);
                if end > start {
                    coverage[(*block).tag as usize] += end - start;
                }
                block = (*block).next;
            }
            *slot = coverage
                .iter()
                .enumerate()
                .filter(|&(_, &bytes)| bytes > 0)
                .max_by_key(|&(_, &bytes)| bytes)
                .and_then(|(index, _)| MemTag::from_index(index));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relock_by_holder_keeps_the_outer_guard() {
        let outer = lock();
        crate::debug::capture::start();
        let inner = lock();
        assert!(inner.mutex.is_none());
        drop(inner);
        let lines = crate::debug::capture::take();
        if let Some(mutex) = outer.mutex {
            // Still held by this thread, so an errorcheck try-lock fails.
            assert!(!mutex.try_lock());
        }
        drop(outer);
        assert!(lines.iter().any(|l| l.contains("relocked by its holder")));
    }
}
