//! Host threads.
//!
//! Threads are `std::thread` workers; each gets a small nonzero id on first
//! use so owner tracking can compare ids with a single word.

use std::cell::Cell;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::JoinHandle;

static NEXT_THREAD_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static SELF_ID: Cell<u64> = const { Cell::new(0) };
}

fn fresh_thread_id() -> u64 {
    NEXT_THREAD_ID.fetch_add(1, Ordering::Relaxed)
}

/// Id of the calling thread. Never zero, never reused within a process.
#[must_use]
pub fn current_id() -> u64 {
    SELF_ID.with(|slot| {
        let existing = slot.get();
        if existing != 0 {
            return existing;
        }
        let id = fresh_thread_id();
        slot.set(id);
        id
    })
}

/// Give up the rest of the current time slice.
pub fn yield_now() {
    std::thread::yield_now();
}

/// A joinable host thread.
#[derive(Debug)]
pub struct SysThread<R> {
    id: u64,
    handle: JoinHandle<R>,
}

impl<R: Send + 'static> SysThread<R> {
    /// Start `f` on a new thread. Returns `None` if the host cannot spawn.
    pub fn spawn<F>(name: &str, f: F) -> Option<Self>
    where
        F: FnOnce() -> R + Send + 'static,
    {
        let id = fresh_thread_id();
        let handle = std::thread::Builder::new()
            .name(name.to_owned())
            .spawn(move || {
                SELF_ID.with(|slot| slot.set(id));
                f()
            })
            .ok()?;
        Some(Self { id, handle })
    }

    /// The id the thread reports from [`current_id`].
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// True once the thread function has returned.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the thread; `None` if it panicked.
    pub fn join(self) -> Option<R> {
        self.handle.join().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_stable_and_distinct() {
        let me = current_id();
        assert_ne!(me, 0);
        assert_eq!(me, current_id());
        let t = SysThread::spawn("id-check", current_id).unwrap();
        let spawned_id = t.id();
        let reported = t.join().unwrap();
        assert_eq!(reported, spawned_id);
        assert_ne!(reported, me);
    }

    #[test]
    fn join_returns_value_and_reports_panic() {
        let ok = SysThread::spawn("ok", || 41 + 1).unwrap();
        assert_eq!(ok.join(), Some(42));
        let bad = SysThread::spawn("bad", || -> u32 { panic!("boom") }).unwrap();
        assert_eq!(bad.join(), None);
    }
}
