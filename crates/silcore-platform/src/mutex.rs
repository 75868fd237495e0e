//! Native (pthread) mutex.
//!
//! Plain mutexes are created with `PTHREAD_MUTEX_ERRORCHECK` so that an
//! unlock by a non-owner reports `EPERM` instead of corrupting the lock.
//! Recursive mutexes use the host's `PTHREAD_MUTEX_RECURSIVE`.
//!
//! Timed locking is always emulated: not every host exports
//! `pthread_mutex_timedlock`, and the emulation gives identical behaviour
//! everywhere.

use std::cell::UnsafeCell;
use std::time::Duration;

use crate::time::{self, Timeout};

/// How a timed lock measures its remaining budget between polls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimedLockPolicy {
    /// Monotonic clock; sleep `min(remaining, 1 ms)` between polls.
    Clock,
    /// Millisecond tick counter; sleep exactly 1 ms between polls.
    Ticks,
}

/// Host mutex. The pthread object is boxed so its address never changes.
pub struct SysMutex {
    inner: Box<UnsafeCell<libc::pthread_mutex_t>>,
    recursive: bool,
}

// SAFETY: pthread mutexes are designed to be shared between threads; all
// access goes through the pthread API.
unsafe impl Send for SysMutex {}
// SAFETY: see above.
unsafe impl Sync for SysMutex {}

impl SysMutex {
    /// Create a new unlocked mutex. Returns `None` if the host refuses.
    #[must_use]
    pub fn new(recursive: bool) -> Option<Self> {
        let inner = Box::new(UnsafeCell::new(libc::PTHREAD_MUTEX_INITIALIZER));
        let kind = if recursive {
            libc::PTHREAD_MUTEX_RECURSIVE
        } else {
            libc::PTHREAD_MUTEX_ERRORCHECK
        };
        // SAFETY: attr is initialised before use and destroyed afterwards;
        // `inner` is a valid, exclusively owned pthread_mutex_t.
        unsafe {
            let mut attr: libc::pthread_mutexattr_t = std::mem::zeroed();
            if libc::pthread_mutexattr_init(&mut attr) != 0 {
                return None;
            }
            let ok = libc::pthread_mutexattr_settype(&mut attr, kind) == 0
                && libc::pthread_mutex_init(inner.get(), &attr) == 0;
            libc::pthread_mutexattr_destroy(&mut attr);
            if !ok {
                return None;
            }
        }
        Some(Self { inner, recursive })
    }

    /// True for a host-recursive mutex.
    #[must_use]
    pub fn is_recursive(&self) -> bool {
        self.recursive
    }

    pub(crate) fn raw(&self) -> *mut libc::pthread_mutex_t {
        self.inner.get()
    }

    /// Block until the mutex is acquired.
    pub fn lock(&self) -> bool {
        // SAFETY: `raw()` points at an initialised mutex owned by `self`.
        unsafe { libc::pthread_mutex_lock(self.raw()) == 0 }
    }

    /// Acquire without blocking.
    pub fn try_lock(&self) -> bool {
        // SAFETY: as in `lock`.
        unsafe { libc::pthread_mutex_trylock(self.raw()) == 0 }
    }

    /// Release the mutex. Returns `false` if the caller is not the owner.
    pub fn unlock(&self) -> bool {
        // SAFETY: as in `lock`; errorcheck/recursive types reject
        // non-owner unlocks with EPERM.
        unsafe { libc::pthread_mutex_unlock(self.raw()) == 0 }
    }

    /// Acquire within `timeout`, polling with the given policy.
    pub fn lock_timeout(&self, timeout: Timeout, policy: TimedLockPolicy) -> bool {
        if self.try_lock() {
            return true;
        }
        match timeout {
            Timeout::Poll => false,
            Timeout::Forever => self.lock(),
            Timeout::Millis(ms) => match policy {
                TimedLockPolicy::Clock => self.poll_by_clock(ms),
                TimedLockPolicy::Ticks => self.poll_by_ticks(ms),
            },
        }
    }

    fn poll_by_clock(&self, ms: u32) -> bool {
        let start = time::now();
        let budget = Duration::from_millis(u64::from(ms));
        loop {
            let elapsed = start.elapsed();
            if elapsed >= budget {
                return false;
            }
            std::thread::sleep((budget - elapsed).min(Duration::from_millis(1)));
            if self.try_lock() {
                return true;
            }
        }
    }

    fn poll_by_ticks(&self, ms: u32) -> bool {
        let start = time::ticks_ms();
        loop {
            if time::ticks_ms().wrapping_sub(start) >= ms {
                return false;
            }
            time::sleep_ms(1);
            if self.try_lock() {
                return true;
            }
        }
    }
}

impl Drop for SysMutex {
    fn drop(&mut self) {
        // SAFETY: we own the mutex; destroying a locked mutex is reported
        // by the host and otherwise ignored.
        unsafe {
            libc::pthread_mutex_destroy(self.raw());
        }
    }
}

impl std::fmt::Debug for SysMutex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SysMutex")
            .field("addr", &self.raw())
            .field("recursive", &self.recursive)
            .finish()
    }
}
