//! Counting semaphore and one-shot event flag.
//!
//! Both are built on `parking_lot::{Mutex, Condvar}`, which need no
//! heap allocation and are const-constructible.

use parking_lot::{Condvar, Mutex};

use crate::time::Timeout;

/// Counting semaphore with an upper bound.
#[derive(Debug)]
pub struct SysSemaphore {
    count: Mutex<u32>,
    available: Condvar,
    max: u32,
}

impl SysSemaphore {
    /// Create a semaphore holding `initial` tokens, capped at `max`.
    ///
    /// Returns `None` when `max == 0` or `initial > max`.
    #[must_use]
    pub fn new(initial: u32, max: u32) -> Option<Self> {
        if max == 0 || initial > max {
            return None;
        }
        Some(Self {
            count: Mutex::new(initial),
            available: Condvar::new(),
            max,
        })
    }

    /// Upper bound on the token count.
    #[must_use]
    pub fn max(&self) -> u32 {
        self.max
    }

    /// Current token count (advisory; may change immediately).
    #[must_use]
    pub fn value(&self) -> u32 {
        *self.count.lock()
    }

    /// Take one token, waiting up to `timeout`. Returns `false` on timeout.
    pub fn wait(&self, timeout: Timeout) -> bool {
        let mut count = self.count.lock();
        if *count > 0 {
            *count -= 1;
            return true;
        }
        match timeout {
            Timeout::Poll => false,
            Timeout::Forever => {
                while *count == 0 {
                    self.available.wait(&mut count);
                }
                *count -= 1;
                true
            }
            Timeout::Millis(ms) => {
                let deadline =
                    std::time::Instant::now() + std::time::Duration::from_millis(u64::from(ms));
                while *count == 0 {
                    if self.available.wait_until(&mut count, deadline).timed_out() {
                        break;
                    }
                }
                if *count > 0 {
                    *count -= 1;
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Add one token and wake at most one waiter.
    ///
    /// Returns `false` (and adds nothing) when already at the maximum.
    pub fn signal(&self) -> bool {
        self.signal_n(1) == 1
    }

    /// Add up to `n` tokens, waking one waiter per token added.
    ///
    /// Returns the number of tokens actually added.
    pub fn signal_n(&self, n: u32) -> u32 {
        let mut count = self.count.lock();
        let added = n.min(self.max - *count);
        *count += added;
        drop(count);
        for _ in 0..added {
            self.available.notify_one();
        }
        added
    }

    /// Remove every available token without waiting; returns how many.
    pub fn try_drain(&self) -> u32 {
        let mut count = self.count.lock();
        std::mem::replace(&mut *count, 0)
    }
}

/// Auto-reset event flag: `set` releases exactly one `wait`.
#[derive(Debug, Default)]
pub struct SysEvent {
    signalled: Mutex<bool>,
    cond: Condvar,
}

impl SysEvent {
    /// Create an unsignalled event.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            signalled: Mutex::new(false),
            cond: Condvar::new(),
        }
    }

    /// Signal the event, waking one waiter.
    pub fn set(&self) {
        *self.signalled.lock() = true;
        self.cond.notify_one();
    }

    /// Clear the event without waking anyone.
    pub fn reset(&self) {
        *self.signalled.lock() = false;
    }

    /// Wait for the event and consume it. Returns `false` on timeout.
    pub fn wait(&self, timeout: Timeout) -> bool {
        let mut signalled = self.signalled.lock();
        match timeout.duration() {
            None => {
                while !*signalled {
                    self.cond.wait(&mut signalled);
                }
            }
            Some(budget) => {
                let deadline = std::time::Instant::now() + budget;
                while !*signalled {
                    if self.cond.wait_until(&mut signalled, deadline).timed_out() {
                        break;
                    }
                }
            }
        }
        std::mem::replace(&mut *signalled, false)
    }
}
