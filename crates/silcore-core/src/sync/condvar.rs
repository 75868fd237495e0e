//! Condition variables.
//!
//! Native variants wrap the host condvar, which must then be paired with a
//! native mutex. The semaphore-only variant emulates one:
//!
//! - waiters register in `waiters` under a small lock, release the user
//!   mutex and block on a counting semaphore;
//! - `signal` posts one token when anybody waits;
//! - `broadcast` posts one token per waiter, then blocks on `done` until
//!   the last of them has left, and finally drains tokens orphaned by
//!   waiters that timed out during the broadcast.
//!
//! Callers hold the user mutex while signalling; that keeps new waiters
//! out while a broadcast is in flight.

use core::panic::Location;

use parking_lot::Mutex;
use silcore_platform::{DEFAULT_VARIANT, PlatformVariant, SysCondVar, SysEvent, SysSemaphore, Timeout};

use super::mutex::{MutexHandle, mutex_lock, mutex_unlock};
use super::{Handle, alloc_object, free_object};
use crate::debug::Site;
use crate::error::SilError;

struct Waiters {
    count: u32,
    was_broadcast: bool,
}

struct Emulated {
    waiters: Mutex<Waiters>,
    wakeups: SysSemaphore,
    done: SysEvent,
}

impl Emulated {
    fn new() -> Option<Self> {
        Some(Self {
            waiters: Mutex::new(Waiters {
                count: 0,
                was_broadcast: false,
            }),
            wakeups: SysSemaphore::new(0, u32::MAX)?,
            done: SysEvent::new(),
        })
    }

    fn enter(&self) {
        self.waiters.lock().count += 1;
    }

    /// Deregister a waiter, woken or timed out; the last one out of a
    /// broadcast releases the broadcaster.
    fn leave(&self) {
        let last_of_broadcast = {
            let mut waiters = self.waiters.lock();
            waiters.count -= 1;
            waiters.was_broadcast && waiters.count == 0
        };
        if last_of_broadcast {
            self.done.set();
        }
    }

    fn wait(&self, mx: MutexHandle, timeout: Timeout) -> bool {
        self.enter();
        mutex_unlock(mx);
        let signalled = self.wakeups.wait(timeout);
        self.leave();
        mutex_lock(mx, Timeout::Forever);
        signalled
    }

    fn signal(&self) {
        if self.waiters.lock().count > 0 {
            self.wakeups.signal();
        }
    }

    fn broadcast(&self) {
        let mut waiters = self.waiters.lock();
        if waiters.count == 0 {
            return;
        }
        waiters.was_broadcast = true;
        self.wakeups.signal_n(waiters.count);
        drop(waiters);
        self.done.wait(Timeout::Forever);
        self.waiters.lock().was_broadcast = false;
        self.wakeups.try_drain();
    }
}

enum Repr {
    Native(SysCondVar),
    Emulated(Emulated),
}

/// A condition-variable object; reach it through a [`CondVarHandle`].
pub struct CondVarObject {
    repr: Repr,
}

pub type CondVarHandle = Handle<CondVarObject>;

/// Create a condition variable on the compiled-in platform variant.
#[must_use]
#[track_caller]
pub fn condvar_create() -> Option<CondVarHandle> {
    create(DEFAULT_VARIANT, Location::caller())
}

/// Create a condition variable on an explicit platform variant.
#[must_use]
#[track_caller]
pub fn condvar_create_on(variant: PlatformVariant) -> Option<CondVarHandle> {
    create(variant, Location::caller())
}

fn create(variant: PlatformVariant, site: &'static Location<'static>) -> Option<CondVarHandle> {
    let repr = if variant.has_native_sync() {
        SysCondVar::new().map(Repr::Native)
    } else {
        Emulated::new().map(Repr::Emulated)
    };
    let Some(repr) = repr else {
        SilError::NotSupported("host refused to create a condition variable")
            .report(&Site::from_location(site));
        return None;
    };
    alloc_object(CondVarObject { repr }, site)
}

/// Destroy a condition variable and free its memory.
///
/// # Safety
///
/// No thread may be waiting, and `handle` must not be used again.
pub unsafe fn condvar_destroy(handle: CondVarHandle) {
    // SAFETY: forwarded contract.
    unsafe { free_object(handle) };
}

/// Release `mx`, wait for a signal, re-acquire `mx`.
///
/// The caller must hold `mx` exactly once. Returns `true` when signalled,
/// `false` on timeout. A [`Timeout::Poll`] wait returns `false` at once
/// without releasing `mx`.
#[track_caller]
pub fn condvar_wait(cv: CondVarHandle, mx: MutexHandle, timeout: Timeout) -> bool {
    if timeout == Timeout::Poll {
        return false;
    }
    match &cv.object().repr {
        Repr::Native(cond) => match mx.object().native() {
            Some(mutex) => cond.wait(mutex, timeout),
            None => {
                SilError::InvalidArgument("native condition variable needs a native mutex")
                    .report(&Site::caller());
                false
            }
        },
        Repr::Emulated(emu) => emu.wait(mx, timeout),
    }
}

/// Wake one waiter, or every waiter when `broadcast` is set. The caller
/// must hold the mutex the waiters passed to [`condvar_wait`].
pub fn condvar_signal(cv: CondVarHandle, broadcast: bool) -> bool {
    match &cv.object().repr {
        Repr::Native(cond) if broadcast => cond.broadcast(),
        Repr::Native(cond) => cond.signal(),
        Repr::Emulated(emu) if broadcast => {
            emu.broadcast();
            true
        }
        Repr::Emulated(emu) => {
            emu.signal();
            true
        }
    }
}

/// Wakeup tokens posted but not yet consumed. Always zero for native
/// condition variables.
#[cfg(feature = "include-tests")]
#[must_use]
pub fn condvar_pending_wakeups(cv: CondVarHandle) -> u32 {
    match &cv.object().repr {
        Repr::Native(_) => 0,
        Repr::Emulated(emu) => emu.wakeups.value(),
    }
}
