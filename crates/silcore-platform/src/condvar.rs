//! Native (pthread) condition variable.
//!
//! On Linux the condvar is bound to `CLOCK_MONOTONIC` so timed waits are
//! immune to wall-clock jumps; other hosts fall back to `CLOCK_REALTIME`.

use std::cell::UnsafeCell;

use crate::mutex::SysMutex;
use crate::time::Timeout;

/// Host condition variable. Boxed so its address never changes.
pub struct SysCondVar {
    inner: Box<UnsafeCell<libc::pthread_cond_t>>,
}

// SAFETY: pthread condvars are designed for cross-thread use.
unsafe impl Send for SysCondVar {}
// SAFETY: see above.
unsafe impl Sync for SysCondVar {}

#[cfg(target_os = "linux")]
const WAIT_CLOCK: libc::clockid_t = libc::CLOCK_MONOTONIC;
#[cfg(not(target_os = "linux"))]
const WAIT_CLOCK: libc::clockid_t = libc::CLOCK_REALTIME;

impl SysCondVar {
    /// Create a condition variable. Returns `None` if the host refuses.
    #[must_use]
    pub fn new() -> Option<Self> {
        let inner = Box::new(UnsafeCell::new(libc::PTHREAD_COND_INITIALIZER));
        // SAFETY: attr is initialised before use and destroyed afterwards.
        unsafe {
            let mut attr: libc::pthread_condattr_t = std::mem::zeroed();
            if libc::pthread_condattr_init(&mut attr) != 0 {
                return None;
            }
            #[cfg(target_os = "linux")]
            let clock_ok = libc::pthread_condattr_setclock(&mut attr, WAIT_CLOCK) == 0;
            #[cfg(not(target_os = "linux"))]
            let clock_ok = true;
            let ok = clock_ok && libc::pthread_cond_init(inner.get(), &attr) == 0;
            libc::pthread_condattr_destroy(&mut attr);
            if !ok {
                return None;
            }
        }
        Some(Self { inner })
    }

    fn raw(&self) -> *mut libc::pthread_cond_t {
        self.inner.get()
    }

    /// Atomically release `mutex` and wait; `mutex` is held again on return.
    ///
    /// Returns `true` when woken (possibly spuriously), `false` on timeout.
    /// The caller must hold `mutex`.
    pub fn wait(&self, mutex: &SysMutex, timeout: Timeout) -> bool {
        match timeout.duration() {
            None => {
                // SAFETY: both objects are initialised; caller holds `mutex`.
                unsafe { libc::pthread_cond_wait(self.raw(), mutex.raw()) == 0 }
            }
            Some(budget) => {
                let deadline = deadline_after(budget);
                // SAFETY: as above; `deadline` is a valid timespec.
                let rc =
                    unsafe { libc::pthread_cond_timedwait(self.raw(), mutex.raw(), &deadline) };
                rc == 0
            }
        }
    }

    /// Wake at most one waiter.
    pub fn signal(&self) -> bool {
        // SAFETY: initialised condvar.
        unsafe { libc::pthread_cond_signal(self.raw()) == 0 }
    }

    /// Wake every waiter.
    pub fn broadcast(&self) -> bool {
        // SAFETY: initialised condvar.
        unsafe { libc::pthread_cond_broadcast(self.raw()) == 0 }
    }
}

fn deadline_after(budget: std::time::Duration) -> libc::timespec {
    let mut now = libc::timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };
    // SAFETY: valid out-pointer.
    unsafe {
        libc::clock_gettime(WAIT_CLOCK, &mut now);
    }
    let mut sec = now.tv_sec as i64 + budget.as_secs() as i64;
    let mut nsec = now.tv_nsec as i64 + i64::from(budget.subsec_nanos());
    if nsec >= 1_000_000_000 {
        sec += 1;
        nsec -= 1_000_000_000;
    }
    libc::timespec {
        tv_sec: sec as libc::time_t,
        tv_nsec: nsec as _,
    }
}

impl Drop for SysCondVar {
    fn drop(&mut self) {
        // SAFETY: we own the condvar; waiters at destruction are a caller bug.
        unsafe {
            libc::pthread_cond_destroy(self.raw());
        }
    }
}

impl std::fmt::Debug for SysCondVar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SysCondVar").field("addr", &self.raw()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[test]
    fn timed_wait_expires() {
        let m = SysMutex::new(false).unwrap();
        let cv = SysCondVar::new().unwrap();
        assert!(m.lock());
        let start = std::time::Instant::now();
        assert!(!cv.wait(&m, Timeout::Millis(20)));
        assert!(start.elapsed() >= std::time::Duration::from_millis(15));
        assert!(m.unlock());
    }

    #[test]
    fn poll_wait_returns_immediately() {
        let m = SysMutex::new(false).unwrap();
        let cv = SysCondVar::new().unwrap();
        assert!(m.lock());
        assert!(!cv.wait(&m, Timeout::Poll));
        assert!(m.unlock());
    }

    #[test]
    fn signal_wakes_waiter() {
        let pair = Arc::new((SysMutex::new(false).unwrap(), SysCondVar::new().unwrap()));
        let flag = Arc::new(AtomicBool::new(false));
        let (p2, f2) = (Arc::clone(&pair), Arc::clone(&flag));
        let waiter = std::thread::spawn(move || {
            let (m, cv) = &*p2;
            assert!(m.lock());
            while !f2.load(Ordering::Acquire) {
                cv.wait(m, Timeout::Forever);
            }
            assert!(m.unlock());
        });
        let (m, cv) = &*pair;
        crate::time::sleep_ms(10);
        assert!(m.lock());
        flag.store(true, Ordering::Release);
        assert!(cv.signal());
        assert!(m.unlock());
        waiter.join().unwrap();
    }
}
