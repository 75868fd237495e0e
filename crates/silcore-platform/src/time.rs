//! Time sources and wait budgets.

use std::time::{Duration, Instant};

/// Wait budget for blocking primitives.
///
/// The integer form used throughout the API is milliseconds where a negative
/// value waits forever and zero polls without suspending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Timeout {
    /// Never suspend; succeed only if the resource is immediately available.
    Poll,
    /// Suspend for at most this many milliseconds.
    Millis(u32),
    /// Suspend until the resource becomes available.
    Forever,
}

impl Timeout {
    /// Convert the integer millisecond convention into a `Timeout`.
    #[must_use]
    pub const fn from_ms(ms: i64) -> Self {
        if ms < 0 {
            Self::Forever
        } else if ms == 0 {
            Self::Poll
        } else if ms > u32::MAX as i64 {
            Self::Millis(u32::MAX)
        } else {
            Self::Millis(ms as u32)
        }
    }

    /// Integer millisecond form (`-1` for forever).
    #[must_use]
    pub const fn as_ms(self) -> i64 {
        match self {
            Self::Poll => 0,
            Self::Millis(ms) => ms as i64,
            Self::Forever => -1,
        }
    }

    /// Budget as a `Duration`, `None` when unbounded.
    #[must_use]
    pub const fn duration(self) -> Option<Duration> {
        match self {
            Self::Poll => Some(Duration::ZERO),
            Self::Millis(ms) => Some(Duration::from_millis(ms as u64)),
            Self::Forever => None,
        }
    }

    /// Absolute deadline measured from `start`, `None` when unbounded.
    #[must_use]
    pub fn deadline_from(self, start: Instant) -> Option<Instant> {
        self.duration().map(|d| start + d)
    }
}

impl From<i32> for Timeout {
    fn from(ms: i32) -> Self {
        Self::from_ms(i64::from(ms))
    }
}

/// Current monotonic instant.
#[must_use]
pub fn now() -> Instant {
    Instant::now()
}

/// Millisecond tick counter from the host monotonic clock.
///
/// Wraps like a hardware tick register would; callers compare with
/// `wrapping_sub`.
#[must_use]
pub fn ticks_ms() -> u32 {
    let mut ts = libc::timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };
    // SAFETY: `ts` is a valid out-pointer for clock_gettime.
    let rc = unsafe { libc::clock_gettime(libc::CLOCK_MONOTONIC, &mut ts) };
    if rc != 0 {
        return 0;
    }
    let ms = (ts.tv_sec as u64)
        .wrapping_mul(1000)
        .wrapping_add(ts.tv_nsec as u64 / 1_000_000);
    ms as u32
}

/// Sleep the calling thread for `ms` milliseconds.
pub fn sleep_ms(ms: u32) {
    std::thread::sleep(Duration::from_millis(u64::from(ms)));
}
