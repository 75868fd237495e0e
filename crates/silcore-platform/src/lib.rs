//! # silcore-platform
//!
//! Host-specific primitives for silcore: the low-level allocator, native
//! mutexes and condition variables, counting semaphores, threads, a
//! monotonic tick source and the single-line log sink.
//!
//! Everything here is stateless from the caller's point of view and reports
//! failure through sentinels (`None` / `false`). Diagnostics for those
//! failures are emitted by the calling layer in `silcore-core`; this crate
//! never retries.

pub mod condvar;
pub mod log;
pub mod mem;
pub mod mutex;
pub mod semaphore;
pub mod thread;
pub mod time;
pub mod variant;

pub use condvar::SysCondVar;
pub use mutex::{SysMutex, TimedLockPolicy};
pub use semaphore::{SysEvent, SysSemaphore};
pub use thread::{SysThread, current_id, yield_now};
pub use time::Timeout;
pub use variant::{DEFAULT_VARIANT, PlatformVariant};
