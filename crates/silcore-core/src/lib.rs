//! # silcore-core
//!
//! Concurrency and memory-management core shared by the subsystems of a
//! system interface library:
//!
//! - [`memory`]: tracked, alignment-aware allocator with debug tagging,
//!   leak reports and fault injection.
//! - [`idarray`]: handle tables mapping small integer ids to objects,
//!   single-threaded and lock-free-read variants.
//! - [`sync`]: mutexes, semaphores and condition variables, emulated on
//!   hosts that only offer semaphores.
//! - [`format`]: allocation-free printf-style writer.
//! - [`debug`]: single-line debug log sink with an optional file tee.
//!
//! Host access goes through `silcore-platform`.

pub mod config;
pub mod debug;
pub mod error;
pub mod format;
pub mod idarray;
pub mod memory;
pub mod sync;

pub use config::{BuildConfig, build_config};
pub use error::{SilError, SilErrorKind};
pub use format::Arg;
pub use idarray::{CompactIdArray, IdTable, SharedIdArray};
pub use memory::{MemFlags, MemString, MemTag};
pub use silcore_platform::{DEFAULT_VARIANT, PlatformVariant, Timeout};

/// Direct access to the untracked host allocator.
#[cfg(not(feature = "memory-forbid-malloc"))]
pub use silcore_platform::mem as platform_mem;
