//! Platform variant selection.
//!
//! The variant decides how sync objects are built on top of the host:
//! - `Native`: pthread mutexes and condition variables map directly; timed
//!   mutex lock is emulated by a try-lock/sleep loop driven by the
//!   monotonic clock.
//! - `CriticalSection`: same native objects, but timed lock polls a
//!   millisecond tick counter (the cooperative-kernel flavour).
//! - `SemaphoreOnly`: mutexes are binary semaphores, recursive mutexes add
//!   owner tracking, and condition variables are emulated from a counting
//!   semaphore plus an event flag.

use crate::mutex::TimedLockPolicy;

/// Strategy used to build sync objects on this host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlatformVariant {
    Native,
    CriticalSection,
    SemaphoreOnly,
}

impl PlatformVariant {
    /// Stable lowercase name, used in diagnostics and harness reports.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Native => "native",
            Self::CriticalSection => "critical-section",
            Self::SemaphoreOnly => "semaphore-only",
        }
    }

    /// Parse from string (case-insensitive). Unknown names map to `None`.
    #[must_use]
    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "native" | "pthread" => Some(Self::Native),
            "critical-section" | "critical_section" | "cs" => Some(Self::CriticalSection),
            "semaphore-only" | "semaphore_only" | "sem" => Some(Self::SemaphoreOnly),
            _ => None,
        }
    }

    /// True when mutexes and condition variables are host objects.
    #[must_use]
    pub const fn has_native_sync(self) -> bool {
        !matches!(self, Self::SemaphoreOnly)
    }

    /// Timed-lock emulation used for native mutexes on this variant.
    #[must_use]
    pub const fn timed_lock_policy(self) -> TimedLockPolicy {
        match self {
            Self::CriticalSection => TimedLockPolicy::Ticks,
            _ => TimedLockPolicy::Clock,
        }
    }

    /// All variants, in declaration order.
    #[must_use]
    pub const fn all() -> [Self; 3] {
        [Self::Native, Self::CriticalSection, Self::SemaphoreOnly]
    }
}

#[cfg(all(
    feature = "platform-critical-section",
    feature = "platform-semaphore-only"
))]
compile_error!("select at most one of `platform-critical-section` and `platform-semaphore-only`");

/// Variant compiled in for objects created without an explicit variant.
#[cfg(feature = "platform-semaphore-only")]
pub const DEFAULT_VARIANT: PlatformVariant = PlatformVariant::SemaphoreOnly;
/// Variant compiled in for objects created without an explicit variant.
#[cfg(feature = "platform-critical-section")]
pub const DEFAULT_VARIANT: PlatformVariant = PlatformVariant::CriticalSection;
/// Variant compiled in for objects created without an explicit variant.
#[cfg(not(any(
    feature = "platform-critical-section",
    feature = "platform-semaphore-only"
)))]
pub const DEFAULT_VARIANT: PlatformVariant = PlatformVariant::Native;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_round_trips_names() {
        for variant in PlatformVariant::all() {
            assert_eq!(PlatformVariant::from_str_loose(variant.as_str()), Some(variant));
        }
        assert_eq!(PlatformVariant::from_str_loose("SEM"), Some(PlatformVariant::SemaphoreOnly));
        assert_eq!(PlatformVariant::from_str_loose("vxworks"), None);
    }

    #[test]
    fn only_semaphore_variant_lacks_native_sync() {
        assert!(PlatformVariant::Native.has_native_sync());
        assert!(PlatformVariant::CriticalSection.has_native_sync());
        assert!(!PlatformVariant::SemaphoreOnly.has_native_sync());
    }

    #[test]
    fn critical_section_polls_ticks() {
        assert_eq!(
            PlatformVariant::CriticalSection.timed_lock_policy(),
            TimedLockPolicy::Ticks
        );
        assert_eq!(PlatformVariant::Native.timed_lock_policy(), TimedLockPolicy::Clock);
    }
}
