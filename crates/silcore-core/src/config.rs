//! Compiled configuration.
//!
//! Everything here is fixed when the crate is built: cargo features select
//! the debug machinery and platform variant, and two build-time
//! environment variables size the log line:
//! - `SILCORE_LOG_MAX_LINE`: maximum bytes in one log line (default 4096).
//! - `SILCORE_LOG_STRIP_PREFIX`: path prefix elided from log headers.

use silcore_platform::{DEFAULT_VARIANT, PlatformVariant};

#[cfg(not(target_endian = "little"))]
compile_error!("silcore supports little-endian targets only");

/// Float precision used by the formatted writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FloatFormat {
    /// Values are rounded through `f32` before rendering.
    Single,
    Double,
}

impl FloatFormat {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Single => "single",
            Self::Double => "double",
        }
    }
}

/// Snapshot of the compiled configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildConfig {
    pub debug: bool,
    pub include_tests: bool,
    pub memory_check_pointers: bool,
    pub memory_debug_fill: bool,
    pub memory_log_allocs: bool,
    pub memory_forbid_malloc: bool,
    pub float_format: FloatFormat,
    pub platform: PlatformVariant,
    pub log_max_line: usize,
    pub log_strip_prefix: &'static str,
    pub max_align: usize,
}

/// The configuration this crate was built with.
#[must_use]
pub const fn build_config() -> BuildConfig {
    BuildConfig {
        debug: cfg!(feature = "debug"),
        include_tests: cfg!(feature = "include-tests"),
        memory_check_pointers: cfg!(feature = "memory-check-pointers"),
        memory_debug_fill: cfg!(feature = "memory-debug-fill"),
        memory_log_allocs: cfg!(feature = "memory-log-allocs"),
        memory_forbid_malloc: cfg!(feature = "memory-forbid-malloc"),
        float_format: if cfg!(feature = "float-single") {
            FloatFormat::Single
        } else {
            FloatFormat::Double
        },
        platform: DEFAULT_VARIANT,
        log_max_line: crate::debug::LOG_MAX_LINE,
        log_strip_prefix: crate::debug::LOG_STRIP_PREFIX,
        max_align: silcore_platform::mem::MAX_ALIGN,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reflects_features() {
        let config = build_config();
        assert_eq!(config.debug, cfg!(feature = "debug"));
        assert_eq!(config.platform, DEFAULT_VARIANT);
        assert!(config.log_max_line >= 64);
        assert!(config.max_align.is_power_of_two());
        if config.include_tests {
            assert!(config.debug);
        }
    }
}
