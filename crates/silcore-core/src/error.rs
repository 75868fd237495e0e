//! Error kinds surfaced by the core.
//!
//! Most entry points report failure through a sentinel (`None`, `0`,
//! `false`) and a log line at the failure site; the few that return
//! `Result` use [`SilError`]. Both paths share the same vocabulary so the
//! log line and the typed error always agree.

use thiserror::Error;

/// Coarse classification of a [`SilError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SilErrorKind {
    InvalidArgument,
    OutOfMemory,
    TimedOut,
    NotSupported,
    Internal,
}

impl SilErrorKind {
    /// Stable lowercase name used as the log-line prefix.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidArgument => "invalid argument",
            Self::OutOfMemory => "out of memory",
            Self::TimedOut => "timed out",
            Self::NotSupported => "not supported",
            Self::Internal => "internal error",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SilError {
    /// Null where forbidden, bad alignment, out-of-range id, bad size.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
    /// The platform allocator refused, or fault injection fired.
    #[error("out of memory")]
    OutOfMemory,
    /// A sync wait exceeded its budget.
    #[error("timed out")]
    TimedOut,
    /// Compiled out, or refused by the platform.
    #[error("not supported: {0}")]
    NotSupported(&'static str),
    /// Invariant violation; only reachable on a genuine bug.
    #[error("internal error: {0}")]
    Internal(&'static str),
}

impl SilError {
    #[must_use]
    pub const fn kind(&self) -> SilErrorKind {
        match self {
            Self::InvalidArgument(_) => SilErrorKind::InvalidArgument,
            Self::OutOfMemory => SilErrorKind::OutOfMemory,
            Self::TimedOut => SilErrorKind::TimedOut,
            Self::NotSupported(_) => SilErrorKind::NotSupported,
            Self::Internal(_) => SilErrorKind::Internal,
        }
    }

    /// Static detail text, empty for variants without one.
    #[must_use]
    pub const fn detail(&self) -> &'static str {
        match self {
            Self::InvalidArgument(d) | Self::NotSupported(d) | Self::Internal(d) => d,
            Self::OutOfMemory | Self::TimedOut => "",
        }
    }

    /// Emit this error through the debug log, attributed to `site`.
    ///
    /// Uses only static strings so it is safe to call from inside the
    /// allocator.
    pub fn report(&self, site: &crate::debug::Site) {
        let detail = self.detail();
        if detail.is_empty() {
            crate::debug::log_line(site, "%s", &[self.kind().as_str().into()]);
        } else {
            crate::debug::log_line(
                site,
                "%s: %s",
                &[self.kind().as_str().into(), detail.into()],
            );
        }
    }
}
