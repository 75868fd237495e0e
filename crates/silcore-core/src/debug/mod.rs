//! Debug log sink.
//!
//! One entry point, [`log_line`], builds a single line
//! `"file:line(function): message\n"` in a stack buffer of at most
//! [`LOG_MAX_LINE`] bytes and writes it atomically to the host log. The
//! line is also teed to an optional log file (see [`logfile`]).
//!
//! The sink may be called from inside the allocator and from platform
//! primitives: it never allocates through C4 and never takes the
//! allocator's lock.

#[cfg(any(test, feature = "include-tests"))]
pub mod capture;
pub mod logfile;

use crate::format::{self, Arg, Bounded, Sink};

pub use logfile::{LOG_PENDING_SIZE, log_file_close, log_file_configure, log_file_open};

// Stack-buffer ceiling, whatever the build asks for.
const LOG_MAX_LINE_CEILING: usize = 64 * 1024;
const LOG_MAX_LINE_FLOOR: usize = 64;

const fn parse_line_limit(raw: Option<&str>, default: usize) -> usize {
    let Some(text) = raw else {
        return default;
    };
    let bytes = text.as_bytes();
    if bytes.is_empty() {
        return default;
    }
    let mut value = 0_usize;
    let mut i = 0;
    while i < bytes.len() {
        if !bytes[i].is_ascii_digit() {
            return default;
        }
        value = value.saturating_mul(10).saturating_add((bytes[i] - b'0') as usize);
        i += 1;
    }
    if value < LOG_MAX_LINE_FLOOR {
        LOG_MAX_LINE_FLOOR
    } else if value > LOG_MAX_LINE_CEILING {
        LOG_MAX_LINE_CEILING
    } else {
        value
    }
}

/// Maximum bytes in one log line, newline included.
///
/// Set at build time with `SILCORE_LOG_MAX_LINE` (default 4096).
pub const LOG_MAX_LINE: usize = parse_line_limit(option_env!("SILCORE_LOG_MAX_LINE"), 4096);

/// Path prefix elided from file names in line headers.
///
/// Set at build time with `SILCORE_LOG_STRIP_PREFIX`.
pub const LOG_STRIP_PREFIX: &str = match option_env!("SILCORE_LOG_STRIP_PREFIX") {
    Some(prefix) => prefix,
    None => "",
};

/// Source position attached to a log line. Any part may be absent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Site {
    pub file: Option<&'static str>,
    /// Zero means absent.
    pub line: u32,
    pub function: Option<&'static str>,
}

impl Site {
    pub const NONE: Site = Site {
        file: None,
        line: 0,
        function: None,
    };

    #[must_use]
    pub const fn new(file: &'static str, line: u32, function: &'static str) -> Self {
        Self {
            file: Some(file),
            line,
            function: Some(function),
        }
    }

    /// Site of the `#[track_caller]` chain's origin (no function name).
    #[must_use]
    #[track_caller]
    pub fn caller() -> Self {
        Self::from_location(core::panic::Location::caller())
    }

    #[must_use]
    pub fn from_location(loc: &'static core::panic::Location<'static>) -> Self {
        Self {
            file: Some(loc.file()),
            line: loc.line(),
            function: None,
        }
    }
}

/// `Site` for the current source position.
#[macro_export]
macro_rules! site {
    () => {
        $crate::debug::Site::new(file!(), line!(), module_path!())
    };
}

/// Log a formatted line: `dlog!("bad id %u", id)`.
#[macro_export]
macro_rules! dlog {
    ($fmt:expr $(, $arg:expr)* $(,)?) => {
        $crate::debug::log_line(&$crate::site!(), $fmt, &[$($crate::format::Arg::from($arg)),*])
    };
}

/// Check a precondition that should never fail at runtime.
///
/// On failure the condition (or the given [`SilError`](crate::SilError))
/// is logged; `debug` builds then panic, other builds evaluate `fallback`
/// (typically a `return` of the sentinel). The error form attributes the
/// line to the origin of a `#[track_caller]` chain.
#[macro_export]
macro_rules! precond {
    ($cond:expr, $fallback:expr) => {
        if !($cond) {
            $crate::debug::precondition_failed(&$crate::site!(), stringify!($cond));
            $fallback
        }
    };
    ($cond:expr, $err:expr, $fallback:expr) => {
        if !($cond) {
            $crate::debug::precondition_violated(&$crate::debug::Site::caller(), $err);
            $fallback
        }
    };
}

/// Report a failed precondition. Panics in `debug` builds.
pub fn precondition_failed(site: &Site, condition: &'static str) {
    log_line(site, "precondition failed: %s", &[condition.into()]);
    #[cfg(feature = "debug")]
    panic!("precondition failed: {condition}");
}

/// Report a precondition broken by the caller as `err`. Panics in `debug`
/// builds; otherwise the caller returns its sentinel.
pub fn precondition_violated(site: &Site, err: crate::error::SilError) {
    err.report(site);
    #[cfg(feature = "debug")]
    panic!("precondition failed: {err}");
}

/// File name with [`LOG_STRIP_PREFIX`] removed.
#[must_use]
pub fn strip_prefix(file: &str) -> &str {
    if LOG_STRIP_PREFIX.is_empty() {
        return file;
    }
    file.strip_prefix(LOG_STRIP_PREFIX).unwrap_or(file)
}

fn write_header(site: &Site, out: &mut dyn Sink) {
    let mut any = false;
    if let Some(file) = site.file {
        out.put(strip_prefix(file).as_bytes());
        any = true;
    }
    if site.line != 0 {
        let mut digits = [0u8; 10];
        let mut n = site.line;
        let mut pos = digits.len();
        while n > 0 {
            pos -= 1;
            digits[pos] = b'0' + (n % 10) as u8;
            n /= 10;
        }
        out.put(b":");
        out.put(&digits[pos..]);
        any = true;
    }
    if let Some(function) = site.function {
        out.put(b"(");
        out.put(function.as_bytes());
        out.put(b")");
        any = true;
    }
    if any {
        out.put(b": ");
    }
}

/// Build a complete line (header, message, one newline) into `line`.
/// Returns the line length.
pub fn compose_line(line: &mut [u8], site: &Site, fmt: &str, args: &[Arg<'_>]) -> usize {
    if line.is_empty() {
        return 0;
    }
    let mut sink = Bounded::new(line);
    write_header(site, &mut sink);
    format::render_into(&mut sink, fmt, args);
    let (mut len, _) = sink.finish();
    while len > 0 && line[len - 1] == b'\n' {
        len -= 1;
    }
    // `finish` left at least the terminator slot free.
    line[len] = b'\n';
    len + 1
}

/// Emit one log line to the host sink and any configured log file.
pub fn log_line(site: &Site, fmt: &str, args: &[Arg<'_>]) {
    let mut line = [0u8; LOG_MAX_LINE];
    let len = compose_line(&mut line, site, fmt, args);
    emit(&line[..len]);
}

fn emit(line: &[u8]) {
    #[cfg(any(test, feature = "include-tests"))]
    capture::record(line);
    silcore_platform::log::log_write(line);
    logfile::tee(line);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn composed(site: &Site, fmt: &str, args: &[Arg<'_>]) -> String {
        let mut line = [0u8; LOG_MAX_LINE];
        let len = compose_line(&mut line, site, fmt, args);
        String::from_utf8(line[..len].to_vec()).unwrap()
    }

    #[test]
    fn full_header() {
        let site = Site::new("src/lib.rs", 12, "silcore::thing");
        assert_eq!(
            composed(&site, "value %d", &[5.into()]),
            "src/lib.rs:12(silcore::thing): value 5\n"
        );
    }

    #[test]
    fn absent_parts_are_omitted() {
        assert_eq!(composed(&Site::NONE, "bare", &[]), "bare\n");
        let file_only = Site {
            file: Some("a.rs"),
            ..Site::NONE
        };
        assert_eq!(composed(&file_only, "x", &[]), "a.rs: x\n");
        let line_only = Site {
            line: 7,
            ..Site::NONE
        };
        assert_eq!(composed(&line_only, "x", &[]), ":7: x\n");
    }

    #[test]
    fn caller_newlines_are_absorbed() {
        assert_eq!(composed(&Site::NONE, "done\n", &[]), "done\n");
        assert_eq!(composed(&Site::NONE, "done\n\n", &[]), "done\n");
        assert_eq!(composed(&Site::NONE, "", &[]), "\n");
    }

    #[test]
    fn long_lines_are_capped() {
        let long = "é".repeat(LOG_MAX_LINE);
        let text = composed(&Site::NONE, "%s", &[long.as_str().into()]);
        assert!(text.len() <= LOG_MAX_LINE);
        assert!(text.ends_with('\n'));
        assert_eq!(text.matches('\n').count(), 1);
    }

    #[test]
    fn small_buffers_still_end_in_newline() {
        let mut line = [0u8; 4];
        let len = compose_line(&mut line, &Site::NONE, "abcdef", &[]);
        assert_eq!(&line[..len], b"abc\n");
    }

    #[test]
    fn limit_parsing() {
        assert_eq!(parse_line_limit(None, 4096), 4096);
        assert_eq!(parse_line_limit(Some("8192"), 4096), 8192);
        assert_eq!(parse_line_limit(Some("12"), 4096), LOG_MAX_LINE_FLOOR);
        assert_eq!(parse_line_limit(Some("lots"), 4096), 4096);
        assert_eq!(parse_line_limit(Some("99999999"), 4096), LOG_MAX_LINE_CEILING);
    }

    #[test]
    fn dlog_is_captured() {
        capture::start();
        crate::dlog!("captured %s", "line");
        let lines = capture::take();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("(silcore_core::debug::tests): captured line"));
    }

    #[cfg(feature = "debug")]
    #[test]
    #[should_panic(expected = "precondition failed")]
    fn precond_panics_in_debug_builds() {
        crate::precond!(1 + 1 == 3, return);
    }

    #[cfg(feature = "debug")]
    #[test]
    #[should_panic(expected = "precondition failed: invalid argument: odd width")]
    fn precond_with_error_panics_in_debug_builds() {
        let width = 3;
        crate::precond!(
            width % 2 == 0,
            crate::SilError::InvalidArgument("odd width"),
            return
        );
    }

    #[cfg(not(feature = "debug"))]
    #[test]
    fn precond_runs_the_fallback_otherwise() {
        fn halve(width: u32) -> Option<u32> {
            crate::precond!(
                width % 2 == 0,
                crate::SilError::InvalidArgument("odd width"),
                return None
            );
            Some(width / 2)
        }
        capture::start();
        assert_eq!(halve(4), Some(2));
        assert_eq!(halve(3), None);
        let lines = capture::take();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("invalid argument: odd width"));
    }
}
