//! Formatted writer.
//!
//! printf-style formatting that never touches host stdio. Three outputs:
//! a bounded, NUL-terminated write into a caller buffer (never allocates);
//! an append that grows a C4-backed [`MemString`]; and a fresh allocation.
//!
//! Arguments are passed as a slice of [`Arg`]. A directive whose argument
//! is missing or of an incompatible class (a string for `%d`) is emitted
//! literally; numeric classes convert between each other freely.

pub mod float;
pub mod render;
pub mod sink;
pub mod spec;

use crate::memory::MemString;

pub use float::MAX_FLOAT_PRECISION;
pub use sink::{Bounded, Counter, Sink};
pub use spec::{FormatFlags, FormatSpec, LengthMod, Precision, Segment, Width, segments};

/// One formatting argument.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Arg<'a> {
    Int(i64),
    Uint(u64),
    Float(f64),
    Char(char),
    Str(&'a str),
    Ptr(usize),
}

macro_rules! arg_from {
    ($variant:ident, $wide:ty: $($t:ty),+) => {
        $(impl From<$t> for Arg<'_> {
            fn from(v: $t) -> Self {
                Arg::$variant(<$wide>::from(v))
            }
        })+
    };
}

arg_from!(Int, i64: i8, i16, i32, i64, bool);
arg_from!(Uint, u64: u8, u16, u32, u64);
arg_from!(Float, f64: f32, f64);

impl From<isize> for Arg<'_> {
    fn from(v: isize) -> Self {
        Arg::Int(v as i64)
    }
}

impl From<usize> for Arg<'_> {
    fn from(v: usize) -> Self {
        Arg::Uint(v as u64)
    }
}

impl From<char> for Arg<'_> {
    fn from(v: char) -> Self {
        Arg::Char(v)
    }
}

impl<'a> From<&'a str> for Arg<'a> {
    fn from(v: &'a str) -> Self {
        Arg::Str(v)
    }
}

impl<'a> From<&'a MemString> for Arg<'a> {
    fn from(v: &'a MemString) -> Self {
        Arg::Str(v.as_str())
    }
}

impl<T> From<*const T> for Arg<'_> {
    fn from(v: *const T) -> Self {
        Arg::Ptr(v as usize)
    }
}

impl<T> From<*mut T> for Arg<'_> {
    fn from(v: *mut T) -> Self {
        Arg::Ptr(v as usize)
    }
}

impl<T> From<core::ptr::NonNull<T>> for Arg<'_> {
    fn from(v: core::ptr::NonNull<T>) -> Self {
        Arg::Ptr(v.as_ptr() as usize)
    }
}

impl Arg<'_> {
    fn as_i64(self) -> Option<i64> {
        match self {
            Arg::Int(v) => Some(v),
            Arg::Uint(v) => Some(v as i64),
            Arg::Float(v) => Some(v as i64),
            Arg::Char(c) => Some(i64::from(u32::from(c))),
            Arg::Ptr(p) => Some(p as i64),
            Arg::Str(_) => None,
        }
    }

    fn as_u64(self) -> Option<u64> {
        match self {
            Arg::Int(v) => Some(v as u64),
            Arg::Uint(v) => Some(v),
            Arg::Float(v) => Some(v as u64),
            Arg::Char(c) => Some(u64::from(u32::from(c))),
            Arg::Ptr(p) => Some(p as u64),
            Arg::Str(_) => None,
        }
    }

    fn as_f64(self) -> Option<f64> {
        match self {
            Arg::Int(v) => Some(v as f64),
            Arg::Uint(v) => Some(v as f64),
            Arg::Float(v) => Some(v),
            Arg::Char(_) | Arg::Ptr(_) | Arg::Str(_) => None,
        }
    }
}

/// Render `fmt` with `args` into any sink.
pub fn render_into(out: &mut dyn Sink, fmt: &str, args: &[Arg<'_>]) {
    let mut args = args.iter().copied();
    for segment in segments(fmt) {
        match segment {
            Segment::Literal(text) => out.put(text.as_bytes()),
            Segment::Percent => out.put(b"%"),
            Segment::Directive { spec, raw } => {
                if !render_directive(spec, &mut args, out) {
                    out.put(raw.as_bytes());
                }
            }
        }
    }
}

fn render_directive<'a>(
    mut spec: FormatSpec,
    args: &mut impl Iterator<Item = Arg<'a>>,
    out: &mut dyn Sink,
) -> bool {
    if spec.width == Width::FromArg {
        let Some(w) = args.next().and_then(Arg::as_i64) else {
            return false;
        };
        if w < 0 {
            spec.flags.left_justify = true;
            spec.flags.zero_pad = false;
        }
        spec.width = Width::Fixed(usize::try_from(w.unsigned_abs()).unwrap_or(usize::MAX));
    }
    if spec.precision == Precision::FromArg {
        let Some(p) = args.next().and_then(Arg::as_i64) else {
            return false;
        };
        spec.precision = if p < 0 {
            Precision::None
        } else {
            Precision::Fixed(usize::try_from(p).unwrap_or(usize::MAX))
        };
    }
    let Some(arg) = args.next() else {
        return false;
    };
    match spec.conversion {
        b'd' | b'i' => match arg.as_i64() {
            Some(v) => render::format_signed(v, &spec, out),
            None => return false,
        },
        b'u' | b'x' | b'X' | b'o' => match arg.as_u64() {
            Some(v) => render::format_unsigned(v, &spec, out),
            None => return false,
        },
        b'f' | b'F' | b'e' | b'E' | b'g' | b'G' => match arg.as_f64() {
            Some(v) => render::format_float(v, &spec, out),
            None => return false,
        },
        b'c' => match arg {
            Arg::Char(c) => render::format_char(c, &spec, out),
            other => match other.as_u64().and_then(|v| char::from_u32(v as u32)) {
                Some(c) => render::format_char(c, &spec, out),
                None => return false,
            },
        },
        b'p' => match arg {
            Arg::Ptr(p) => render::format_pointer(p, &spec, out),
            other => match other.as_u64() {
                Some(v) => render::format_pointer(v as usize, &spec, out),
                None => return false,
            },
        },
        b's' => render_as_string(arg, spec, out),
        _ => return false,
    }
    true
}

/// `%s` accepts any argument; non-strings render in their natural form.
fn render_as_string(arg: Arg<'_>, mut spec: FormatSpec, out: &mut dyn Sink) {
    match arg {
        Arg::Str(s) => render::format_str(s, &spec, out),
        Arg::Char(c) => render::format_char(c, &spec, out),
        Arg::Int(v) => {
            spec.conversion = b'd';
            spec.precision = Precision::None;
            render::format_signed(v, &spec, out);
        }
        Arg::Uint(v) => {
            spec.conversion = b'u';
            spec.precision = Precision::None;
            render::format_unsigned(v, &spec, out);
        }
        Arg::Float(v) => {
            spec.conversion = b'g';
            spec.precision = Precision::None;
            render::format_float(v, &spec, out);
        }
        Arg::Ptr(p) => render::format_pointer(p, &spec, out),
    }
}

// ---------------------------------------------------------------------------
// Public entry points
// ---------------------------------------------------------------------------

/// Length of the fully formatted output, without writing it.
#[must_use]
pub fn format_len(fmt: &str, args: &[Arg<'_>]) -> usize {
    let mut counter = Counter::default();
    render_into(&mut counter, fmt, args);
    counter.len
}

/// Bounded write into `buf`.
///
/// Writes at most `buf.len() - 1` bytes followed by a NUL (when
/// `buf.len() >= 1`), never splitting a UTF-8 sequence, and returns the
/// length of the full untruncated output. Never allocates.
pub fn format_bounded(buf: &mut [u8], fmt: &str, args: &[Arg<'_>]) -> usize {
    let mut sink = Bounded::new(buf);
    render_into(&mut sink, fmt, args);
    sink.finish().1
}

/// Bounded write reporting whether the whole output fit.
pub fn format_fits(buf: &mut [u8], fmt: &str, args: &[Arg<'_>]) -> bool {
    format_bounded(buf, fmt, args) < buf.len()
}

/// Append to a C4-backed string. On allocation failure returns `false`
/// and leaves `dst` unchanged.
pub fn format_append(dst: &mut MemString, fmt: &str, args: &[Arg<'_>]) -> bool {
    let extra = format_len(fmt, args);
    if extra == 0 {
        return true;
    }
    let Some(spare) = dst.spare_for(extra) else {
        return false;
    };
    // `spare` has room for `extra` bytes plus a terminator.
    let mut sink = Bounded::new(spare);
    render_into(&mut sink, fmt, args);
    let (written, _) = sink.finish();
    // SAFETY: `written` bytes of complete UTF-8 were just rendered into the
    // spare capacity.
    unsafe { dst.commit(written) };
    true
}

/// Format into a freshly allocated C4 string.
#[must_use]
pub fn format_alloc(fmt: &str, args: &[Arg<'_>]) -> Option<MemString> {
    let mut s = MemString::new();
    if format_append(&mut s, fmt, args) {
        Some(s)
    } else {
        None
    }
}

/// Bounded formatted write: `silfmt!(buf, "x=%d", x)` returns the full length.
#[macro_export]
macro_rules! silfmt {
    ($buf:expr, $fmt:expr $(, $arg:expr)* $(,)?) => {
        $crate::format::format_bounded($buf, $fmt, &[$($crate::format::Arg::from($arg)),*])
    };
}

/// Allocating formatted write: `silfmt_alloc!("x=%d", x)` returns
/// `Option<MemString>`.
#[macro_export]
macro_rules! silfmt_alloc {
    ($fmt:expr $(, $arg:expr)* $(,)?) => {
        $crate::format::format_alloc($fmt, &[$($crate::format::Arg::from($arg)),*])
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bounded<const N: usize>(fmt: &str, args: &[Arg<'_>]) -> (String, usize) {
        let mut buf = [0xAAu8; N];
        let total = format_bounded(&mut buf, fmt, args);
        let end = buf.iter().position(|&b| b == 0).unwrap_or(N);
        (String::from_utf8(buf[..end].to_vec()).unwrap(), total)
    }

    #[test]
    fn mixed_directives() {
        let (s, n) = bounded::<64>(
            "%s=%5d|%-4x|%c|%.2f%%",
            &["v".into(), 42_i32.into(), 255_u32.into(), 'z'.into(), 2.5_f64.into()],
        );
        assert_eq!(s, "v=   42|ff  |z|2.50%");
        assert_eq!(n, s.len());
    }

    #[test]
    fn truncation_reports_full_length() {
        let (s, n) = bounded::<6>("hello world", &[]);
        assert_eq!(s, "hello");
        assert_eq!(n, 11);
    }

    #[test]
    fn truncation_never_splits_characters() {
        let (s, n) = bounded::<6>("%s", &["añoñ".into()]);
        // a(1) ñ(2) o(1) ñ(2): 5 bytes fit, which would split the second ñ.
        assert_eq!(s, "año");
        assert_eq!(n, 6);
    }

    #[test]
    fn star_width_and_precision() {
        let (s, _) = bounded::<32>("[%*d][%-*d][%.*f]", &[
            5.into(),
            1.into(),
            (-3).into(),
            2.into(),
            1.into(),
            0.26.into(),
        ]);
        assert_eq!(s, "[    1][2  ][0.3]");
    }

    #[test]
    fn missing_or_mismatched_arguments_stay_literal() {
        let (s, _) = bounded::<32>("a%db%dc", &[1.into()]);
        assert_eq!(s, "a1b%dc");
        let (s, _) = bounded::<32>("%d", &["text".into()]);
        assert_eq!(s, "%d");
    }

    #[test]
    fn string_directive_accepts_numbers() {
        let (s, _) = bounded::<32>("%s %s %s", &[7.into(), 1.5.into(), 'q'.into()]);
        assert_eq!(s, "7 1.5 q");
    }

    #[test]
    fn fits_predicate() {
        let mut buf = [0u8; 4];
        assert!(format_fits(&mut buf, "%d", &[123.into()]));
        assert!(!format_fits(&mut buf, "%d", &[1234.into()]));
        let mut empty: [u8; 0] = [];
        assert!(!format_fits(&mut empty, "", &[]));
    }

    #[test]
    fn prefix_is_stable_across_capacities() {
        let args = [Arg::from("xyzzy"), Arg::from(-17_i64), Arg::from(6.25)];
        let fmt = "%s:%08d:%e";
        let full = format_len(fmt, &args);
        let mut big = vec![0u8; full + 64];
        let mut exact = vec![0u8; full + 1];
        assert_eq!(format_bounded(&mut big, fmt, &args), full);
        assert_eq!(format_bounded(&mut exact, fmt, &args), full);
        assert_eq!(big[..full], exact[..full]);
    }

    #[test]
    fn macro_forms() {
        let mut buf = [0u8; 16];
        let n = crate::silfmt!(&mut buf, "%u-%s", 9_u8, "k");
        assert_eq!(n, 3);
        assert_eq!(&buf[..4], b"9-k\0");
    }
}
