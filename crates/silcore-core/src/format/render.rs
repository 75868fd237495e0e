//! Directive renderers.
//!
//! Each renderer applies width, precision and flag rules for one argument
//! class and writes through a [`Sink`]. Maximum expansion per directive is
//! `width + precision + 64` bytes plus the float body.

use super::float::{self, FloatText};
use super::sink::Sink;
use super::spec::{FormatSpec, LengthMod, Precision, Width};

// ---------------------------------------------------------------------------
// Integers
// ---------------------------------------------------------------------------

/// Render a signed integer (`%d`, `%i`).
pub fn format_signed(value: i64, spec: &FormatSpec, out: &mut dyn Sink) {
    let value = match spec.length {
        LengthMod::Hh => i64::from(value as i8),
        LengthMod::H => i64::from(value as i16),
        _ => value,
    };
    let sign = if value < 0 {
        Some(b'-')
    } else {
        plus_sign(spec)
    };
    emit_integer(value.unsigned_abs(), sign, b"", spec, out);
}

/// Render an unsigned integer (`%u`, `%x`, `%X`, `%o`).
pub fn format_unsigned(value: u64, spec: &FormatSpec, out: &mut dyn Sink) {
    let value = match spec.length {
        LengthMod::Hh => u64::from(value as u8),
        LengthMod::H => u64::from(value as u16),
        _ => value,
    };
    let prefix: &[u8] = match alt_prefix(spec) {
        // '#' on octal still shows the zero that precision 0 suppresses.
        b"0" if value == 0 && spec.precision == Precision::Fixed(0) => b"0",
        _ if value == 0 => b"",
        p => p,
    };
    emit_integer(value, None, prefix, spec, out);
}

fn emit_integer(
    magnitude: u64,
    sign: Option<u8>,
    prefix: &[u8],
    spec: &FormatSpec,
    out: &mut dyn Sink,
) {
    let (base, uppercase) = int_base(spec.conversion);
    let mut digits = [0u8; 64];
    let digit_count = render_digits(magnitude, base, uppercase, &mut digits);
    let digit_slice = &digits[64 - digit_count..];

    let precision = match spec.precision {
        Precision::Fixed(p) => p,
        _ => 1,
    };
    // Precision 0 with value 0 produces no digits.
    let suppress_zero = magnitude == 0 && matches!(spec.precision, Precision::Fixed(0));
    let shown_digits = if suppress_zero { 0 } else { digit_count };
    let mut zero_prefix = precision.saturating_sub(shown_digits);
    if suppress_zero {
        zero_prefix = 0;
    }
    // '#' on octal must leave at least one leading zero, which the
    // precision zeros may already provide.
    let prefix = if prefix == b"0" && zero_prefix > 0 {
        b"" as &[u8]
    } else {
        prefix
    };
    // An explicit precision disables the '0' flag for integers.
    let zero_pad = spec.flags.zero_pad && matches!(spec.precision, Precision::None);

    let content = usize::from(sign.is_some()) + prefix.len() + zero_prefix + shown_digits;
    let pad_total = resolve_width(spec).saturating_sub(content);

    if !spec.flags.left_justify && !zero_pad {
        out.fill(b' ', pad_total);
    }
    if let Some(s) = sign {
        out.put(&[s]);
    }
    out.put(prefix);
    if !spec.flags.left_justify && zero_pad {
        out.fill(b'0', pad_total);
    }
    out.fill(b'0', zero_prefix);
    if !suppress_zero {
        out.put(digit_slice);
    }
    if spec.flags.left_justify {
        out.fill(b' ', pad_total);
    }
}

// ---------------------------------------------------------------------------
// Floats
// ---------------------------------------------------------------------------

/// Render a floating-point value (`%f %F %e %E %g %G`).
pub fn format_float(value: f64, spec: &FormatSpec, out: &mut dyn Sink) {
    let value = float::working_value(value);
    let upper = spec.conversion.is_ascii_uppercase();
    let negative = value.is_sign_negative();
    let sign = if negative {
        Some(b'-')
    } else {
        plus_sign(spec)
    };

    if !value.is_finite() {
        let body: &[u8] = match (value.is_nan(), upper) {
            (true, false) => b"nan",
            (true, true) => b"NAN",
            (false, false) => b"inf",
            (false, true) => b"INF",
        };
        // NaN carries no sign of its own in C output unless requested.
        let sign = if value.is_nan() { plus_sign(spec) } else { sign };
        let content = usize::from(sign.is_some()) + body.len();
        let pad_total = resolve_width(spec).saturating_sub(content);
        if !spec.flags.left_justify {
            out.fill(b' ', pad_total);
        }
        if let Some(s) = sign {
            out.put(&[s]);
        }
        out.put(body);
        if spec.flags.left_justify {
            out.fill(b' ', pad_total);
        }
        return;
    }

    let precision = match spec.precision {
        Precision::Fixed(p) => p,
        _ => 6,
    };
    let mut text = FloatText::new();
    float::render_body(value.abs(), spec.conversion, precision, spec.flags.alt_form, &mut text);
    let body = text.as_bytes();

    let content = usize::from(sign.is_some()) + body.len();
    let pad_total = resolve_width(spec).saturating_sub(content);

    if !spec.flags.left_justify && !spec.flags.zero_pad {
        out.fill(b' ', pad_total);
    }
    if let Some(s) = sign {
        out.put(&[s]);
    }
    if !spec.flags.left_justify && spec.flags.zero_pad {
        out.fill(b'0', pad_total);
    }
    out.put(body);
    if spec.flags.left_justify {
        out.fill(b' ', pad_total);
    }
}

// ---------------------------------------------------------------------------
// Text and pointers
// ---------------------------------------------------------------------------

/// Render a string (`%s`). Precision limits bytes but never splits a
/// character.
pub fn format_str(s: &str, spec: &FormatSpec, out: &mut dyn Sink) {
    let mut take = match spec.precision {
        Precision::Fixed(p) => p.min(s.len()),
        _ => s.len(),
    };
    while !s.is_char_boundary(take) {
        take -= 1;
    }
    emit_padded(&s.as_bytes()[..take], spec, out);
}

/// Render a character (`%c`) as UTF-8.
pub fn format_char(c: char, spec: &FormatSpec, out: &mut dyn Sink) {
    let mut utf8 = [0u8; 4];
    emit_padded(c.encode_utf8(&mut utf8).as_bytes(), spec, out);
}

/// Render a pointer (`%p`) as `0x...` hex, or `(nil)` for null.
pub fn format_pointer(addr: usize, spec: &FormatSpec, out: &mut dyn Sink) {
    if addr == 0 {
        emit_padded(b"(nil)", spec, out);
        return;
    }
    let mut digits = [0u8; 64];
    let count = render_digits(addr as u64, 16, false, &mut digits);
    let pad_total = resolve_width(spec).saturating_sub(2 + count);
    if !spec.flags.left_justify {
        out.fill(b' ', pad_total);
    }
    out.put(b"0x");
    out.put(&digits[64 - count..]);
    if spec.flags.left_justify {
        out.fill(b' ', pad_total);
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn emit_padded(body: &[u8], spec: &FormatSpec, out: &mut dyn Sink) {
    let pad_total = resolve_width(spec).saturating_sub(body.len());
    if !spec.flags.left_justify {
        out.fill(b' ', pad_total);
    }
    out.put(body);
    if spec.flags.left_justify {
        out.fill(b' ', pad_total);
    }
}

fn plus_sign(spec: &FormatSpec) -> Option<u8> {
    if spec.flags.force_sign {
        Some(b'+')
    } else if spec.flags.space_sign {
        Some(b' ')
    } else {
        None
    }
}

fn resolve_width(spec: &FormatSpec) -> usize {
    match spec.width {
        Width::Fixed(w) => w,
        _ => 0,
    }
}

fn int_base(conversion: u8) -> (u64, bool) {
    match conversion {
        b'o' => (8, false),
        b'x' => (16, false),
        b'X' => (16, true),
        _ => (10, false),
    }
}

/// Render `value` in `base` right-aligned into `buf`; returns the digit count.
fn render_digits(mut value: u64, base: u64, uppercase: bool, buf: &mut [u8; 64]) -> usize {
    if value == 0 {
        buf[63] = b'0';
        return 1;
    }
    let alpha = if uppercase { b'A' } else { b'a' };
    let mut pos = 64;
    while value > 0 {
        pos -= 1;
        let digit = (value % base) as u8;
        buf[pos] = if digit < 10 {
            b'0' + digit
        } else {
            alpha + (digit - 10)
        };
        value /= base;
    }
    64 - pos
}

fn alt_prefix(spec: &FormatSpec) -> &'static [u8] {
    if !spec.flags.alt_form {
        return b"";
    }
    match spec.conversion {
        b'o' => b"0",
        b'x' => b"0x",
        b'X' => b"0X",
        _ => b"",
    }
}
