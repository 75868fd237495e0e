//! Floating-point digit generation for `%f`, `%e` and `%g`.
//!
//! Digits come from `core::fmt` (correctly rounded, shortest-exact) written
//! into a stack buffer, then reshaped into C conventions: signed two-digit
//! minimum exponents, `%g` trailing-zero removal, and `#` forcing a
//! decimal point. With the `float-single` feature values are rounded to
//! `f32` first, so every digit reflects single precision.

use core::fmt::Write;

/// Largest precision honoured; larger requests are clamped.
pub const MAX_FLOAT_PRECISION: usize = 400;

// 309 integer digits + '.' + MAX_FLOAT_PRECISION, with slack.
const FLOAT_TEXT_CAP: usize = 768;

/// Fixed-capacity text buffer for one rendered float body (no sign).
pub(crate) struct FloatText {
    buf: [u8; FLOAT_TEXT_CAP],
    len: usize,
}

impl FloatText {
    pub(crate) const fn new() -> Self {
        Self {
            buf: [0; FLOAT_TEXT_CAP],
            len: 0,
        }
    }

    pub(crate) fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    fn clear(&mut self) {
        self.len = 0;
    }

    fn push(&mut self, byte: u8) {
        if self.len < FLOAT_TEXT_CAP {
            self.buf[self.len] = byte;
            self.len += 1;
        }
    }

    fn truncate(&mut self, len: usize) {
        self.len = self.len.min(len);
    }

    fn position(&self, byte: u8) -> Option<usize> {
        self.as_bytes().iter().position(|&b| b == byte)
    }
}

impl Write for FloatText {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        let bytes = s.as_bytes();
        if self.len + bytes.len() > FLOAT_TEXT_CAP {
            return Err(core::fmt::Error);
        }
        self.buf[self.len..self.len + bytes.len()].copy_from_slice(bytes);
        self.len += bytes.len();
        Ok(())
    }
}

/// Apply the compiled float precision mode.
#[inline]
pub(crate) fn working_value(value: f64) -> f64 {
    #[cfg(feature = "float-single")]
    {
        value as f32 as f64
    }
    #[cfg(not(feature = "float-single"))]
    {
        value
    }
}

/// Render the body of `abs` (finite, non-negative) for conversion `conv`.
pub(crate) fn render_body(abs: f64, conv: u8, precision: usize, alt: bool, out: &mut FloatText) {
    let precision = precision.min(MAX_FLOAT_PRECISION);
    let upper = conv.is_ascii_uppercase();
    match conv | 0x20 {
        b'e' => render_exp(abs, precision, upper, alt, out),
        b'g' => render_general(abs, precision, upper, alt, out),
        _ => render_fixed(abs, precision, alt, out),
    }
}

fn render_fixed(abs: f64, precision: usize, alt: bool, out: &mut FloatText) {
    out.clear();
    // Capacity covers f64::MAX at MAX_FLOAT_PRECISION.
    let _ = write!(out, "{abs:.precision$}");
    if alt && precision == 0 {
        out.push(b'.');
    }
}

fn render_exp(abs: f64, precision: usize, upper: bool, alt: bool, out: &mut FloatText) {
    out.clear();
    let _ = write!(out, "{abs:.precision$e}");
    let Some(e_pos) = out.position(b'e') else {
        return;
    };
    let exponent = parse_exponent(&out.as_bytes()[e_pos + 1..]);
    out.truncate(e_pos);
    if alt && precision == 0 {
        out.push(b'.');
    }
    push_exponent(out, exponent, upper);
}

fn render_general(abs: f64, precision: usize, upper: bool, alt: bool, out: &mut FloatText) {
    let p = precision.max(1);
    // The exponent after rounding to `p` significant digits picks the style.
    let exponent = if abs == 0.0 {
        0
    } else {
        out.clear();
        let _ = write!(out, "{abs:.prec$e}", prec = p - 1);
        out.position(b'e')
            .map_or(0, |e| parse_exponent(&out.as_bytes()[e + 1..]))
    };
    let p_i = i32::try_from(p).unwrap_or(i32::MAX);
    if exponent >= -4 && exponent < p_i {
        let frac = usize::try_from(p_i - 1 - exponent).unwrap_or(0);
        render_fixed(abs, frac, alt, out);
        if alt && frac == 0 && out.position(b'.').is_none() {
            out.push(b'.');
        }
        if !alt {
            let end = out.len;
            strip_fraction_zeros(out, end);
        }
    } else {
        render_exp(abs, p - 1, upper, alt, out);
        if !alt {
            let e_pos = out.position(if upper { b'E' } else { b'e' }).unwrap_or(out.len);
            strip_fraction_zeros(out, e_pos);
        }
    }
}

/// Remove trailing zeros (and a bare '.') from the fraction ending at `end`,
/// shifting any suffix (the exponent) left.
fn strip_fraction_zeros(out: &mut FloatText, end: usize) {
    let Some(dot) = out.as_bytes()[..end].iter().position(|&b| b == b'.') else {
        return;
    };
    let mut cut = end;
    while cut > dot + 1 && out.buf[cut - 1] == b'0' {
        cut -= 1;
    }
    if cut == dot + 1 {
        cut = dot;
    }
    let suffix_len = out.len - end;
    out.buf.copy_within(end..out.len, cut);
    out.len = cut + suffix_len;
}

fn parse_exponent(digits: &[u8]) -> i32 {
    let (negative, digits) = match digits.split_first() {
        Some((b'-', rest)) => (true, rest),
        _ => (false, digits),
    };
    let magnitude = digits
        .iter()
        .take_while(|b| b.is_ascii_digit())
        .fold(0_i32, |acc, &d| acc.saturating_mul(10).saturating_add(i32::from(d - b'0')));
    if negative { -magnitude } else { magnitude }
}

fn push_exponent(out: &mut FloatText, exponent: i32, upper: bool) {
    out.push(if upper { b'E' } else { b'e' });
    out.push(if exponent < 0 { b'-' } else { b'+' });
    let mut digits = [0u8; 10];
    let mut n = exponent.unsigned_abs();
    let mut count = 0;
    while n > 0 || count < 2 {
        digits[count] = b'0' + (n % 10) as u8;
        n /= 10;
        count += 1;
    }
    for &d in digits[..count].iter().rev() {
        out.push(d);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(value: f64, conv: u8, precision: usize, alt: bool) -> String {
        let mut out = FloatText::new();
        render_body(value, conv, precision, alt, &mut out);
        String::from_utf8(out.as_bytes().to_vec()).unwrap()
    }

    #[test]
    fn fixed_rounds_to_precision() {
        assert_eq!(body(3.14159, b'f', 2, false), "3.14");
        assert_eq!(body(2.4, b'f', 0, false), "2");
        assert_eq!(body(2.0, b'f', 0, true), "2.");
        assert_eq!(body(0.0, b'f', 6, false), "0.000000");
    }

    #[test]
    fn exp_uses_c_exponent_form() {
        assert_eq!(body(12345.678, b'e', 3, false), "1.235e+04");
        assert_eq!(body(0.00012, b'E', 1, false), "1.2E-04");
        assert_eq!(body(0.0, b'e', 2, false), "0.00e+00");
        assert_eq!(body(1e300, b'e', 0, false), "1e+300");
    }

    #[test]
    fn general_picks_style_and_strips_zeros() {
        assert_eq!(body(100.0, b'g', 6, false), "100");
        assert_eq!(body(0.0001, b'g', 6, false), "0.0001");
        assert_eq!(body(0.00001, b'g', 6, false), "1e-05");
        assert_eq!(body(1234567.0, b'g', 6, false), "1.23457e+06");
        assert_eq!(body(1.6, b'G', 0, false), "2");
        assert_eq!(body(0.0, b'g', 6, false), "0");
        assert_eq!(body(1.0, b'g', 3, true), "1.00");
    }

    #[test]
    fn precision_is_clamped() {
        let s = body(1.0, b'f', 10_000, false);
        assert_eq!(s.len(), 2 + MAX_FLOAT_PRECISION);
    }

    #[test]
    fn huge_values_fit_buffer() {
        let s = body(f64::MAX, b'f', MAX_FLOAT_PRECISION, false);
        assert!(s.starts_with("1797693134862315"));
        assert_eq!(s.len(), 309 + 1 + MAX_FLOAT_PRECISION);
    }
}
