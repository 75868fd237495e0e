//! Format-string parser.
//!
//! Parses the portable printf subset: flags `- + space # 0`, width or `*`,
//! precision or `.*`, length modifiers `hh h l ll z t j L`, conversions
//! `d i u x X o c s f F e E g G p %`. Malformed directives are emitted
//! literally. Parsing never allocates; segments are produced lazily.

// ---------------------------------------------------------------------------
// Directive types
// ---------------------------------------------------------------------------

/// Flags parsed from a format directive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FormatFlags {
    pub left_justify: bool, // '-'
    pub force_sign: bool,   // '+'
    pub space_sign: bool,   // ' '
    pub alt_form: bool,     // '#'
    pub zero_pad: bool,     // '0'
}

/// Width specification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Width {
    None,
    Fixed(usize),
    FromArg, // '*'
}

/// Precision specification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precision {
    None,
    Fixed(usize),
    FromArg, // '.*'
}

/// Length modifier. Argument width is carried by [`super::Arg`]; only
/// `hh` and `h` change rendering (they narrow integers like C does).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LengthMod {
    None,
    Hh,   // 'hh'
    H,    // 'h'
    L,    // 'l'
    Ll,   // 'll'
    Z,    // 'z'
    T,    // 't'
    J,    // 'j'
    BigL, // 'L'
}

/// A parsed format directive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatSpec {
    pub flags: FormatFlags,
    pub width: Width,
    pub precision: Precision,
    pub length: LengthMod,
    pub conversion: u8,
}

/// A piece of a parsed format string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment<'a> {
    /// Literal text emitted verbatim.
    Literal(&'a str),
    /// A `%%` escape.
    Percent,
    /// A conversion directive; `raw` is its source text including `%`.
    Directive { spec: FormatSpec, raw: &'a str },
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

/// Parse a single directive starting just after the `%`.
///
/// Returns the directive and the number of bytes consumed from `fmt`, or
/// `None` when malformed.
#[must_use]
pub fn parse_format_spec(fmt: &[u8]) -> Option<(FormatSpec, usize)> {
    let mut pos = 0;
    let len = fmt.len();

    let mut flags = FormatFlags::default();
    while pos < len {
        match fmt[pos] {
            b'-' => flags.left_justify = true,
            b'+' => flags.force_sign = true,
            b' ' => flags.space_sign = true,
            b'#' => flags.alt_form = true,
            b'0' => flags.zero_pad = true,
            _ => break,
        }
        pos += 1;
    }
    // '+' overrides ' '; '-' overrides '0'.
    if flags.force_sign {
        flags.space_sign = false;
    }
    if flags.left_justify {
        flags.zero_pad = false;
    }

    let width = if pos < len && fmt[pos] == b'*' {
        pos += 1;
        Width::FromArg
    } else {
        let start = pos;
        while pos < len && fmt[pos].is_ascii_digit() {
            pos += 1;
        }
        if pos > start {
            Width::Fixed(parse_decimal(&fmt[start..pos]))
        } else {
            Width::None
        }
    };

    let precision = if pos < len && fmt[pos] == b'.' {
        pos += 1;
        if pos < len && fmt[pos] == b'*' {
            pos += 1;
            Precision::FromArg
        } else {
            let start = pos;
            while pos < len && fmt[pos].is_ascii_digit() {
                pos += 1;
            }
            Precision::Fixed(parse_decimal(&fmt[start..pos]))
        }
    } else {
        Precision::None
    };

    let (length, used) = parse_length(&fmt[pos..]);
    pos += used;

    let &conversion = fmt.get(pos)?;
    pos += 1;
    match conversion {
        b'd' | b'i' | b'u' | b'x' | b'X' | b'o' | b'c' | b's' | b'p' | b'f' | b'F' | b'e'
        | b'E' | b'g' | b'G' => {}
        _ => return None,
    }

    Some((
        FormatSpec {
            flags,
            width,
            precision,
            length,
            conversion,
        },
        pos,
    ))
}

fn parse_length(fmt: &[u8]) -> (LengthMod, usize) {
    match fmt {
        [b'h', b'h', ..] => (LengthMod::Hh, 2),
        [b'h', ..] => (LengthMod::H, 1),
        [b'l', b'l', ..] => (LengthMod::Ll, 2),
        [b'l', ..] => (LengthMod::L, 1),
        [b'z', ..] => (LengthMod::Z, 1),
        [b't', ..] => (LengthMod::T, 1),
        [b'j', ..] => (LengthMod::J, 1),
        [b'L', ..] => (LengthMod::BigL, 1),
        _ => (LengthMod::None, 0),
    }
}

fn parse_decimal(digits: &[u8]) -> usize {
    digits.iter().fold(0_usize, |acc, &d| {
        acc.saturating_mul(10).saturating_add(usize::from(d - b'0'))
    })
}

/// Lazily split a format string into [`Segment`]s.
#[must_use]
pub fn segments(fmt: &str) -> Segments<'_> {
    Segments { fmt, pos: 0 }
}

/// Iterator returned by [`segments`].
#[derive(Debug, Clone)]
pub struct Segments<'a> {
    fmt: &'a str,
    pos: usize,
}

impl<'a> Iterator for Segments<'a> {
    type Item = Segment<'a>;

    fn next(&mut self) -> Option<Segment<'a>> {
        let bytes = self.fmt.as_bytes();
        let len = bytes.len();
        let start = self.pos;
        if start >= len {
            return None;
        }
        if bytes[start] != b'%' {
            let end = bytes[start..]
                .iter()
                .position(|&b| b == b'%')
                .map_or(len, |off| start + off);
            self.pos = end;
            // '%' is ASCII, so both ends are char boundaries.
            return Some(Segment::Literal(&self.fmt[start..end]));
        }
        let after = start + 1;
        if after >= len {
            self.pos = len;
            return Some(Segment::Literal(&self.fmt[start..]));
        }
        if bytes[after] == b'%' {
            self.pos = after + 1;
            return Some(Segment::Percent);
        }
        match parse_format_spec(&bytes[after..]) {
            Some((spec, consumed)) => {
                self.pos = after + consumed;
                Some(Segment::Directive {
                    spec,
                    raw: &self.fmt[start..self.pos],
                })
            }
            None => {
                // Malformed: the '%' is literal, the rest is rescanned.
                self.pos = after;
                Some(Segment::Literal(&self.fmt[start..after]))
            }
        }
    }
}
