//! Output sinks for the formatter.
//!
//! Renderers write through [`Sink`], so the same code produces a length
//! count, a bounded NUL-terminated buffer, or a growable C4 string.

/// Byte destination for rendered output.
pub trait Sink {
    fn put(&mut self, bytes: &[u8]);

    fn fill(&mut self, byte: u8, count: usize) {
        let chunk = [byte; 32];
        let mut left = count;
        while left > 0 {
            let n = left.min(chunk.len());
            self.put(&chunk[..n]);
            left -= n;
        }
    }
}

/// Counts bytes without storing them.
#[derive(Debug, Default, Clone, Copy)]
pub struct Counter {
    pub len: usize,
}

impl Sink for Counter {
    fn put(&mut self, bytes: &[u8]) {
        self.len += bytes.len();
    }

    fn fill(&mut self, _byte: u8, count: usize) {
        self.len += count;
    }
}

/// Writes into a fixed buffer, keeping room for a NUL terminator.
///
/// Bytes past the limit are counted but dropped. [`Bounded::finish`] backs
/// the cut up to a UTF-8 boundary and terminates the buffer.
#[derive(Debug)]
pub struct Bounded<'a> {
    buf: &'a mut [u8],
    stored: usize,
    total: usize,
    first_dropped: Option<u8>,
}

impl<'a> Bounded<'a> {
    #[must_use]
    pub fn new(buf: &'a mut [u8]) -> Self {
        Self {
            buf,
            stored: 0,
            total: 0,
            first_dropped: None,
        }
    }

    fn limit(&self) -> usize {
        self.buf.len().saturating_sub(1)
    }

    /// Terminate the buffer. Returns `(bytes_kept, full_length)`.
    pub fn finish(self) -> (usize, usize) {
        let mut end = self.stored;
        if self.first_dropped.is_some_and(is_continuation) {
            // The cut fell inside a multi-byte sequence: drop its head too.
            while end > 0 {
                end -= 1;
                if !is_continuation(self.buf[end]) {
                    break;
                }
            }
        }
        if let Some(slot) = self.buf.get_mut(end) {
            *slot = 0;
        }
        (end, self.total)
    }
}

impl Sink for Bounded<'_> {
    fn put(&mut self, bytes: &[u8]) {
        let room = self.limit() - self.stored;
        let take = room.min(bytes.len());
        self.buf[self.stored..self.stored + take].copy_from_slice(&bytes[..take]);
        self.stored += take;
        if take < bytes.len() && self.first_dropped.is_none() {
            self.first_dropped = Some(bytes[take]);
        }
        self.total += bytes.len();
    }
}

#[inline]
const fn is_continuation(byte: u8) -> bool {
    byte & 0xC0 == 0x80
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counter_counts_fill_and_put() {
        let mut c = Counter::default();
        c.put(b"abc");
        c.fill(b' ', 100);
        assert_eq!(c.len, 103);
    }

    #[test]
    fn bounded_truncates_and_terminates() {
        let mut buf = [0xFFu8; 4];
        let mut sink = Bounded::new(&mut buf);
        sink.put(b"hello");
        assert_eq!(sink.finish(), (3, 5));
        assert_eq!(&buf, b"hel\0");
    }

    #[test]
    fn bounded_never_splits_utf8() {
        // "aé" is 61 C3 A9; a limit of 2 bytes would split the 'é'.
        let mut buf = [0u8; 3];
        let mut sink = Bounded::new(&mut buf);
        sink.put("aé".as_bytes());
        assert_eq!(sink.finish(), (1, 3));
        assert_eq!(&buf[..2], b"a\0");
    }

    #[test]
    fn zero_capacity_stores_nothing() {
        let mut buf: [u8; 0] = [];
        let mut sink = Bounded::new(&mut buf);
        sink.put(b"xyz");
        sink.fill(b'0', 4);
        assert_eq!(sink.finish(), (0, 7));
    }
}
