//! Per-thread capture of emitted log lines, for tests.
//!
//! Lines land in a fixed per-thread byte ring so that recording never
//! allocates; the sink may run inside the allocator. When the ring is full
//! the oldest lines are dropped.

use std::cell::RefCell;

/// Bytes of captured text kept per thread.
pub const CAPTURE_BYTES: usize = 16 * 1024;

struct Capture {
    active: bool,
    len: usize,
    buf: [u8; CAPTURE_BYTES],
}

impl Capture {
    fn push(&mut self, line: &[u8]) {
        let body = line.strip_suffix(b"\n").unwrap_or(line);
        let body = &body[..body.len().min(CAPTURE_BYTES - 1)];
        let needed = body.len() + 1;
        if self.len + needed > CAPTURE_BYTES {
            let excess = self.len + needed - CAPTURE_BYTES;
            // First line boundary at or past `excess`.
            let cut = self.buf[excess - 1..self.len]
                .iter()
                .position(|&b| b == b'\n')
                .map_or(self.len, |p| excess + p);
            self.buf.copy_within(cut..self.len, 0);
            self.len -= cut;
        }
        self.buf[self.len..self.len + body.len()].copy_from_slice(body);
        self.len += body.len();
        self.buf[self.len] = b'\n';
        self.len += 1;
    }
}

thread_local! {
    static CAPTURED: RefCell<Capture> = const {
        RefCell::new(Capture {
            active: false,
            len: 0,
            buf: [0; CAPTURE_BYTES],
        })
    };
}

/// Start collecting lines logged by the calling thread.
pub fn start() {
    CAPTURED.with(|c| {
        let mut cap = c.borrow_mut();
        cap.active = true;
        cap.len = 0;
    });
}

/// Stop collecting and return the lines (newline stripped).
pub fn take() -> Vec<String> {
    CAPTURED.with(|c| {
        let mut cap = c.borrow_mut();
        let lines = match cap.buf[..cap.len].strip_suffix(b"\n") {
            Some(text) if cap.active => text
                .split(|&b| b == b'\n')
                .map(|l| String::from_utf8_lossy(l).into_owned())
                .collect(),
            _ => Vec::new(),
        };
        cap.active = false;
        cap.len = 0;
        lines
    })
}

pub(crate) fn record(line: &[u8]) {
    // `try_with`: logging can happen while thread-locals are torn down.
    let _ = CAPTURED.try_with(|c| {
        if let Ok(mut cap) = c.try_borrow_mut() {
            if cap.active {
                cap.push(line);
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lines_come_back_in_order() {
        start();
        record(b"one\n");
        record(b"two");
        record(b"\n");
        assert_eq!(take(), ["one", "two", ""]);
        assert!(take().is_empty());
    }

    #[test]
    fn nothing_is_kept_while_inactive() {
        record(b"ignored\n");
        start();
        assert!(take().is_empty());
    }

    #[test]
    fn full_ring_drops_oldest_lines() {
        start();
        let line = [b'x'; 1000];
        for _ in 0..40 {
            record(&line);
        }
        record(b"last\n");
        let lines = take();
        assert_eq!(lines.last().map(String::as_str), Some("last"));
        assert!(lines.len() < 41);
        assert!(lines[..lines.len() - 1].iter().all(|l| l.len() == 1000));
    }

    #[test]
    fn oversized_line_is_truncated() {
        start();
        record(&vec![b'y'; CAPTURE_BYTES * 2]);
        let lines = take();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].len(), CAPTURE_BYTES - 1);
    }
}
