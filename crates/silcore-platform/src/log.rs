//! Single-line host log sink.
//!
//! Writes go straight to file descriptor 2 with `write(2)`; nothing here
//! allocates, so the sink stays usable while the allocator is failing or
//! while its own lock is held.

use parking_lot::Mutex;

static STDERR_LOCK: Mutex<()> = Mutex::new(());

/// Write `bytes` to the host log in one piece. Returns `false` on error.
///
/// Concurrent callers never interleave within a single call.
pub fn log_write(bytes: &[u8]) -> bool {
    let _guard = STDERR_LOCK.lock();
    let mut rest = bytes;
    while !rest.is_empty() {
        // SAFETY: `rest` is a valid readable slice for its full length.
        let rc = unsafe { libc::write(libc::STDERR_FILENO, rest.as_ptr().cast(), rest.len()) };
        if rc < 0 {
            if std::io::Error::last_os_error().kind() == std::io::ErrorKind::Interrupted {
                continue;
            }
            return false;
        }
        if rc == 0 {
            return false;
        }
        rest = &rest[rc as usize..];
    }
    true
}
