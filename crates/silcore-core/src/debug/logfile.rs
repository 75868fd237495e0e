//! Optional log-file tee.
//!
//! A platform layer that intends to open a log file calls
//! [`log_file_configure`] early. Lines logged before the file opens are
//! kept in a fixed pending buffer; [`log_file_open`] flushes them in order
//! and appends a lost-messages marker iff the buffer overflowed.

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

/// Capacity of the pre-open pending buffer.
pub const LOG_PENDING_SIZE: usize = 16 * 1024;

const LOST_MARKER: &[u8] = b"[... messages lost ...]\n";

enum TeeState {
    Off,
    Pending,
    Open(Box<dyn Write + Send>),
}

struct Tee {
    state: TeeState,
    pending: [u8; LOG_PENDING_SIZE],
    pending_len: usize,
    lost: bool,
}

static TEE: Mutex<Tee> = Mutex::new(Tee {
    state: TeeState::Off,
    pending: [0; LOG_PENDING_SIZE],
    pending_len: 0,
    lost: false,
});

// Skips the lock entirely while no file is configured.
static TEE_ACTIVE: AtomicBool = AtomicBool::new(false);

/// Announce that a log file will be opened; start buffering lines.
pub fn log_file_configure() {
    let mut tee = TEE.lock();
    if matches!(tee.state, TeeState::Off) {
        tee.state = TeeState::Pending;
        tee.pending_len = 0;
        tee.lost = false;
    }
    TEE_ACTIVE.store(true, Ordering::Release);
}

/// Attach the log file, flushing any pending lines first.
///
/// On a write error the file is not attached and pending lines are kept.
pub fn log_file_open(mut file: Box<dyn Write + Send>) -> std::io::Result<()> {
    let mut tee = TEE.lock();
    if matches!(tee.state, TeeState::Pending) {
        let len = tee.pending_len;
        file.write_all(&tee.pending[..len])?;
        if tee.lost {
            file.write_all(LOST_MARKER)?;
        }
        file.flush()?;
    }
    tee.pending_len = 0;
    tee.lost = false;
    tee.state = TeeState::Open(file);
    TEE_ACTIVE.store(true, Ordering::Release);
    Ok(())
}

/// Detach and flush the log file. Buffering stops as well.
pub fn log_file_close() -> std::io::Result<()> {
    let mut tee = TEE.lock();
    let previous = std::mem::replace(&mut tee.state, TeeState::Off);
    tee.pending_len = 0;
    tee.lost = false;
    TEE_ACTIVE.store(false, Ordering::Release);
    drop(tee);
    match previous {
        TeeState::Open(mut file) => file.flush(),
        TeeState::Off | TeeState::Pending => Ok(()),
    }
}

/// True while lines are being buffered or written to a file.
#[must_use]
pub fn log_file_active() -> bool {
    TEE_ACTIVE.load(Ordering::Acquire)
}

pub(crate) fn tee(line: &[u8]) {
    if !TEE_ACTIVE.load(Ordering::Acquire) {
        return;
    }
    let mut guard = TEE.lock();
    let tee = &mut *guard;
    match &mut tee.state {
        TeeState::Off => {}
        TeeState::Pending => {
            let start = tee.pending_len;
            if start + line.len() <= LOG_PENDING_SIZE {
                tee.pending[start..start + line.len()].copy_from_slice(line);
                tee.pending_len += line.len();
            } else {
                tee.lost = true;
            }
        }
        TeeState::Open(file) => {
            // A failing log file cannot be reported through itself.
            let _ = file.write_all(line);
        }
    }
}
