//! Log-file tee behaviour. The tee is process-wide, so every test holds
//! `SERIAL` and closes the tee before releasing it.

use std::io::{self, Write};
use std::sync::Arc;

use silcore_core::debug::{LOG_PENDING_SIZE, log_file_close, log_file_configure, log_file_open};
use silcore_core::dlog;

static SERIAL: parking_lot::Mutex<()> = parking_lot::Mutex::new(());

/// In-memory log file shared with the test body.
#[derive(Clone, Default)]
struct SharedFile(Arc<parking_lot::Mutex<Vec<u8>>>);

impl SharedFile {
    fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.lock()).into_owned()
    }
}

impl Write for SharedFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Refuses every write.
struct BrokenFile;

impl Write for BrokenFile {
    fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
        Err(io::Error::other("disk gone"))
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

struct CloseOnDrop;

impl Drop for CloseOnDrop {
    fn drop(&mut self) {
        let _ = log_file_close();
    }
}

#[test]
fn pending_lines_flush_in_order_on_open() {
    let _serial = SERIAL.lock();
    let _close = CloseOnDrop;
    dlog!("before configure");
    log_file_configure();
    dlog!("pending %d", 1);
    dlog!("pending %d", 2);
    let file = SharedFile::default();
    log_file_open(Box::new(file.clone())).unwrap();
    dlog!("after open");
    log_file_close().unwrap();
    dlog!("after close");

    let text = file.text();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 3, "{text}");
    assert!(lines[0].ends_with("pending 1"));
    assert!(lines[1].ends_with("pending 2"));
    assert!(lines[2].ends_with("after open"));
    assert!(lines[0].contains("log_file_test.rs:"));
    assert!(!text.contains("lost"));
}

#[test]
fn overflow_appends_lost_marker_once() {
    let _serial = SERIAL.lock();
    let _close = CloseOnDrop;
    log_file_configure();
    let filler = "x".repeat(200);
    let mut logged = 0;
    while logged * 200 < LOG_PENDING_SIZE * 2 {
        dlog!("%d %s", logged, filler.as_str());
        logged += 1;
    }
    let file = SharedFile::default();
    log_file_open(Box::new(file.clone())).unwrap();

    let text = file.text();
    assert!(text.len() <= LOG_PENDING_SIZE + 64);
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.last().copied(), Some("[... messages lost ...]"));
    assert_eq!(text.matches("messages lost").count(), 1);
    // Kept lines are the oldest ones, intact and in order.
    assert!(lines[0].contains(": 0 x"));
    assert!(lines[1].contains(": 1 x"));
    assert!(lines[..lines.len() - 1].iter().all(|l| l.ends_with(&filler)));
}

#[test]
fn open_without_configure_starts_fresh() {
    let _serial = SERIAL.lock();
    let _close = CloseOnDrop;
    dlog!("never buffered");
    let file = SharedFile::default();
    log_file_open(Box::new(file.clone())).unwrap();
    dlog!("direct");
    let text = file.text();
    assert!(!text.contains("never buffered"));
    assert!(text.trim_end().ends_with("direct"));
}

#[test]
fn failed_open_keeps_pending_lines() {
    let _serial = SERIAL.lock();
    let _close = CloseOnDrop;
    log_file_configure();
    dlog!("survives a failed open");
    assert!(log_file_open(Box::new(BrokenFile)).is_err());
    let file = SharedFile::default();
    log_file_open(Box::new(file.clone())).unwrap();
    assert!(file.text().contains("survives a failed open"));
}
