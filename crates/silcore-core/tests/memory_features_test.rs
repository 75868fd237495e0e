//! Optional allocator build features. Each test runs only in builds that
//! enable its feature, e.g. `cargo test --features memory-debug-fill`.

#![cfg(all(
    feature = "include-tests",
    any(
        feature = "memory-debug-fill",
        feature = "memory-check-pointers",
        feature = "memory-log-allocs"
    )
))]

use silcore_core::memory::{self, MemFlags};

// The byte counters are process-wide.
static SERIAL: parking_lot::Mutex<()> = parking_lot::Mutex::new(());

#[cfg(feature = "memory-debug-fill")]
#[test]
fn fresh_bytes_are_filled_unless_cleared() {
    let _serial = SERIAL.lock();
    let p = memory::alloc(64, 0, MemFlags::empty()).expect("alloc");
    // SAFETY: 64-byte live block.
    assert!((0..64).all(|i| unsafe { *p.as_ptr().add(i) } == 0xBB));

    // SAFETY: live block, replaced by the result.
    let q = unsafe { memory::realloc(Some(p), 256, MemFlags::empty()) }.expect("grow");
    // SAFETY: 256-byte live block; the first 64 bytes were carried over.
    assert!((0..256).all(|i| unsafe { *q.as_ptr().add(i) } == 0xBB));

    let z = memory::alloc(64, 0, MemFlags::CLEAR).expect("alloc clear");
    // SAFETY: 64-byte live block.
    assert!((0..64).all(|i| unsafe { *z.as_ptr().add(i) } == 0));

    // SAFETY: live blocks.
    unsafe {
        memory::free(Some(q));
        memory::free(Some(z));
    }
}

#[cfg(feature = "memory-check-pointers")]
#[test]
fn foreign_pointers_are_rejected() {
    let _serial = SERIAL.lock();
    let p = memory::alloc(128, 0, MemFlags::empty()).expect("alloc");
    let before = memory::debug_bytes_allocated();
    // SAFETY: in bounds of the live block.
    let inner = unsafe { std::ptr::NonNull::new_unchecked(p.as_ptr().add(16)) };
    let mut stack_byte = 0u8;
    let foreign = std::ptr::NonNull::from(&mut stack_byte);

    silcore_core::debug::capture::start();
    // SAFETY: neither pointer is a block start, so both are rejected before
    // anything is read through them.
    unsafe {
        memory::free(Some(inner));
        memory::free(Some(foreign));
        assert!(memory::realloc(Some(inner), 512, MemFlags::empty()).is_none());
    }
    let lines = silcore_core::debug::capture::take();

    assert_eq!(
        lines.iter().filter(|l| l.contains("pointer is not a live allocation")).count(),
        3
    );
    assert_eq!(memory::debug_bytes_allocated(), before);
    // SAFETY: 128-byte live block, untouched by the rejected calls.
    assert_eq!(unsafe { memory::block_size(p) }, 128);
    // SAFETY: live block.
    unsafe { memory::free(Some(p)) };
    assert_eq!(memory::debug_bytes_allocated(), before - 128);
}

#[cfg(feature = "memory-log-allocs")]
#[test]
fn every_alloc_and_free_is_logged() {
    let _serial = SERIAL.lock();
    silcore_core::debug::capture::start();
    let p = memory::alloc(40, 16, MemFlags::empty()).expect("alloc");
    // SAFETY: live block.
    unsafe { memory::free(Some(p)) };
    let lines = silcore_core::debug::capture::take();

    let alloc_line = lines
        .iter()
        .position(|l| l.contains("alloc 0x") && l.contains("size 40 align 16"))
        .expect("alloc logged");
    let free_line = lines
        .iter()
        .position(|l| l.contains("free 0x") && l.contains("size 40"))
        .expect("free logged");
    assert!(alloc_line < free_line);
}
