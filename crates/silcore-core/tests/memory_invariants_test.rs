//! Allocator invariants. Every test holds `SERIAL`: the byte counters are
//! process-wide, so concurrent tests in this binary would skew them.

use std::ptr::NonNull;

use silcore_core::memory::{
    self, MemFlags, MemTag, debug_bytes_allocated, debug_get_map, debug_live_allocations,
};

static SERIAL: parking_lot::Mutex<()> = parking_lot::Mutex::new(());

#[derive(Clone, Copy, Debug)]
struct XorShift64 {
    state: u64,
}

impl XorShift64 {
    fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.state = x;
        x.wrapping_mul(0x2545_F491_4F6C_DD1D)
    }

    fn gen_range_usize(&mut self, low: usize, high_inclusive: usize) -> usize {
        let span = high_inclusive - low + 1;
        low + (self.next_u64() as usize % span)
    }
}

fn write_pattern(p: NonNull<u8>, len: usize, seed: u8) {
    for i in 0..len {
        // SAFETY: the block holds at least `len` bytes.
        unsafe { *p.as_ptr().add(i) = seed ^ (i as u8) };
    }
}

fn pattern_intact(p: NonNull<u8>, len: usize, seed: u8) -> bool {
    // SAFETY: the block holds at least `len` bytes.
    (0..len).all(|i| unsafe { *p.as_ptr().add(i) } == seed ^ (i as u8))
}

#[test]
fn strict_alignment_alloc_then_realloc() {
    let _serial = SERIAL.lock();
    let p = memory::alloc(1000, 64, MemFlags::empty()).expect("alloc");
    assert_eq!(p.as_ptr() as usize % 64, 0);
    #[cfg(feature = "debug")]
    assert_ne!(p.as_ptr() as usize % 128, 0);
    write_pattern(p, 1000, 0x5A);

    // SAFETY: `p` is live and replaced by the result.
    let q = unsafe { memory::realloc(Some(p), 2000, MemFlags::empty()) }.expect("realloc");
    assert_eq!(q.as_ptr() as usize % 64, 0);
    assert!(pattern_intact(q, 1000, 0x5A));
    // SAFETY: live block.
    unsafe { memory::free(Some(q)) };
}

#[test]
fn alloc_free_round_trip_balances_bytes() {
    let _serial = SERIAL.lock();
    let before = debug_bytes_allocated();
    let live_before = debug_live_allocations();
    let mut rng = XorShift64::new(0x5EED);
    for _ in 0..500 {
        let size = rng.gen_range_usize(1, 8192);
        let align = [0usize, 1, 8, 16, 64, 4096][rng.gen_range_usize(0, 5)];
        let p = memory::alloc(size, align, MemFlags::empty()).expect("alloc");
        #[cfg(feature = "debug")]
        assert_eq!(debug_bytes_allocated(), before + size);
        // SAFETY: live block.
        unsafe { memory::free(Some(p)) };
        assert_eq!(debug_bytes_allocated(), before);
    }
    assert_eq!(debug_live_allocations(), live_before);
}

#[test]
fn aligned_pointers_avoid_double_alignment() {
    let _serial = SERIAL.lock();
    let mut blocks = Vec::new();
    for shift in 0..13 {
        let align = 1usize << shift;
        let p = memory::alloc(24, align, MemFlags::empty()).expect("alloc");
        let addr = p.as_ptr() as usize;
        assert_eq!(addr % align, 0, "align={align}");
        #[cfg(feature = "debug")]
        assert_ne!(addr % (2 * align), 0, "align={align}");
        blocks.push(p);
    }
    for p in blocks {
        // SAFETY: live block.
        unsafe { memory::free(Some(p)) };
    }
}

#[test]
fn random_realloc_sequences_preserve_prefix() {
    let _serial = SERIAL.lock();
    let before = debug_bytes_allocated();
    for seed in [1u64, 2, 3, 4] {
        let mut rng = XorShift64::new(seed);
        let align = [0usize, 8, 32, 256][rng.gen_range_usize(0, 3)];
        let mut size = rng.gen_range_usize(1, 512);
        let mut p = memory::alloc(size, align, MemFlags::empty()).expect("alloc");
        write_pattern(p, size, seed as u8);
        for _ in 0..200 {
            let next = rng.gen_range_usize(1, 6000);
            // SAFETY: `p` is live and replaced by the result.
            p = unsafe { memory::realloc(Some(p), next, MemFlags::empty()) }.expect("realloc");
            if align != 0 {
                assert_eq!(p.as_ptr() as usize % align, 0);
            }
            assert!(pattern_intact(p, size.min(next), seed as u8));
            size = next;
            write_pattern(p, size, seed as u8);
        }
        // SAFETY: live block.
        unsafe { memory::free(Some(p)) };
    }
    assert_eq!(debug_bytes_allocated(), before);
}

#[test]
fn realloc_boundaries() {
    let _serial = SERIAL.lock();
    let before = debug_bytes_allocated();
    assert!(memory::alloc(0, 0, MemFlags::empty()).is_none());
    // SAFETY: `None` allocates like `alloc(n, 0, flags)`.
    let p = unsafe { memory::realloc(None, 48, MemFlags::CLEAR) }.expect("realloc(None)");
    assert_eq!(p.as_ptr() as usize % silcore_core::build_config().max_align, 0);
    // SAFETY: 48-byte block.
    assert!((0..48).all(|i| unsafe { *p.as_ptr().add(i) } == 0));
    // SAFETY: zero size frees `p`.
    assert!(unsafe { memory::realloc(Some(p), 0, MemFlags::empty()) }.is_none());
    assert_eq!(debug_bytes_allocated(), before);
}

#[cfg(feature = "debug")]
#[test]
fn map_reports_dominant_tag() {
    let _serial = SERIAL.lock();
    let p = memory::alloc(4096, 0, MemFlags::empty()).expect("alloc");
    // SAFETY: live block.
    unsafe { memory::debug_set_info(p, MemTag::Texture) };
    let base = p.as_ptr() as usize;

    let mut out = [None; 4];
    debug_get_map(base, 4096, &mut out);
    assert_eq!(out, [Some(MemTag::Texture); 4]);

    // The first page of the address space never holds a heap block.
    debug_get_map(0, 4096, &mut out);
    assert_eq!(out, [None; 4]);

    debug_get_map(base, 4096, &mut []);
    // SAFETY: live block.
    unsafe { memory::free(Some(p)) };
}

#[cfg(feature = "include-tests")]
#[test]
fn report_lists_live_blocks() {
    let _serial = SERIAL.lock();
    let p = memory::alloc(77, 0, MemFlags::empty()).expect("alloc");
    // SAFETY: live block.
    unsafe { memory::debug_set_info(p, MemTag::Sound) };
    silcore_core::debug::capture::start();
    let reported = memory::debug_report_allocs();
    let lines = silcore_core::debug::capture::take();
    assert!(reported >= 1);
    assert_eq!(lines.len(), reported + 1);
    assert!(
        lines
            .iter()
            .any(|l| l.contains("77 bytes, tag sound") && l.contains("memory_invariants_test.rs"))
    );
    // SAFETY: live block.
    unsafe { memory::free(Some(p)) };
}

#[test]
fn strdup_and_strings_are_tracked() {
    let _serial = SERIAL.lock();
    let before = debug_bytes_allocated();
    {
        let s = silcore_core::silfmt_alloc!("%s-%04d", "id", 42).expect("format_alloc");
        assert_eq!(s, "id-0042");
        let p = memory::strdup(&s, MemFlags::empty()).expect("strdup");
        // SAFETY: live block of `len + 1` bytes.
        unsafe {
            assert_eq!(*p.as_ptr().add(s.len()), 0);
            memory::free(Some(p));
        }
        #[cfg(feature = "debug")]
        assert!(debug_bytes_allocated() > before);
    }
    assert_eq!(debug_bytes_allocated(), before);
}
