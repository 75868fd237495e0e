//! Allocator storm: workers allocate, grow, shrink and free blocks with
//! random sizes and alignments, checking alignment and contents as they go.

#![allow(unsafe_code)]

use std::ptr::NonNull;
use std::time::Instant;

use silcore_core::memory::{self, MemFlags, MemTag};

use super::{ScenarioReport, StressOptions, XorShift64, run_workers};
use crate::error::HarnessError;

const SCENARIO: &str = "alloc-storm";
const LIVE_BLOCKS: usize = 32;
const MAX_SIZE: usize = 4096;
const ALIGNS: [usize; 6] = [0, 8, 16, 64, 256, 4096];

#[derive(Debug, Clone, Copy)]
struct Block {
    ptr: NonNull<u8>,
    size: usize,
    align: usize,
    seed: u8,
}

impl Block {
    fn fill(&self) {
        for i in 0..self.size {
            // SAFETY: the block holds `size` bytes.
            unsafe { self.ptr.as_ptr().add(i).write(self.seed ^ i as u8) };
        }
    }

    fn intact(&self, len: usize) -> bool {
        // SAFETY: the block holds at least `len` bytes.
        (0..len).all(|i| unsafe { self.ptr.as_ptr().add(i).read() } == self.seed ^ i as u8)
    }

    fn aligned(&self) -> bool {
        self.align == 0 || self.ptr.as_ptr() as usize % self.align == 0
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct WorkerTally {
    allocs: u64,
    reallocs: u64,
    frees: u64,
    failures: u64,
    misaligned: u64,
    corrupted: u64,
}

fn storm(iterations: usize, seed: u64) -> WorkerTally {
    let mut rng = XorShift64::new(seed);
    let mut live: Vec<Option<Block>> = vec![None; LIVE_BLOCKS];
    let mut tally = WorkerTally::default();

    for _ in 0..iterations {
        let slot = rng.below(LIVE_BLOCKS);
        match live[slot] {
            None => {
                let size = 1 + rng.below(MAX_SIZE);
                let align = ALIGNS[rng.below(ALIGNS.len())];
                let Some(ptr) = memory::alloc(size, align, MemFlags::empty()) else {
                    tally.failures += 1;
                    continue;
                };
                // SAFETY: freshly allocated, tracked block.
                unsafe { memory::debug_set_info(ptr, MemTag::Buffer) };
                let block = Block {
                    ptr,
                    size,
                    align,
                    seed: rng.next_u64() as u8,
                };
                tally.allocs += 1;
                tally.misaligned += u64::from(!block.aligned());
                block.fill();
                live[slot] = Some(block);
            }
            Some(block) if rng.below(2) == 0 => {
                let size = 1 + rng.below(MAX_SIZE);
                // SAFETY: `block.ptr` is live; on success it is replaced.
                let Some(ptr) = (unsafe { memory::realloc(Some(block.ptr), size, MemFlags::empty()) })
                else {
                    tally.failures += 1;
                    continue;
                };
                let moved = Block { ptr, size, ..block };
                tally.reallocs += 1;
                tally.misaligned += u64::from(!moved.aligned());
                tally.corrupted += u64::from(!moved.intact(block.size.min(size)));
                moved.fill();
                live[slot] = Some(moved);
            }
            Some(block) => {
                tally.corrupted += u64::from(!block.intact(block.size));
                // SAFETY: live block, dropped from the table.
                unsafe { memory::free(Some(block.ptr)) };
                tally.frees += 1;
                live[slot] = None;
            }
        }
    }
    for block in live.into_iter().flatten() {
        tally.corrupted += u64::from(!block.intact(block.size));
        // SAFETY: live block.
        unsafe { memory::free(Some(block.ptr)) };
        tally.frees += 1;
    }
    tally
}

/// Run the allocator storm. In debug builds the tracked byte count must
/// return to its starting value.
pub fn alloc_storm(opts: &StressOptions) -> Result<ScenarioReport, HarnessError> {
    opts.validate(SCENARIO)?;
    let started = Instant::now();
    let bytes_before = memory::debug_bytes_allocated();
    let live_before = memory::debug_live_allocations();

    let iterations = opts.iterations;
    let seed = opts.seed;
    let tallies = run_workers(SCENARIO, opts.threads, move |index| {
        storm(iterations, seed ^ ((index as u64 + 1) << 32))
    })?;

    let total = tallies.iter().fold(WorkerTally::default(), |acc, t| WorkerTally {
        allocs: acc.allocs + t.allocs,
        reallocs: acc.reallocs + t.reallocs,
        frees: acc.frees + t.frees,
        failures: acc.failures + t.failures,
        misaligned: acc.misaligned + t.misaligned,
        corrupted: acc.corrupted + t.corrupted,
    });
    let bytes_after = memory::debug_bytes_allocated();
    let live_after = memory::debug_live_allocations();
    let passed = total.failures == 0
        && total.misaligned == 0
        && total.corrupted == 0
        && total.allocs == total.frees
        && bytes_after == bytes_before
        && live_after == live_before;

    Ok(ScenarioReport::finish(
        SCENARIO,
        started,
        passed,
        serde_json::json!({
            "threads": opts.threads,
            "iterations": opts.iterations,
            "allocs": total.allocs,
            "reallocs": total.reallocs,
            "frees": total.frees,
            "failures": total.failures,
            "misaligned": total.misaligned,
            "corrupted": total.corrupted,
            "bytes_before": bytes_before,
            "bytes_after": bytes_after,
        }),
    ))
}
