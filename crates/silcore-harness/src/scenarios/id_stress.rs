//! Handle-table churn: every worker owns a pool of objects and randomly
//! registers, checks and releases them against one shared table.

use std::ptr::NonNull;
use std::sync::Arc;
use std::time::Instant;

use silcore_core::idarray::{IdTable, SharedIdArray};

use super::{ScenarioReport, StressOptions, XorShift64, run_workers};
use crate::error::HarnessError;

const SCENARIO: &str = "id-stress";
const POOL: usize = 16;

#[derive(Debug, Default, Clone, Copy)]
struct WorkerTally {
    registered: u64,
    released: u64,
    mismatches: u64,
    failed_registrations: u64,
}

fn churn(table: &SharedIdArray<u64>, iterations: usize, seed: u64) -> WorkerTally {
    let mut rng = XorShift64::new(seed);
    let mut pool: Vec<Box<u64>> = (0..POOL as u64).map(Box::new).collect();
    let mut ids = [0usize; POOL];
    let mut tally = WorkerTally::default();

    for _ in 0..iterations {
        let slot = rng.below(POOL);
        let ptr = NonNull::from(&mut *pool[slot]);
        if ids[slot] == 0 {
            ids[slot] = table.register(ptr);
            if ids[slot] == 0 {
                tally.failed_registrations += 1;
            } else {
                tally.registered += 1;
            }
        } else {
            if table.get(ids[slot]) != Some(ptr) {
                tally.mismatches += 1;
            }
            table.release(ids[slot]);
            ids[slot] = 0;
            tally.released += 1;
        }
    }
    for id in ids.into_iter().filter(|&id| id != 0) {
        table.release(id);
        tally.released += 1;
    }
    tally
}

/// Run the handle-table churn with `expand_by` slots per segment.
pub fn id_stress(opts: &StressOptions, expand_by: usize) -> Result<ScenarioReport, HarnessError> {
    opts.validate(SCENARIO)?;
    let started = Instant::now();
    let table = Arc::new(SharedIdArray::<u64>::new(expand_by)?);

    let iterations = opts.iterations;
    let seed = opts.seed;
    let worker_table = Arc::clone(&table);
    let tallies = run_workers(SCENARIO, opts.threads, move |index| {
        churn(&worker_table, iterations, seed.wrapping_add(index as u64))
    })?;

    let total = tallies.iter().fold(WorkerTally::default(), |acc, t| WorkerTally {
        registered: acc.registered + t.registered,
        released: acc.released + t.released,
        mismatches: acc.mismatches + t.mismatches,
        failed_registrations: acc.failed_registrations + t.failed_registrations,
    });
    let capacity = table.capacity();
    let capacity_bound = opts.threads * POOL + expand_by;
    let passed = total.mismatches == 0
        && total.failed_registrations == 0
        && total.registered == total.released
        && table.num_used() == 0
        && capacity <= capacity_bound;

    Ok(ScenarioReport::finish(
        SCENARIO,
        started,
        passed,
        serde_json::json!({
            "threads": opts.threads,
            "iterations": opts.iterations,
            "expand_by": expand_by,
            "registered": total.registered,
            "released": total.released,
            "mismatches": total.mismatches,
            "failed_registrations": total.failed_registrations,
            "capacity": capacity,
            "capacity_bound": capacity_bound,
            "num_used": table.num_used(),
        }),
    ))
}
