//! Fault-injection leak sweep.
//!
//! A composite workload touching every allocating layer is run once clean,
//! then repeatedly with the allocator armed to fail from the k-th call on,
//! for k = 0, 1, 2, ... until the workload completes. Each faulted run must
//! fail cleanly and leave the tracked byte count where it found it.

#![allow(unsafe_code)]

use std::ptr::NonNull;
use std::time::Instant;

use silcore_core::idarray::{CompactIdArray, IdTable, SharedIdArray};
use silcore_core::memory::{self, MemString, test_mem_fail_after};
use silcore_core::sync::{
    CondVarHandle, MutexHandle, MutexKind, SemaphoreHandle, condvar_create_on, condvar_destroy,
    mutex_create_on, mutex_destroy, semaphore_create, semaphore_destroy,
};
use silcore_core::{PlatformVariant, format, silfmt_alloc};

use super::ScenarioReport;
use crate::error::HarnessError;

const SCENARIO: &str = "fault-sweep";
const OBJECTS: usize = 10;

/// Disarms the countdown on drop.
struct Armed;

impl Armed {
    fn after(calls: i64) -> Self {
        test_mem_fail_after(calls, 1, false);
        Self
    }
}

impl Drop for Armed {
    fn drop(&mut self) {
        test_mem_fail_after(-1, 0, false);
    }
}

#[derive(Default)]
struct SyncObjects {
    mutexes: Vec<MutexHandle>,
    condvars: Vec<CondVarHandle>,
    semaphores: Vec<SemaphoreHandle>,
}

impl Drop for SyncObjects {
    fn drop(&mut self) {
        // SAFETY: the workload never blocks on these; this is their last use.
        unsafe {
            for cv in self.condvars.drain(..) {
                condvar_destroy(cv);
            }
            for mx in self.mutexes.drain(..) {
                mutex_destroy(mx);
            }
            for sem in self.semaphores.drain(..) {
                semaphore_destroy(sem);
            }
        }
    }
}

/// Returns the length of the summary string, or `None` if any step failed.
fn workload(objects: &mut [u64; OBJECTS]) -> Option<usize> {
    let shared = SharedIdArray::new(3).ok()?;
    let compact = CompactIdArray::new(4).ok()?;
    let mut sync = SyncObjects::default();
    let mut summary = MemString::new();

    for (i, obj) in objects.iter_mut().enumerate() {
        let ptr = NonNull::from(obj);
        let shared_id = shared.register(ptr);
        let compact_id = compact.register(ptr);
        if shared_id == 0 || compact_id == 0 {
            return None;
        }
        let label = silfmt_alloc!("obj%02d:%zu/%zu;", i, shared_id, compact_id)?;
        if !summary.push_str(&label) {
            return None;
        }
    }
    for variant in PlatformVariant::all() {
        sync.mutexes.push(mutex_create_on(variant, MutexKind::Recursive)?);
        sync.condvars.push(condvar_create_on(variant)?);
    }
    sync.semaphores.push(semaphore_create(1, 4)?);
    if !format::format_append(&mut summary, "%s", &["done".into()]) {
        return None;
    }
    Some(summary.len())
}

/// Sweep failure points until the workload completes, or `max_points`.
pub fn fault_sweep(max_points: usize) -> Result<ScenarioReport, HarnessError> {
    let started = Instant::now();
    let mut objects = [0u64; OBJECTS];
    let expected = workload(&mut objects)
        .ok_or_else(|| HarnessError::aborted(SCENARIO, "workload failed without faults"))?;

    let mut failure_points = 0usize;
    let mut leaks: Vec<serde_json::Value> = Vec::new();
    let mut wrong_results = 0usize;
    let mut completed_at = None;
    for k in 0..max_points {
        let before = memory::debug_bytes_allocated();
        let outcome = {
            let _armed = Armed::after(k as i64);
            workload(&mut objects)
        };
        let after = memory::debug_bytes_allocated();
        if after != before {
            leaks.push(serde_json::json!({ "k": k, "bytes": after as i64 - before as i64 }));
        }
        match outcome {
            None => failure_points += 1,
            Some(len) => {
                wrong_results += usize::from(len != expected);
                completed_at = Some(k);
                break;
            }
        }
    }

    let passed = leaks.is_empty() && wrong_results == 0 && completed_at.is_some();
    Ok(ScenarioReport::finish(
        SCENARIO,
        started,
        passed,
        serde_json::json!({
            "failure_points": failure_points,
            "completed_at": completed_at,
            "max_points": max_points,
            "leaks": leaks,
            "wrong_results": wrong_results,
        }),
    ))
}
