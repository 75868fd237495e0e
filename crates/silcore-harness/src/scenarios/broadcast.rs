//! Condition-variable broadcast rounds.
//!
//! Each round the coordinator waits until every waiter is parked on the
//! condition variable, advances the generation and broadcasts once. Every
//! waiter must observe every generation.

#![allow(unsafe_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use silcore_core::sync::{
    CondVarHandle, MutexHandle, MutexKind, condvar_create_on, condvar_destroy, condvar_signal,
    condvar_wait, mutex_create_on, mutex_destroy, mutex_lock, mutex_unlock,
};
use silcore_core::{PlatformVariant, Timeout};
use silcore_platform::{SysThread, time};

use super::{ScenarioReport, run_workers};
use crate::error::HarnessError;

const SCENARIO: &str = "broadcast";
// Waiters re-check the abort flag this often.
const WAIT_SLICE: Timeout = Timeout::Millis(100);
const PARK_DEADLINE: Duration = Duration::from_secs(10);

struct Shared {
    cv: CondVarHandle,
    mx: MutexHandle,
    generation: AtomicU64,
    parked: AtomicUsize,
    abort: AtomicBool,
}

/// Returns the number of generations this waiter observed.
fn waiter(shared: &Shared, rounds: usize) -> u64 {
    let mut seen = 0;
    for _ in 0..rounds {
        mutex_lock(shared.mx, Timeout::Forever);
        shared.parked.fetch_add(1, Ordering::SeqCst);
        let generation = shared.generation.load(Ordering::SeqCst);
        while shared.generation.load(Ordering::SeqCst) == generation
            && !shared.abort.load(Ordering::SeqCst)
        {
            condvar_wait(shared.cv, shared.mx, WAIT_SLICE);
        }
        let advanced = shared.generation.load(Ordering::SeqCst) != generation;
        mutex_unlock(shared.mx);
        if !advanced {
            break;
        }
        seen += 1;
    }
    seen
}

/// Lock `mx` once `parked` reaches `target`. Returns `false` (unlocked) on
/// deadline.
fn lock_when_parked(shared: &Shared, target: usize) -> bool {
    let deadline = time::now() + PARK_DEADLINE;
    loop {
        mutex_lock(shared.mx, Timeout::Forever);
        if shared.parked.load(Ordering::SeqCst) >= target {
            return true;
        }
        mutex_unlock(shared.mx);
        if time::now() >= deadline {
            return false;
        }
        time::sleep_ms(1);
    }
}

/// Run `rounds` broadcast rounds over `waiters` threads on `variant`.
pub fn broadcast(
    variant: PlatformVariant,
    waiters: usize,
    rounds: usize,
) -> Result<ScenarioReport, HarnessError> {
    if waiters == 0 {
        return Err(HarnessError::InvalidArgument(format!(
            "{SCENARIO}: --threads must be at least 1"
        )));
    }
    let started = Instant::now();
    let cv = condvar_create_on(variant)
        .ok_or_else(|| HarnessError::aborted(SCENARIO, "condvar_create failed"))?;
    let Some(mx) = mutex_create_on(variant, MutexKind::Plain) else {
        // SAFETY: never waited on; last use.
        unsafe { condvar_destroy(cv) };
        return Err(HarnessError::aborted(SCENARIO, "mutex_create failed"));
    };
    let shared = Arc::new(Shared {
        cv,
        mx,
        generation: AtomicU64::new(0),
        parked: AtomicUsize::new(0),
        abort: AtomicBool::new(false),
    });

    let coordinator = Arc::clone(&shared);
    let coordinate = SysThread::spawn("broadcast-coordinator", move || {
        let mut completed = 0usize;
        for round in 0..rounds {
            if !lock_when_parked(&coordinator, waiters * (round + 1)) {
                break;
            }
            coordinator.generation.fetch_add(1, Ordering::SeqCst);
            condvar_signal(coordinator.cv, true);
            mutex_unlock(coordinator.mx);
            completed += 1;
        }
        if completed < rounds {
            coordinator.abort.store(true, Ordering::SeqCst);
        }
        completed
    })
    .ok_or_else(|| HarnessError::aborted(SCENARIO, "could not spawn the coordinator"));
    let coordinate = match coordinate {
        Ok(thread) => thread,
        Err(e) => {
            // SAFETY: no other thread has seen the objects.
            unsafe {
                condvar_destroy(cv);
                mutex_destroy(mx);
            }
            return Err(e);
        }
    };

    let worker_shared = Arc::clone(&shared);
    let seen = run_workers(SCENARIO, waiters, move |_| waiter(&worker_shared, rounds));
    // Release the waiters that did start; the coordinator gives up at its
    // deadline.
    if seen.is_err() {
        shared.abort.store(true, Ordering::SeqCst);
    }
    let completed = coordinate
        .join()
        .ok_or_else(|| HarnessError::aborted(SCENARIO, "coordinator panicked"))?;
    let seen = seen?;

    // SAFETY: every thread using the objects has been joined.
    unsafe {
        condvar_destroy(cv);
        mutex_destroy(mx);
    }

    let wakeups: u64 = seen.iter().sum();
    let expected = (waiters * rounds) as u64;
    let passed = completed == rounds && wakeups == expected;
    Ok(ScenarioReport::finish(
        SCENARIO,
        started,
        passed,
        serde_json::json!({
            "waiters": waiters,
            "rounds": rounds,
            "completed_rounds": completed,
            "wakeups": wakeups,
            "expected_wakeups": expected,
        }),
    )
    .on_variant(variant.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_waiter_sees_every_round() {
        for variant in PlatformVariant::all() {
            let report = broadcast(variant, 4, 5).unwrap();
            assert!(report.passed, "{variant:?}: {}", report.details);
            assert_eq!(report.details["wakeups"], 20);
        }
    }
}
