//! Scenario runners.
//!
//! Each runner returns a [`ScenarioReport`]: `passed` says whether the
//! scenario's checks held, `details` carries its counters. An `Err` means
//! the scenario could not run at all (thread spawn failed, bad options).

mod alloc_storm;
mod broadcast;
#[cfg(feature = "include-tests")]
mod fault_sweep;
mod id_stress;

use std::time::Instant;

use serde::Serialize;
use silcore_core::build_config;
use silcore_platform::SysThread;

use crate::error::HarnessError;
use crate::structured_log::{LogEntry, LogLevel, Outcome};

pub use alloc_storm::alloc_storm;
pub use broadcast::broadcast;
#[cfg(feature = "include-tests")]
pub use fault_sweep::fault_sweep;
pub use id_stress::id_stress;

/// Knobs shared by the multi-threaded scenarios.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StressOptions {
    pub threads: usize,
    pub iterations: usize,
    pub seed: u64,
}

impl StressOptions {
    pub(crate) fn validate(&self, scenario: &'static str) -> Result<(), HarnessError> {
        if self.threads == 0 {
            return Err(HarnessError::InvalidArgument(format!(
                "{scenario}: --threads must be at least 1"
            )));
        }
        Ok(())
    }
}

impl Default for StressOptions {
    fn default() -> Self {
        Self {
            threads: 4,
            iterations: 10_000,
            seed: 0xDEAD_BEEF,
        }
    }
}

/// Result of one scenario run.
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioReport {
    pub scenario: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variant: Option<&'static str>,
    pub passed: bool,
    pub duration_ms: u64,
    pub details: serde_json::Value,
}

impl ScenarioReport {
    pub(crate) fn finish(
        scenario: &'static str,
        started: Instant,
        passed: bool,
        details: serde_json::Value,
    ) -> Self {
        Self {
            scenario,
            variant: None,
            passed,
            duration_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            details,
        }
    }

    #[must_use]
    pub(crate) fn on_variant(mut self, variant: &'static str) -> Self {
        self.variant = Some(variant);
        self
    }

    /// Structured record for this report (trace id filled in by the emitter).
    #[must_use]
    pub fn to_log_entry(&self) -> LogEntry {
        let (level, outcome) = if self.passed {
            (LogLevel::Info, Outcome::Pass)
        } else {
            (LogLevel::Error, Outcome::Fail)
        };
        let entry = LogEntry::new("", level, "scenario_result")
            .with_scenario(self.scenario)
            .with_outcome(outcome)
            .with_duration_ms(self.duration_ms)
            .with_details(self.details.clone());
        match self.variant {
            Some(variant) => entry.with_variant(variant),
            None => entry,
        }
    }
}

/// The compiled core configuration as JSON.
#[must_use]
pub fn config_report() -> serde_json::Value {
    let config = build_config();
    serde_json::json!({
        "debug": config.debug,
        "include_tests": config.include_tests,
        "memory_check_pointers": config.memory_check_pointers,
        "memory_debug_fill": config.memory_debug_fill,
        "memory_log_allocs": config.memory_log_allocs,
        "memory_forbid_malloc": config.memory_forbid_malloc,
        "float_format": config.float_format.as_str(),
        "platform": config.platform.as_str(),
        "log_max_line": config.log_max_line,
        "log_strip_prefix": config.log_strip_prefix,
        "max_align": config.max_align,
    })
}

/// Run `work(index)` on `count` platform threads and collect the results in
/// index order.
pub(crate) fn run_workers<R, F>(
    scenario: &'static str,
    count: usize,
    work: F,
) -> Result<Vec<R>, HarnessError>
where
    R: Send + 'static,
    F: Fn(usize) -> R + Send + Sync + Clone + 'static,
{
    let mut threads = Vec::with_capacity(count);
    for index in 0..count {
        let work = work.clone();
        let thread = SysThread::spawn(&format!("{scenario}-{index}"), move || work(index))
            .ok_or_else(|| HarnessError::aborted(scenario, "could not spawn a worker thread"))?;
        threads.push(thread);
    }
    threads
        .into_iter()
        .map(|t| {
            t.join()
                .ok_or_else(|| HarnessError::aborted(scenario, "worker thread panicked"))
        })
        .collect()
}

/// Deterministic per-worker PRNG.
#[derive(Debug, Clone, Copy)]
pub(crate) struct XorShift64 {
    state: u64,
}

impl XorShift64 {
    pub(crate) fn new(seed: u64) -> Self {
        // Zero is a fixed point of xorshift.
        Self {
            state: if seed == 0 { 0x9E37_79B9_7F4A_7C15 } else { seed },
        }
    }

    pub(crate) fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.state = x;
        x.wrapping_mul(0x2545_F491_4F6C_DD1D)
    }

    pub(crate) fn below(&mut self, bound: usize) -> usize {
        (self.next_u64() % bound.max(1) as u64) as usize
    }
}
