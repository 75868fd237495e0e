//! Stress and fault-injection harness for silcore.
//!
//! This crate provides:
//! - Scenario runners: handle-table churn, condition-variable broadcast,
//!   allocator storms and the fault-injection leak sweep
//! - Structured JSONL records for every run
//! - The `harness` CLI that drives both

pub mod error;
pub mod scenarios;
pub mod structured_log;

pub use error::HarnessError;
pub use scenarios::{ScenarioReport, StressOptions};
pub use structured_log::{LogEmitter, LogEntry, LogLevel, Outcome};
